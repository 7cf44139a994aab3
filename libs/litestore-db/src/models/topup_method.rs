use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopupMethod {
    Qris,
    Saweria,
}

impl TopupMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopupMethod::Qris => "qris",
            TopupMethod::Saweria => "saweria",
        }
    }
}

impl fmt::Display for TopupMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopupMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qris" | "orkut" => Ok(TopupMethod::Qris),
            "saweria" => Ok(TopupMethod::Saweria),
            other => Err(anyhow::anyhow!("unknown topup method: {}", other)),
        }
    }
}

/// Which topup methods users are offered. Both are on until an admin turns one off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TopupMethods {
    pub qris_enabled: bool,
    pub saweria_enabled: bool,
}

impl Default for TopupMethods {
    fn default() -> Self {
        Self {
            qris_enabled: true,
            saweria_enabled: true,
        }
    }
}

impl TopupMethods {
    pub fn is_enabled(&self, method: TopupMethod) -> bool {
        match method {
            TopupMethod::Qris => self.qris_enabled,
            TopupMethod::Saweria => self.saweria_enabled,
        }
    }

    pub fn toggled(mut self, method: TopupMethod) -> Self {
        match method {
            TopupMethod::Qris => self.qris_enabled = !self.qris_enabled,
            TopupMethod::Saweria => self.saweria_enabled = !self.saweria_enabled,
        }
        self
    }
}
