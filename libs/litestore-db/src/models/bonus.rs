use anyhow::{Result, ensure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BonusConfig {
    pub enabled: bool,
    pub min_topup: i64,
    pub bonus_percent: i32,
}

impl BonusConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.min_topup >= 0, "minimum topup must not be negative");
        ensure!(
            (0..=100).contains(&self.bonus_percent),
            "bonus percent must be between 0 and 100"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BonusLogEntry {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub amount: i64,
    pub bonus: i64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_settings() {
        let valid = BonusConfig {
            enabled: true,
            min_topup: 10_000,
            bonus_percent: 25,
        };
        assert!(valid.validate().is_ok());
        assert!(BonusConfig { bonus_percent: 101, ..valid }.validate().is_err());
        assert!(BonusConfig { bonus_percent: -1, ..valid }.validate().is_err());
        assert!(BonusConfig { min_topup: -5, ..valid }.validate().is_err());
        assert!(!BonusConfig::default().enabled);
    }
}
