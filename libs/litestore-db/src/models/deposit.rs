use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Handle of a chat message the bot sent, kept so it can be deleted later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Matched,
    Expired,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Matched => "matched",
            DepositStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepositStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DepositStatus::Pending),
            "matched" => Ok(DepositStatus::Matched),
            "expired" => Ok(DepositStatus::Expired),
            other => Err(anyhow::anyhow!("unknown deposit status: {}", other)),
        }
    }
}

/// An open QRIS topup awaiting a payment of exactly `target_amount`.
///
/// `target_amount` is `requested_amount` plus a salt in `1..=99`; among the
/// open deposits it is unique, which is what lets the matcher correlate an
/// incoming transfer with its owner. The user is credited `requested_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDeposit {
    pub unique_code: String,
    pub user_id: i64,
    pub username: Option<String>,
    pub target_amount: i64,
    pub requested_amount: i64,
    pub created_at: DateTime<Utc>,
    pub status: DepositStatus,
    /// `None` while the QR image is still being generated and delivered.
    pub qr_message: Option<MessageRef>,
}

impl PendingDeposit {
    pub fn salt(&self) -> i64 {
        self.target_amount - self.requested_amount
    }

    pub fn is_expired(&self, now: DateTime<Utc>, expiry: chrono::Duration) -> bool {
        now - self.created_at > expiry
    }
}
