use thiserror::Error;

use crate::services::payment::GatewayError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum DepositError {
    #[error("invalid amount: {0}")]
    Validation(String),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("deposit not found")]
    NotFound,

    /// Idempotency hit; callers treat it as a silent no-op.
    #[error("transaction already processed")]
    AlreadyProcessed,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("too many topup requests, retry shortly")]
    RateLimited,

    #[error("user already has {0} pending deposits")]
    TooManyPending(usize),

    #[error("no free target amount left for {0}")]
    TargetAmountExhausted(i64),

    #[error("{0} topup is disabled")]
    MethodDisabled(&'static str),
}

impl From<GatewayError> for DepositError {
    fn from(e: GatewayError) -> Self {
        DepositError::GatewayUnavailable(e.to_string())
    }
}

impl DepositError {
    /// Text shown to the user. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            DepositError::Validation(reason) => format!("⚠️ {}", reason),
            DepositError::RateLimited => {
                "⚠️ Too many requests. Please wait a moment before trying again.".to_string()
            }
            DepositError::TooManyPending(n) => format!(
                "⚠️ You already have {} unpaid QR codes. Pay or cancel one of them first.",
                n
            ),
            DepositError::MethodDisabled(label) => format!(
                "⚠️ {} topup is currently unavailable. Please choose another method.",
                label
            ),
            DepositError::NotFound => {
                "This topup is no longer active or has already been cancelled.".to_string()
            }
            _ => "❌ Failed to process the payment. Please try again later.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_failures_stay_generic() {
        let err = DepositError::GatewayUnavailable("connect timeout to 10.0.0.1".into());
        assert!(!err.user_message().contains("10.0.0.1"));
        let err = DepositError::Storage(anyhow::anyhow!("relation users does not exist"));
        assert!(err.user_message().contains("try again later"));
        let err = DepositError::Validation("Minimum topup is Rp100".into());
        assert!(err.user_message().contains("Rp100"));
        let err = DepositError::MethodDisabled("QRIS Saweria");
        assert!(err.user_message().contains("QRIS Saweria topup is currently unavailable"));
    }
}
