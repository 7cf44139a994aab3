use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::transport::QrImage;

pub mod orkut;
pub mod qris;
pub mod saweria;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway answered with status {0}")]
    Status(u16),

    #[error("malformed gateway response: {0}")]
    Malformed(String),

    #[error("gateway is not configured")]
    NotConfigured,
}

/// One incoming transfer seen on the merchant's mutation feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayTransaction {
    pub reference_id: String,
    pub amount: i64,
}

impl GatewayTransaction {
    pub fn idempotency_key(&self) -> String {
        format!("{}_{}", self.reference_id, self.amount)
    }
}

/// Primary QRIS gateway: the QR carries no transaction id, so incoming
/// transfers are correlated by their exact amount.
#[async_trait]
pub trait QrisGateway: Send + Sync {
    async fn generate_qr(&self, amount: i64) -> Result<QrImage, GatewayError>;

    async fn list_recent_transactions(&self) -> Result<Vec<GatewayTransaction>, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaweriaInvoice {
    pub transaction_id: String,
    pub qr_image_url: String,
    pub check_payment_url: Option<String>,
    pub timestamp: Option<String>,
}

/// Secondary QRIS gateway, correlated by the transaction id it assigns.
#[async_trait]
pub trait SaweriaGateway: Send + Sync {
    async fn create_transaction(&self, amount: i64) -> Result<SaweriaInvoice, GatewayError>;

    async fn check_payment(&self, transaction_id: &str) -> Result<bool, GatewayError>;
}

/// Accepts `5001`, `5001.0`, `"5001"` and `"5001.00"`.
pub(crate) fn coerce_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
