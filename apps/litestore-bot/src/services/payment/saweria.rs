use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{GatewayError, SaweriaGateway, SaweriaInvoice, coerce_string};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    data: Option<Value>,
}

pub struct SaweriaClient {
    client: Client,
    base_url: String,
    username: String,
    email: String,
}

impl SaweriaClient {
    pub fn new(base_url: String, username: String, email: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            email,
        }
    }

    async fn get_envelope(&self, path: &str, query: &[(&str, String)]) -> Result<Value, GatewayError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }
        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        if !envelope.success {
            return Err(GatewayError::Malformed(format!("{} reported success=false", path)));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::Malformed(format!("{} response has no data", path)))
    }

    fn parse_invoice(data: &Value) -> Result<SaweriaInvoice, GatewayError> {
        let field = |name: &str| data.get(name).and_then(coerce_string);
        Ok(SaweriaInvoice {
            transaction_id: field("transactionId")
                .ok_or_else(|| GatewayError::Malformed("missing transactionId".into()))?,
            qr_image_url: field("qrImageUrl")
                .ok_or_else(|| GatewayError::Malformed("missing qrImageUrl".into()))?,
            check_payment_url: field("checkPaymentUrl"),
            timestamp: field("timestamp"),
        })
    }
}

#[async_trait]
impl SaweriaGateway for SaweriaClient {
    async fn create_transaction(&self, amount: i64) -> Result<SaweriaInvoice, GatewayError> {
        if self.username.is_empty() || self.email.is_empty() {
            return Err(GatewayError::NotConfigured);
        }
        let data = self
            .get_envelope(
                "/api/create",
                &[
                    ("username", self.username.clone()),
                    ("amount", amount.to_string()),
                    ("email", self.email.clone()),
                ],
            )
            .await?;
        Self::parse_invoice(&data)
    }

    async fn check_payment(&self, transaction_id: &str) -> Result<bool, GatewayError> {
        let data = self
            .get_envelope("/check-payment", &[("idtransaksi", transaction_id.to_string())])
            .await?;
        data.get("isPaid")
            .and_then(Value::as_bool)
            .ok_or_else(|| GatewayError::Malformed("missing isPaid".into()))
    }
}
