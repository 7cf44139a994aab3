use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{GatewayError, GatewayTransaction, QrisGateway, coerce_amount, coerce_string, qris};
use crate::transport::QrImage;

/// QRIS gateway backed by the merchant's static QR and an account mutation feed.
pub struct OrkutGateway {
    client: Client,
    static_payload: String,
    merchant_id: String,
    api_key: String,
    mutation_url: String,
    render_url: String,
}

impl OrkutGateway {
    pub fn new(
        static_payload: String,
        merchant_id: String,
        api_key: String,
        mutation_url: String,
        render_url: String,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            client,
            static_payload,
            merchant_id,
            api_key,
            mutation_url,
            render_url,
        }
    }

    fn parse_transactions(body: &Value) -> Result<Vec<GatewayTransaction>, GatewayError> {
        let entries = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::Malformed("mutation response has no data array".into()))?;

        let mut transactions = Vec::with_capacity(entries.len());
        for entry in entries {
            let reference_id = entry
                .get("reference_id")
                .or_else(|| entry.get("issuer_reference"))
                .and_then(coerce_string);
            let amount = entry.get("amount").and_then(coerce_amount);
            match (reference_id, amount) {
                (Some(reference_id), Some(amount)) => transactions.push(GatewayTransaction {
                    reference_id,
                    amount,
                }),
                _ => warn!("Dropping mutation entry without reference or amount: {}", entry),
            }
        }
        Ok(transactions)
    }
}

#[async_trait]
impl QrisGateway for OrkutGateway {
    async fn generate_qr(&self, amount: i64) -> Result<QrImage, GatewayError> {
        let payload = qris::dynamic_payload(&self.static_payload, amount)?;
        let url = format!("{}{}", self.render_url, urlencoding::encode(&payload));

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(GatewayError::Malformed("QR renderer returned an empty image".into()));
        }
        Ok(QrImage::Png(bytes.to_vec()))
    }

    async fn list_recent_transactions(&self) -> Result<Vec<GatewayTransaction>, GatewayError> {
        let resp = self
            .client
            .get(&self.mutation_url)
            .query(&[("merchant", &self.merchant_id), ("key", &self.api_key)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json().await?;
        let transactions = Self::parse_transactions(&body)?;
        debug!("Mutation feed returned {} transactions", transactions.len());
        Ok(transactions)
    }
}
