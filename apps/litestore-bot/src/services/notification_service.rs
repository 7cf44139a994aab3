use async_trait::async_trait;
use litestore_db::models::{MessageRef, PendingDeposit};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::bot::keyboards;
use crate::bot::utils::{escape_html, format_rupiah};
use crate::services::bonus_service::BonusOutcome;
use crate::services::payment::SaweriaInvoice;
use crate::transport::{Messenger, QrImage, TransportError};

/// Operations group that receives a copy of every settled topup.
#[async_trait]
pub trait GroupSink: Send + Sync {
    async fn post(&self, text: &str) -> Result<(), TransportError>;
}

/// Posts through a separate group bot, as configured in the ops key file.
pub struct TelegramGroupSink {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramGroupSink {
    pub fn new(api_base: String, token: String, chat_id: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            chat_id,
        }
    }
}

#[async_trait]
impl GroupSink for TelegramGroupSink {
    async fn post(&self, text: &str) -> Result<(), TransportError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Request(format!("group post failed ({}): {}", status, body)));
        }
        Ok(())
    }
}

/// What the user and the operations group are told after a settlement.
#[derive(Debug, Clone)]
pub struct TopupReceipt {
    pub user_id: i64,
    pub username: Option<String>,
    pub method: &'static str,
    pub paid_amount: i64,
    pub credited: i64,
    pub bonus: BonusOutcome,
    pub balance_after: i64,
    pub qr_message: Option<MessageRef>,
}

#[derive(Clone)]
pub struct NotificationService {
    messenger: Arc<dyn Messenger>,
    group: Option<Arc<dyn GroupSink>>,
    store_name: String,
}

impl NotificationService {
    pub fn new(messenger: Arc<dyn Messenger>, group: Option<Arc<dyn GroupSink>>, store_name: String) -> Self {
        Self {
            messenger,
            group,
            store_name,
        }
    }

    pub fn messenger(&self) -> &Arc<dyn Messenger> {
        &self.messenger
    }

    pub async fn send_deposit_qr(
        &self,
        deposit: &PendingDeposit,
        image: QrImage,
        expiry_minutes: i64,
    ) -> Result<MessageRef, TransportError> {
        let caption = format!(
            "🧾 <b>{} Payment</b>\n\n\
             💵 Amount: <b>{}</b>\n\
             ⏳ Expires in: {} minutes\n\
             ⚠️ Transfer <b>exactly</b> this amount\n\n\
             ✅ Verified automatically",
            escape_html(&self.store_name),
            format_rupiah(deposit.target_amount),
            expiry_minutes
        );
        self.messenger
            .send_photo(
                deposit.user_id,
                image,
                &caption,
                Some(keyboards::cancel_qris(&deposit.unique_code)),
            )
            .await
    }

    pub async fn send_saweria_qr(
        &self,
        user_id: i64,
        invoice: &SaweriaInvoice,
        amount: i64,
        expiry_minutes: i64,
    ) -> Result<MessageRef, TransportError> {
        let caption = format!(
            "❇️ <b>Deposit Information</b>\n\n\
             🏷️ Transaction: <code>{}</code>\n\
             🏷️ Amount: <b>{}</b>\n\
             🏷️ Time: {}\n\n\
             Scan the QR to pay through QRIS. Expires in {} minutes.",
            escape_html(&invoice.transaction_id),
            format_rupiah(amount),
            escape_html(invoice.timestamp.as_deref().unwrap_or("-")),
            expiry_minutes
        );
        self.messenger
            .send_photo(
                user_id,
                QrImage::Url(invoice.qr_image_url.clone()),
                &caption,
                Some(keyboards::cancel_saweria(&invoice.transaction_id)),
            )
            .await
    }

    /// Best-effort delete; the message may already be gone.
    pub async fn delete_quietly(&self, message: Option<MessageRef>) {
        if let Some(message) = message {
            if let Err(e) = self.messenger.delete_message(message).await {
                warn!(
                    chat_id = message.chat_id,
                    message_id = message.message_id,
                    "Failed to delete message: {}",
                    e
                );
            }
        }
    }

    pub async fn lookup_username(&self, user_id: i64) -> Option<String> {
        match self.messenger.username(user_id).await {
            Ok(name) => name,
            Err(e) => {
                warn!(user_id, "Failed to look up username: {}", e);
                None
            }
        }
    }

    pub fn format_user_receipt(receipt: &TopupReceipt) -> String {
        let mut text = format!(
            "━━━━━━━━━━━━━━━━━━\n\
             ✅ <b>Payment Received</b>\n\
             ━━━━━━━━━━━━━━━━━━\n\
             🏷️ Username: <code>{}</code>\n\
             🏷️ User ID: <code>{}</code>\n\
             🏷️ Paid: {}\n\
             🏷️ Balance added: {}\n",
            escape_html(receipt.username.as_deref().unwrap_or("-")),
            receipt.user_id,
            format_rupiah(receipt.paid_amount),
            format_rupiah(receipt.credited)
        );
        if receipt.bonus.bonus > 0 {
            text.push_str(&format!(
                "🎁 Topup bonus: <b>{}</b> ({}%)\n",
                format_rupiah(receipt.bonus.bonus),
                receipt.bonus.percent
            ));
        }
        text.push_str(&format!("🏷️ Current balance: <b>{}</b>", format_rupiah(receipt.balance_after)));
        text
    }

    pub fn format_group_receipt(receipt: &TopupReceipt) -> String {
        format!(
            "━━━━━━━━━━━━━━━━━━\n\
             ❇️ <b>Top Up Success</b> ❇️\n\
             ━━━━━━━━━━━━━━━━━━\n\
             🏷️ Username: <code>{}</code>\n\
             🏷️ ID: <code>{}</code>\n\
             🏷️ Method: {}\n\
             🏷️ Amount: {}\n\
             🏷️ Topup bonus: {} ({}%)\n\
             🏷️ Current balance: {}",
            escape_html(receipt.username.as_deref().unwrap_or("-")),
            receipt.user_id,
            receipt.method,
            format_rupiah(receipt.credited),
            format_rupiah(receipt.bonus.bonus),
            receipt.bonus.percent,
            format_rupiah(receipt.balance_after)
        )
    }

    /// Runs strictly after the settlement committed; nothing here can undo it.
    /// Returns whether the user's receipt was delivered.
    pub async fn payment_success(&self, receipt: &TopupReceipt) -> bool {
        let delivered = match self
            .messenger
            .send_text(
                receipt.user_id,
                &Self::format_user_receipt(receipt),
                Some(keyboards::after_topup()),
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id = receipt.user_id, "Failed to deliver topup receipt: {}", e);
                false
            }
        };

        if receipt.bonus.bonus > 0 {
            let line = format!(
                "🎁 <b>Topup bonus!</b> You received an extra <b>{}</b> ({}%)",
                format_rupiah(receipt.bonus.bonus),
                receipt.bonus.percent
            );
            if let Err(e) = self.messenger.send_text(receipt.user_id, &line, None).await {
                warn!(user_id = receipt.user_id, "Failed to deliver bonus notice: {}", e);
            }
        }

        self.delete_quietly(receipt.qr_message).await;

        if let Some(group) = &self.group {
            if let Err(e) = group.post(&Self::format_group_receipt(receipt)).await {
                warn!(user_id = receipt.user_id, "Failed to notify operations group: {}", e);
                let warning = format!(
                    "⚠️ <b>Could not notify the operations group.</b>\n\n{}",
                    escape_html(&e.to_string())
                );
                if let Err(e) = self.messenger.send_text(receipt.user_id, &warning, None).await {
                    warn!(user_id = receipt.user_id, "Failed to deliver group failure warning: {}", e);
                }
            }
        }

        info!(
            user_id = receipt.user_id,
            credited = receipt.credited,
            bonus = receipt.bonus.bonus,
            delivered,
            "Topup notification dispatched"
        );
        delivered
    }

    pub async fn deposit_expired(&self, user_id: i64, qr_message: Option<MessageRef>, method: &str) {
        self.delete_quietly(qr_message).await;
        let text = format!(
            "❌ <b>{} Payment Expired</b>\n\nThe payment window has closed. Tap Top Up again to get a new QR code.",
            method
        );
        if let Err(e) = self
            .messenger
            .send_text(user_id, &text, Some(keyboards::back_to_topup()))
            .await
        {
            warn!(user_id, "Failed to deliver expiry notice: {}", e);
        }
    }

    pub async fn deposit_cancelled(&self, user_id: i64, qr_message: Option<MessageRef>, method: &str) {
        self.delete_quietly(qr_message).await;
        let text = format!(
            "❌ {} topup cancelled. Start a new topup whenever you are ready.",
            method
        );
        if let Err(e) = self
            .messenger
            .send_text(user_id, &text, Some(keyboards::back_to_topup()))
            .await
        {
            warn!(user_id, "Failed to deliver cancellation notice: {}", e);
        }
    }

    pub async fn notify_failure(&self, user_id: i64, text: &str) {
        if let Err(e) = self.messenger.send_text(user_id, text, None).await {
            warn!(user_id, "Failed to deliver failure notice: {}", e);
        }
    }
}
