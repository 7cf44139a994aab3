use async_trait::async_trait;
use litestore_db::models::MessageRef;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, InputFile, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The edit would not change the message; callers ignore it.
    #[error("message is not modified")]
    NotModified,

    #[error("telegram request failed: {0}")]
    Request(String),

    #[error("invalid photo url: {0}")]
    InvalidUrl(String),
}

impl From<RequestError> for TransportError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Api(ApiError::MessageNotModified) => TransportError::NotModified,
            other => TransportError::Request(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrImage {
    Png(Vec<u8>),
    Url(String),
}

/// The slice of the Telegram Bot API the wallet needs. Every call is a
/// suspension point and may fail; callers decide whether a failure matters.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef, TransportError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: QrImage,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef, TransportError>;

    async fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError>;

    async fn username(&self, chat_id: i64) -> Result<Option<String>, TransportError>;
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef, TransportError> {
        let mut req = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            req = req.reply_markup(kb);
        }
        let msg = req.await?;
        Ok(message_ref(&msg))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: QrImage,
        caption: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef, TransportError> {
        let file = match photo {
            QrImage::Png(bytes) => InputFile::memory(bytes).file_name("qris.png"),
            QrImage::Url(url) => {
                let parsed = reqwest::Url::parse(&url)
                    .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
                InputFile::url(parsed)
            }
        };
        let mut req = self
            .bot
            .send_photo(ChatId(chat_id), file)
            .caption(caption)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            req = req.reply_markup(kb);
        }
        let msg = req.await?;
        Ok(message_ref(&msg))
    }

    async fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        let mut req = self
            .bot
            .edit_message_text(ChatId(message.chat_id), MessageId(message.message_id), text)
            .parse_mode(ParseMode::Html);
        if let Some(kb) = keyboard {
            req = req.reply_markup(kb);
        }
        req.await?;
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
        self.bot
            .delete_message(ChatId(message.chat_id), MessageId(message.message_id))
            .await?;
        Ok(())
    }

    async fn username(&self, chat_id: i64) -> Result<Option<String>, TransportError> {
        let chat = self.bot.get_chat(ChatId(chat_id)).await?;
        Ok(chat.username().map(|u| format!("@{}", u)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_modified_is_distinguished() {
        let err: TransportError = RequestError::Api(ApiError::MessageNotModified).into();
        assert!(matches!(err, TransportError::NotModified));
        let err: TransportError = RequestError::Api(ApiError::BotBlocked).into();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
