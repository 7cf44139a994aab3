use litestore_db::Ledger;
use litestore_db::models::{MessageRef, TopupMethod};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bot::keyboards;
use crate::bot::utils::format_rupiah;
use crate::error::DepositError;
use crate::services::deposit_service::{DepositService, MIN_TOPUP_AMOUNT};
use crate::services::saweria_service::SaweriaService;
use crate::transport::{Messenger, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopupMode {
    Qris,
    Saweria,
}

impl TopupMode {
    pub fn max_digits(&self) -> usize {
        match self {
            TopupMode::Qris => 12,
            TopupMode::Saweria => 8,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TopupMode::Qris => "QRIS",
            TopupMode::Saweria => "QRIS Saweria",
        }
    }

    pub fn method(&self) -> TopupMethod {
        match self {
            TopupMode::Qris => TopupMethod::Qris,
            TopupMode::Saweria => TopupMethod::Saweria,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypadEvent {
    Digit(char),
    Delete,
    Confirm,
}

impl KeypadEvent {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            keyboards::CB_DELETE => Some(KeypadEvent::Delete),
            keyboards::CB_CONFIRM => Some(KeypadEvent::Confirm),
            d if d.len() == 1 && d.chars().all(|c| c.is_ascii_digit()) => {
                d.chars().next().map(KeypadEvent::Digit)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Updated,
    Unchanged,
    Confirmed(i64),
}

/// Keypad buffer for one user. Rejected events leave it untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmountEntry {
    pub mode: TopupMode,
    pub digits: String,
    pub message: MessageRef,
    closed: bool,
}

impl AmountEntry {
    pub fn new(mode: TopupMode, message: MessageRef) -> Self {
        Self {
            mode,
            digits: String::new(),
            message,
            closed: false,
        }
    }

    pub fn apply(&mut self, event: KeypadEvent) -> Result<Transition, DepositError> {
        match event {
            KeypadEvent::Digit(d) => {
                if self.digits.len() >= self.mode.max_digits() {
                    return Err(DepositError::Validation(format!(
                        "Maximum {} digits",
                        self.mode.max_digits()
                    )));
                }
                self.digits.push(d);
                Ok(Transition::Updated)
            }
            KeypadEvent::Delete => Ok(match self.digits.pop() {
                Some(_) => Transition::Updated,
                None => Transition::Unchanged,
            }),
            KeypadEvent::Confirm => {
                let amount = self
                    .digits
                    .parse::<i64>()
                    .ok()
                    .filter(|amount| *amount >= MIN_TOPUP_AMOUNT)
                    .ok_or_else(|| {
                        DepositError::Validation(format!(
                            "Minimum topup is {}",
                            format_rupiah(MIN_TOPUP_AMOUNT)
                        ))
                    })?;
                Ok(Transition::Confirmed(amount))
            }
        }
    }

    pub fn render(&self) -> String {
        let shown = match self.digits.parse::<i64>() {
            Ok(amount) => format_rupiah(amount),
            Err(_) => "-".to_string(),
        };
        format!(
            "💰 <b>Top Up via {}</b>\n\n\
             Enter the amount with the keypad below.\n\n\
             Amount: <code>{}</code>\n\
             Minimum {}, up to {} digits.",
            self.mode.label(),
            shown,
            format_rupiah(MIN_TOPUP_AMOUNT),
            self.mode.max_digits()
        )
    }
}

#[derive(Debug)]
pub enum KeypadReply {
    /// No amount entry is open for this user.
    NoSession,
    Updated,
    Alert(String),
    Created { requested: i64 },
    CreateFailed(DepositError),
}

/// Per-user amount entry driven by keypad callbacks.
#[derive(Clone)]
pub struct InputService {
    sessions: Arc<Mutex<HashMap<i64, Arc<Mutex<AmountEntry>>>>>,
    messenger: Arc<dyn Messenger>,
    ledger: Arc<dyn Ledger>,
    deposits: DepositService,
    saweria: SaweriaService,
}

impl InputService {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        ledger: Arc<dyn Ledger>,
        deposits: DepositService,
        saweria: SaweriaService,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            messenger,
            ledger,
            deposits,
            saweria,
        }
    }

    pub async fn is_collecting(&self, user_id: i64) -> bool {
        self.sessions.lock().await.contains_key(&user_id)
    }

    async fn ensure_enabled(&self, mode: TopupMode) -> Result<(), DepositError> {
        let methods = self.ledger.topup_methods().await?;
        if methods.is_enabled(mode.method()) {
            Ok(())
        } else {
            Err(DepositError::MethodDisabled(mode.label()))
        }
    }

    /// Opens a fresh keypad prompt, replacing any entry already in progress.
    /// Fails with `MethodDisabled` when an admin has switched the method off.
    pub async fn begin(&self, user_id: i64, chat_id: i64, mode: TopupMode) -> Result<(), DepositError> {
        self.ensure_enabled(mode).await?;

        let message = self
            .messenger
            .send_text(
                chat_id,
                &AmountEntry::new(mode, MessageRef { chat_id, message_id: 0 }).render(),
                Some(keyboards::amount_keypad()),
            )
            .await?;

        let previous = self
            .sessions
            .lock()
            .await
            .insert(user_id, Arc::new(Mutex::new(AmountEntry::new(mode, message))));

        if let Some(previous) = previous {
            let mut entry = previous.lock().await;
            entry.closed = true;
            self.delete_prompt(entry.message).await;
        }
        Ok(())
    }

    pub async fn cancel(&self, user_id: i64) -> bool {
        let Some(session) = self.sessions.lock().await.remove(&user_id) else {
            return false;
        };
        let mut entry = session.lock().await;
        entry.closed = true;
        self.delete_prompt(entry.message).await;
        true
    }

    pub async fn handle(&self, user_id: i64, username: Option<String>, event: KeypadEvent) -> KeypadReply {
        let Some(session) = self.sessions.lock().await.get(&user_id).cloned() else {
            return KeypadReply::NoSession;
        };

        // Events for one user run one at a time.
        let mut entry = session.lock().await;
        if entry.closed {
            return KeypadReply::NoSession;
        }

        match entry.apply(event) {
            Err(e) => KeypadReply::Alert(e.user_message()),
            Ok(Transition::Unchanged) => KeypadReply::Updated,
            Ok(Transition::Updated) => {
                let text = entry.render();
                match self
                    .messenger
                    .edit_text(entry.message, &text, Some(keyboards::amount_keypad()))
                    .await
                {
                    Ok(()) | Err(TransportError::NotModified) => {}
                    Err(e) => warn!(user_id, "Failed to refresh amount prompt: {}", e),
                }
                KeypadReply::Updated
            }
            Ok(Transition::Confirmed(amount)) => {
                entry.closed = true;
                let mode = entry.mode;
                let prompt = entry.message;
                drop(entry);

                {
                    let mut sessions = self.sessions.lock().await;
                    if sessions.get(&user_id).is_some_and(|s| Arc::ptr_eq(s, &session)) {
                        sessions.remove(&user_id);
                    }
                }
                self.delete_prompt(prompt).await;

                info!(user_id, amount, mode = mode.label(), "Topup amount confirmed");
                // The method may have been switched off while the amount was typed.
                let created = match self.ensure_enabled(mode).await {
                    Err(e) => Err(e),
                    Ok(()) => match mode {
                        TopupMode::Qris => self
                            .deposits
                            .create_deposit(user_id, username, amount)
                            .await
                            .map(|_| ()),
                        TopupMode::Saweria => self.saweria.create(user_id, username, amount).await.map(|_| ()),
                    },
                };
                match created {
                    Ok(()) => KeypadReply::Created { requested: amount },
                    Err(e) => {
                        warn!(user_id, amount, "Topup creation failed: {}", e);
                        if let Err(send_err) = self
                            .messenger
                            .send_text(prompt.chat_id, &e.user_message(), Some(keyboards::back_to_topup()))
                            .await
                        {
                            warn!(user_id, "Failed to report topup failure: {}", send_err);
                        }
                        KeypadReply::CreateFailed(e)
                    }
                }
            }
        }
    }

    async fn delete_prompt(&self, message: MessageRef) {
        if let Err(e) = self.messenger.delete_message(message).await {
            warn!(chat_id = message.chat_id, "Failed to delete amount prompt: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: TopupMode) -> AmountEntry {
        AmountEntry::new(
            mode,
            MessageRef {
                chat_id: 1,
                message_id: 10,
            },
        )
    }

    #[test]
    fn digits_then_confirm_yields_amount() {
        let mut e = entry(TopupMode::Qris);
        for d in ['1', '0', '0'] {
            assert_eq!(e.apply(KeypadEvent::Digit(d)).unwrap(), Transition::Updated);
        }
        assert_eq!(e.apply(KeypadEvent::Confirm).unwrap(), Transition::Confirmed(100));
    }

    #[test]
    fn confirm_on_empty_buffer_is_rejected_without_change() {
        let mut e = entry(TopupMode::Qris);
        let before = e.clone();
        assert!(matches!(e.apply(KeypadEvent::Confirm), Err(DepositError::Validation(_))));
        assert_eq!(e, before);

        e.apply(KeypadEvent::Digit('9')).unwrap();
        e.apply(KeypadEvent::Digit('9')).unwrap();
        assert!(matches!(e.apply(KeypadEvent::Confirm), Err(DepositError::Validation(_))));
        assert_eq!(e.digits, "99");
    }

    #[test]
    fn digit_limit_depends_on_mode() {
        let mut qris = entry(TopupMode::Qris);
        for _ in 0..12 {
            qris.apply(KeypadEvent::Digit('5')).unwrap();
        }
        assert!(qris.apply(KeypadEvent::Digit('5')).is_err());
        assert_eq!(qris.digits.len(), 12);

        let mut saweria = entry(TopupMode::Saweria);
        for _ in 0..8 {
            saweria.apply(KeypadEvent::Digit('1')).unwrap();
        }
        assert!(saweria.apply(KeypadEvent::Digit('1')).is_err());
    }

    #[test]
    fn delete_on_empty_is_a_no_op() {
        let mut e = entry(TopupMode::Qris);
        assert_eq!(e.apply(KeypadEvent::Delete).unwrap(), Transition::Unchanged);
        e.apply(KeypadEvent::Digit('7')).unwrap();
        assert_eq!(e.apply(KeypadEvent::Delete).unwrap(), Transition::Updated);
        assert!(e.digits.is_empty());
    }

    #[test]
    fn parses_keypad_callbacks() {
        assert_eq!(KeypadEvent::parse("7"), Some(KeypadEvent::Digit('7')));
        assert_eq!(KeypadEvent::parse("delete"), Some(KeypadEvent::Delete));
        assert_eq!(KeypadEvent::parse("confirm"), Some(KeypadEvent::Confirm));
        assert_eq!(KeypadEvent::parse("12"), None);
        assert_eq!(KeypadEvent::parse("batal_topup_x"), None);
    }
}
