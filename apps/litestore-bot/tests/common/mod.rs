//! In-memory collaborators for the engine integration tests.

#![allow(dead_code)] // Each test file uses a different subset

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use teloxide::types::InlineKeyboardMarkup;

use litestore_bot::services::deposit_service::{DepositService, DepositSettings};
use litestore_bot::services::input_service::InputService;
use litestore_bot::services::notification_service::{GroupSink, NotificationService};
use litestore_bot::services::payment::{
    GatewayError, GatewayTransaction, QrisGateway, SaweriaGateway, SaweriaInvoice,
};
use litestore_bot::services::saweria_service::SaweriaService;
use litestore_bot::transport::{Messenger, QrImage, TransportError};
use litestore_db::models::{
    BonusConfig, BonusLogEntry, DepositStatus, MessageRef, PendingDeposit, TopupLogEntry, TopupMethod,
    TopupMethods,
};
use litestore_db::{Ledger, SettlementReceipt, SettlementRequest};

#[derive(Default)]
struct LedgerState {
    balances: HashMap<i64, i64>,
    pending: HashMap<String, PendingDeposit>,
    bonus: BonusConfig,
    methods: TopupMethods,
    bonus_log: Vec<BonusLogEntry>,
    topup_log: Vec<TopupLogEntry>,
}

/// `Ledger` over a mutex; `settle` is all-or-nothing like the SQL transaction.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    pub fail_settle: AtomicBool,
}

impl MemoryLedger {
    pub fn balance_of(&self, user_id: i64) -> i64 {
        self.state.lock().unwrap().balances.get(&user_id).copied().unwrap_or(0)
    }

    pub fn stored_pending(&self) -> Vec<PendingDeposit> {
        self.state.lock().unwrap().pending.values().cloned().collect()
    }

    pub fn topups(&self) -> Vec<TopupLogEntry> {
        self.state.lock().unwrap().topup_log.clone()
    }

    pub fn bonuses(&self) -> Vec<BonusLogEntry> {
        self.state.lock().unwrap().bonus_log.clone()
    }

    pub fn set_bonus(&self, config: BonusConfig) {
        self.state.lock().unwrap().bonus = config;
    }

    pub fn seed_pending(&self, deposit: PendingDeposit) {
        self.state
            .lock()
            .unwrap()
            .pending
            .insert(deposit.unique_code.clone(), deposit);
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn ensure_user(&self, user_id: i64) -> Result<()> {
        self.state.lock().unwrap().balances.entry(user_id).or_insert(0);
        Ok(())
    }

    async fn balance(&self, user_id: i64) -> Result<i64> {
        Ok(self.balance_of(user_id))
    }

    async fn adjust_balance(&self, user_id: i64, delta: i64) -> Result<Option<i64>> {
        let mut state = self.state.lock().unwrap();
        let balance = state.balances.entry(user_id).or_insert(0);
        if *balance + delta < 0 {
            return Ok(None);
        }
        *balance += delta;
        Ok(Some(*balance))
    }

    async fn insert_pending(&self, deposit: &PendingDeposit) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.pending.contains_key(&deposit.unique_code) {
            return Err(anyhow!("duplicate unique_code {}", deposit.unique_code));
        }
        state.pending.insert(deposit.unique_code.clone(), deposit.clone());
        Ok(())
    }

    async fn delete_pending(&self, unique_code: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().pending.remove(unique_code).is_some())
    }

    async fn load_pending(&self) -> Result<Vec<PendingDeposit>> {
        Ok(self.stored_pending())
    }

    async fn bonus_config(&self) -> Result<BonusConfig> {
        Ok(self.state.lock().unwrap().bonus)
    }

    async fn set_bonus_config(&self, config: &BonusConfig) -> Result<()> {
        config.validate()?;
        self.state.lock().unwrap().bonus = *config;
        Ok(())
    }

    async fn topup_methods(&self) -> Result<TopupMethods> {
        Ok(self.state.lock().unwrap().methods)
    }

    async fn toggle_topup_method(&self, method: TopupMethod) -> Result<TopupMethods> {
        let mut state = self.state.lock().unwrap();
        state.methods = state.methods.toggled(method);
        Ok(state.methods)
    }

    async fn settle(&self, request: &SettlementRequest) -> Result<SettlementReceipt> {
        if self.fail_settle.load(Ordering::SeqCst) {
            return Err(anyhow!("database is unavailable"));
        }
        let mut state = self.state.lock().unwrap();
        let pending_removed = match &request.unique_code {
            Some(code) => state.pending.remove(code).is_some(),
            None => true,
        };
        let balance = state.balances.entry(request.user_id).or_insert(0);
        *balance += request.amount + request.bonus;
        let balance_after = *balance;

        let next_id = state.topup_log.len() as i64 + 1;
        state.topup_log.push(TopupLogEntry {
            id: next_id,
            user_id: request.user_id,
            username: request.username.clone(),
            amount: request.amount,
            method: request.method.clone(),
            waktu: Utc::now(),
        });
        if request.bonus > 0 {
            let next_id = state.bonus_log.len() as i64 + 1;
            state.bonus_log.push(BonusLogEntry {
                id: next_id,
                user_id: request.user_id,
                username: request.username.clone(),
                amount: request.amount,
                bonus: request.bonus,
                timestamp: Utc::now(),
            });
        }
        Ok(SettlementReceipt {
            balance_after,
            pending_removed,
        })
    }

    async fn recent_bonus_log(&self, limit: i64) -> Result<Vec<BonusLogEntry>> {
        Ok(self.bonuses().into_iter().rev().take(limit as usize).collect())
    }

    async fn recent_topup_log(&self, limit: i64) -> Result<Vec<TopupLogEntry>> {
        Ok(self.topups().into_iter().rev().take(limit as usize).collect())
    }
}

/// Primary gateway whose mutation feed is whatever the test pushes.
#[derive(Default)]
pub struct FakeQris {
    feed: Mutex<Vec<GatewayTransaction>>,
    pub fail_qr: AtomicBool,
    pub fail_feed: AtomicBool,
    pub feed_reads: AtomicUsize,
}

impl FakeQris {
    pub fn pay(&self, reference_id: &str, amount: i64) {
        self.feed.lock().unwrap().push(GatewayTransaction {
            reference_id: reference_id.to_string(),
            amount,
        });
    }
}

#[async_trait]
impl QrisGateway for FakeQris {
    async fn generate_qr(&self, amount: i64) -> Result<QrImage, GatewayError> {
        if self.fail_qr.load(Ordering::SeqCst) {
            return Err(GatewayError::Status(502));
        }
        Ok(QrImage::Png(amount.to_string().into_bytes()))
    }

    async fn list_recent_transactions(&self) -> Result<Vec<GatewayTransaction>, GatewayError> {
        self.feed_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_feed.load(Ordering::SeqCst) {
            return Err(GatewayError::Status(503));
        }
        Ok(self.feed.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeSaweria {
    next_id: AtomicUsize,
    paid: Mutex<HashSet<String>>,
    pub not_configured: AtomicBool,
    pub fail_check: AtomicBool,
    pub checks: AtomicUsize,
}

impl FakeSaweria {
    pub fn mark_paid(&self, transaction_id: &str) {
        self.paid.lock().unwrap().insert(transaction_id.to_string());
    }
}

#[async_trait]
impl SaweriaGateway for FakeSaweria {
    async fn create_transaction(&self, amount: i64) -> Result<SaweriaInvoice, GatewayError> {
        if self.not_configured.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConfigured);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SaweriaInvoice {
            transaction_id: format!("SAW-{}", id),
            qr_image_url: format!("https://qr.example.test/{}.png?amount={}", id, amount),
            check_payment_url: None,
            timestamp: Some("2025-01-01 10:00:00".into()),
        })
    }

    async fn check_payment(&self, transaction_id: &str) -> Result<bool, GatewayError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_check.load(Ordering::SeqCst) {
            return Err(GatewayError::Status(500));
        }
        Ok(self.paid.lock().unwrap().contains(transaction_id))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { chat_id: i64, text: String },
    Photo { chat_id: i64, caption: String },
}

/// Records every outbound message; message ids count up from 1.
#[derive(Default)]
pub struct RecordingMessenger {
    next_id: AtomicI32,
    pub sent: Mutex<Vec<Sent>>,
    pub edits: Mutex<Vec<(MessageRef, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub edits_unchanged: AtomicBool,
    pub fail_sends: AtomicBool,
}

impl RecordingMessenger {
    fn next_ref(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Text { chat_id: c, text } if *c == chat_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count_texts_containing(&self, chat_id: i64, needle: &str) -> usize {
        self.texts_to(chat_id).iter().filter(|t| t.contains(needle)).count()
    }

    pub fn photos(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| matches!(s, Sent::Photo { .. }))
            .count()
    }

    pub fn was_deleted(&self, message: MessageRef) -> bool {
        self.deleted.lock().unwrap().contains(&message)
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Request("bot was blocked by the user".into()));
        }
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.next_ref(chat_id))
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _photo: QrImage,
        caption: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<MessageRef, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Request("bot was blocked by the user".into()));
        }
        self.sent.lock().unwrap().push(Sent::Photo {
            chat_id,
            caption: caption.to_string(),
        });
        Ok(self.next_ref(chat_id))
    }

    async fn edit_text(
        &self,
        message: MessageRef,
        text: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), TransportError> {
        if self.edits_unchanged.load(Ordering::SeqCst) {
            return Err(TransportError::NotModified);
        }
        self.edits.lock().unwrap().push((message, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
        let mut deleted = self.deleted.lock().unwrap();
        if deleted.contains(&message) {
            return Err(TransportError::Request("message to delete not found".into()));
        }
        deleted.push(message);
        Ok(())
    }

    async fn username(&self, chat_id: i64) -> Result<Option<String>, TransportError> {
        Ok(Some(format!("@user{}", chat_id)))
    }
}

#[derive(Default)]
pub struct RecordingGroup {
    pub posts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl GroupSink for RecordingGroup {
    async fn post(&self, text: &str) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Request("group chat not found".into()));
        }
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn open_deposit(code: &str, user_id: i64, requested: i64, target: i64, created_at: DateTime<Utc>) -> PendingDeposit {
    PendingDeposit {
        unique_code: code.to_string(),
        user_id,
        username: Some(format!("@user{}", user_id)),
        target_amount: target,
        requested_amount: requested,
        created_at,
        status: DepositStatus::Pending,
        qr_message: Some(MessageRef {
            chat_id: user_id,
            message_id: 9_000 + (target % 1_000) as i32,
        }),
    }
}

/// Both engines wired to fakes, with the creation cooldown disabled.
pub struct TestHarness {
    pub ledger: Arc<MemoryLedger>,
    pub qris: Arc<FakeQris>,
    pub saweria_gateway: Arc<FakeSaweria>,
    pub messenger: Arc<RecordingMessenger>,
    pub group: Arc<RecordingGroup>,
    pub deposits: DepositService,
    pub saweria: SaweriaService,
    pub input: InputService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(DepositSettings {
            expiry: chrono::Duration::minutes(5),
            max_pending_per_user: 3,
            create_cooldown: std::time::Duration::ZERO,
        })
    }

    pub fn with_settings(settings: DepositSettings) -> Self {
        let ledger = Arc::new(MemoryLedger::default());
        let qris = Arc::new(FakeQris::default());
        let saweria_gateway = Arc::new(FakeSaweria::default());
        let messenger = Arc::new(RecordingMessenger::default());
        let group = Arc::new(RecordingGroup::default());

        let notifier = NotificationService::new(
            messenger.clone(),
            Some(group.clone() as Arc<dyn GroupSink>),
            "LITESTORE".into(),
        );
        let expiry = settings.expiry;
        let deposits = DepositService::new(ledger.clone(), qris.clone(), notifier.clone(), settings);
        let saweria = SaweriaService::new(ledger.clone(), saweria_gateway.clone(), notifier, expiry);
        let input = InputService::new(messenger.clone(), ledger.clone(), deposits.clone(), saweria.clone());

        Self {
            ledger,
            qris,
            saweria_gateway,
            messenger,
            group,
            deposits,
            saweria,
            input,
        }
    }

    pub fn group_posts(&self) -> Vec<String> {
        self.group.posts.lock().unwrap().clone()
    }
}
