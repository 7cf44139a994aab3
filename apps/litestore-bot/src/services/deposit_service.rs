use chrono::{DateTime, Utc};
use litestore_db::models::{DepositStatus, PendingDeposit};
use litestore_db::{Ledger, SettlementRequest};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::DepositError;
use crate::services::bonus_service::compute_bonus;
use crate::services::notification_service::{NotificationService, TopupReceipt};
use crate::services::payment::{GatewayTransaction, QrisGateway};
use crate::services::reconcile::{plan_pass, PassEffect, SettledTransactions};

pub const MIN_TOPUP_AMOUNT: i64 = 100;
pub const MAX_SALT: i64 = 99;
pub const QRIS_METHOD: &str = "QRIS";

/// How long a settled transaction key is remembered after its transaction
/// was last seen on the feed, on top of the payment window.
const SETTLED_RETENTION_MARGIN_MINUTES: i64 = 10;

#[derive(Debug, Clone)]
pub struct DepositSettings {
    pub expiry: chrono::Duration,
    pub max_pending_per_user: usize,
    pub create_cooldown: std::time::Duration,
}

impl Default for DepositSettings {
    fn default() -> Self {
        Self {
            expiry: chrono::Duration::minutes(5),
            max_pending_per_user: 3,
            create_cooldown: std::time::Duration::from_secs(1),
        }
    }
}

/// Counts of what one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub expired: usize,
    pub settled: usize,
    pub failed: usize,
    pub gateway_unavailable: bool,
}

/// Picks `requested + salt` with a salt in `1..=99` that no open deposit uses.
pub fn pick_target_amount<R: Rng + ?Sized>(requested: i64, taken: &HashSet<i64>, rng: &mut R) -> Option<i64> {
    let free: Vec<i64> = (1..=MAX_SALT)
        .map(|salt| requested + salt)
        .filter(|amount| !taken.contains(amount))
        .collect();
    free.choose(rng).copied()
}

/// Primary QRIS engine: owns the open deposits, both in memory and in the store.
#[derive(Clone)]
pub struct DepositService {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: Arc<dyn Ledger>,
    gateway: Arc<dyn QrisGateway>,
    notifier: NotificationService,
    settings: DepositSettings,
    pending: RwLock<HashMap<String, PendingDeposit>>,
    settled: Mutex<SettledTransactions>,
    last_create: Mutex<Option<Instant>>,
}

impl DepositService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        gateway: Arc<dyn QrisGateway>,
        notifier: NotificationService,
        settings: DepositSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                gateway,
                notifier,
                settings,
                pending: RwLock::new(HashMap::new()),
                settled: Mutex::new(SettledTransactions::new()),
                last_create: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &DepositSettings {
        &self.inner.settings
    }

    /// Reloads open deposits after a restart. Rows whose QR never went out are dropped.
    pub async fn restore(&self) -> Result<usize, DepositError> {
        let rows = self.inner.ledger.load_pending().await?;
        let mut restored = 0;
        let mut pending = self.inner.pending.write().await;
        for deposit in rows {
            if deposit.status != DepositStatus::Pending {
                continue;
            }
            if deposit.qr_message.is_none() {
                warn!(unique_code = %deposit.unique_code, "Dropping pending deposit without QR message");
                if let Err(e) = self.inner.ledger.delete_pending(&deposit.unique_code).await {
                    error!(unique_code = %deposit.unique_code, "Failed to drop orphaned deposit: {:#}", e);
                }
                continue;
            }
            pending.insert(deposit.unique_code.clone(), deposit);
            restored += 1;
        }
        info!("Restored {} pending QRIS deposits", restored);
        Ok(restored)
    }

    pub async fn get(&self, unique_code: &str) -> Option<PendingDeposit> {
        self.inner.pending.read().await.get(unique_code).cloned()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.read().await.len()
    }

    pub async fn pending_for_user(&self, user_id: i64) -> Vec<PendingDeposit> {
        self.inner
            .pending
            .read()
            .await
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn check_cooldown(&self) -> Result<(), DepositError> {
        let cooldown = self.inner.settings.create_cooldown;
        if cooldown.is_zero() {
            return Ok(());
        }
        let mut last = self.inner.last_create.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < cooldown {
                return Err(DepositError::RateLimited);
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }

    /// Indexes a reservation without a QR message so the target amount is
    /// taken before any I/O happens.
    async fn reserve(
        &self,
        user_id: i64,
        username: Option<String>,
        requested: i64,
        now: DateTime<Utc>,
    ) -> Result<PendingDeposit, DepositError> {
        let mut pending = self.inner.pending.write().await;

        let open_for_user = pending.values().filter(|d| d.user_id == user_id).count();
        if open_for_user >= self.inner.settings.max_pending_per_user {
            return Err(DepositError::TooManyPending(open_for_user));
        }

        let taken: HashSet<i64> = pending.values().map(|d| d.target_amount).collect();
        let target_amount = pick_target_amount(requested, &taken, &mut rand::rng())
            .ok_or(DepositError::TargetAmountExhausted(requested))?;

        let mut unique_code = format!("user-{}-{}", user_id, now.timestamp_millis());
        let mut n = 1;
        while pending.contains_key(&unique_code) {
            unique_code = format!("user-{}-{}-{}", user_id, now.timestamp_millis(), n);
            n += 1;
        }

        let deposit = PendingDeposit {
            unique_code: unique_code.clone(),
            user_id,
            username,
            target_amount,
            requested_amount: requested,
            created_at: now,
            status: DepositStatus::Pending,
            qr_message: None,
        };
        pending.insert(unique_code, deposit.clone());
        Ok(deposit)
    }

    async fn release(&self, unique_code: &str) {
        self.inner.pending.write().await.remove(unique_code);
    }

    pub async fn create_deposit(
        &self,
        user_id: i64,
        username: Option<String>,
        requested: i64,
    ) -> Result<PendingDeposit, DepositError> {
        if requested < MIN_TOPUP_AMOUNT {
            return Err(DepositError::Validation(format!(
                "Minimum topup is Rp{}",
                MIN_TOPUP_AMOUNT
            )));
        }
        self.check_cooldown().await?;

        let mut deposit = self.reserve(user_id, username, requested, Utc::now()).await?;
        let code = deposit.unique_code.clone();

        if let Err(e) = self.inner.ledger.ensure_user(user_id).await {
            self.release(&code).await;
            return Err(e.into());
        }

        let image = match self.inner.gateway.generate_qr(deposit.target_amount).await {
            Ok(image) => image,
            Err(e) => {
                self.release(&code).await;
                warn!(user_id, unique_code = %code, "QR generation failed: {}", e);
                return Err(e.into());
            }
        };

        let expiry_minutes = self.inner.settings.expiry.num_minutes().max(1);
        let qr_message = match self
            .inner
            .notifier
            .send_deposit_qr(&deposit, image, expiry_minutes)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                self.release(&code).await;
                warn!(user_id, unique_code = %code, "Failed to deliver QR: {}", e);
                return Err(e.into());
            }
        };
        deposit.qr_message = Some(qr_message);

        if let Err(e) = self.inner.ledger.insert_pending(&deposit).await {
            self.release(&code).await;
            self.inner.notifier.delete_quietly(Some(qr_message)).await;
            error!(user_id, unique_code = %code, "Failed to persist deposit: {:#}", e);
            return Err(e.into());
        }

        let still_open = {
            let mut pending = self.inner.pending.write().await;
            match pending.get_mut(&code) {
                Some(entry) => {
                    entry.qr_message = Some(qr_message);
                    true
                }
                None => false,
            }
        };
        if !still_open {
            // Cancelled while the QR was in flight.
            if let Err(e) = self.inner.ledger.delete_pending(&code).await {
                error!(unique_code = %code, "Failed to remove cancelled deposit: {:#}", e);
            }
            self.inner.notifier.delete_quietly(Some(qr_message)).await;
            return Err(DepositError::NotFound);
        }

        info!(
            user_id,
            unique_code = %code,
            requested,
            target = deposit.target_amount,
            "QRIS deposit created"
        );
        Ok(deposit)
    }

    /// Cancels an open deposit owned by `user_id`.
    pub async fn cancel(&self, unique_code: &str, user_id: i64) -> Result<PendingDeposit, DepositError> {
        let deposit = {
            let mut pending = self.inner.pending.write().await;
            match pending.get(unique_code).map(|d| d.user_id) {
                Some(owner) if owner == user_id => pending.remove(unique_code),
                _ => None,
            }
        }
        .ok_or(DepositError::NotFound)?;

        if let Err(e) = self.inner.ledger.delete_pending(unique_code).await {
            error!(unique_code, "Failed to delete cancelled deposit: {:#}", e);
        }
        self.inner
            .notifier
            .deposit_cancelled(user_id, deposit.qr_message, QRIS_METHOD)
            .await;
        info!(user_id, unique_code, "QRIS deposit cancelled");
        Ok(deposit)
    }

    pub async fn reconcile_pass(&self) -> PassReport {
        self.reconcile_pass_at(Utc::now()).await
    }

    pub async fn reconcile_pass_at(&self, now: DateTime<Utc>) -> PassReport {
        let expiry = self.inner.settings.expiry;
        let mut report = PassReport::default();

        let snapshot: Vec<PendingDeposit> = self.inner.pending.read().await.values().cloned().collect();
        let needs_gateway = snapshot
            .iter()
            .any(|d| d.qr_message.is_some() && !d.is_expired(now, expiry));

        let transactions: Option<Vec<GatewayTransaction>> = if needs_gateway {
            match self.inner.gateway.list_recent_transactions().await {
                Ok(txs) => {
                    let cutoff = now - expiry - chrono::Duration::minutes(SETTLED_RETENTION_MARGIN_MINUTES);
                    let mut settled = self.inner.settled.lock().await;
                    settled.mark_seen(&txs, now);
                    let pruned = settled.prune(cutoff);
                    if pruned > 0 {
                        debug!("Pruned {} settled transaction keys no longer on the feed", pruned);
                    }
                    Some(txs)
                }
                Err(e) => {
                    warn!("QRIS mutation poll failed: {}", e);
                    report.gateway_unavailable = true;
                    None
                }
            }
        } else {
            None
        };

        let effects = {
            let settled = self.inner.settled.lock().await;
            plan_pass(&snapshot, transactions.as_deref(), &settled, now, expiry)
        };

        for effect in effects {
            match effect {
                PassEffect::Expire { unique_code } => {
                    if self.expire(&unique_code).await {
                        report.expired += 1;
                    }
                }
                PassEffect::Settle {
                    unique_code,
                    transaction,
                } => match self.settle(&unique_code, &transaction, now).await {
                    Ok(_) => report.settled += 1,
                    Err(DepositError::AlreadyProcessed) | Err(DepositError::NotFound) => {
                        debug!(unique_code = %unique_code, "Settlement skipped");
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(unique_code = %unique_code, "Settlement failed: {}", e);
                    }
                },
            }
        }

        report
    }

    async fn expire(&self, unique_code: &str) -> bool {
        let Some(deposit) = self.inner.pending.write().await.remove(unique_code) else {
            return false;
        };
        if let Err(e) = self.inner.ledger.delete_pending(unique_code).await {
            error!(unique_code, "Failed to delete expired deposit: {:#}", e);
        }
        self.inner
            .notifier
            .deposit_expired(deposit.user_id, deposit.qr_message, QRIS_METHOD)
            .await;
        info!(user_id = deposit.user_id, unique_code, "QRIS deposit expired");
        true
    }

    /// Claims the deposit and the transaction key, then settles in one store
    /// transaction. A failed commit releases both claims.
    async fn settle(
        &self,
        unique_code: &str,
        transaction: &GatewayTransaction,
        now: DateTime<Utc>,
    ) -> Result<TopupReceipt, DepositError> {
        let key = transaction.idempotency_key();
        if !self.inner.settled.lock().await.insert(key.clone(), now) {
            return Err(DepositError::AlreadyProcessed);
        }

        let claimed = self.inner.pending.write().await.remove(unique_code);
        let Some(deposit) = claimed else {
            self.inner.settled.lock().await.forget(&key);
            return Err(DepositError::NotFound);
        };

        let username = match deposit.username.clone() {
            Some(name) => Some(name),
            None => self.inner.notifier.lookup_username(deposit.user_id).await,
        };

        let result = async {
            let config = self.inner.ledger.bonus_config().await?;
            let bonus = compute_bonus(deposit.requested_amount, &config);
            let request = SettlementRequest {
                unique_code: Some(deposit.unique_code.clone()),
                user_id: deposit.user_id,
                username: username.clone(),
                amount: deposit.requested_amount,
                bonus: bonus.bonus,
                method: QRIS_METHOD.to_string(),
            };
            let receipt = self.inner.ledger.settle(&request).await?;
            Ok::<_, anyhow::Error>((bonus, receipt))
        }
        .await;

        let (bonus, receipt) = match result {
            Ok(done) => done,
            Err(e) => {
                self.inner
                    .pending
                    .write()
                    .await
                    .insert(deposit.unique_code.clone(), deposit);
                self.inner.settled.lock().await.forget(&key);
                return Err(DepositError::Storage(e));
            }
        };

        info!(
            user_id = deposit.user_id,
            unique_code,
            reference_id = %transaction.reference_id,
            amount = deposit.requested_amount,
            bonus = bonus.bonus,
            balance = receipt.balance_after,
            "QRIS deposit settled"
        );

        let notice = TopupReceipt {
            user_id: deposit.user_id,
            username,
            method: QRIS_METHOD,
            paid_amount: transaction.amount,
            credited: deposit.requested_amount,
            bonus,
            balance_after: receipt.balance_after,
            qr_message: deposit.qr_message,
        };
        self.inner.notifier.payment_success(&notice).await;
        Ok(notice)
    }
}
