use chrono::{DateTime, Utc};
use litestore_db::models::MessageRef;
use litestore_db::{Ledger, SettlementRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::DepositError;
use crate::services::bonus_service::compute_bonus;
use crate::services::deposit_service::{PassReport, MIN_TOPUP_AMOUNT};
use crate::services::notification_service::{NotificationService, TopupReceipt};
use crate::services::payment::SaweriaGateway;
use crate::services::reconcile::{saweria_step, SaweriaStep};

pub const SAWERIA_METHOD: &str = "Saweria";

/// An open secondary-gateway topup, correlated by the gateway's transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct SaweriaDeposit {
    pub transaction_id: String,
    pub user_id: i64,
    pub username: Option<String>,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub qr_message: MessageRef,
    pub check_payment_url: Option<String>,
    /// Set once a paid check has claimed the record for settlement.
    pub checked: bool,
}

#[derive(Clone)]
pub struct SaweriaService {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: Arc<dyn Ledger>,
    gateway: Arc<dyn SaweriaGateway>,
    notifier: NotificationService,
    expiry: chrono::Duration,
    pending: RwLock<HashMap<String, SaweriaDeposit>>,
}

impl SaweriaService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        gateway: Arc<dyn SaweriaGateway>,
        notifier: NotificationService,
        expiry: chrono::Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                gateway,
                notifier,
                expiry,
                pending: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub async fn get(&self, transaction_id: &str) -> Option<SaweriaDeposit> {
        self.inner.pending.read().await.get(transaction_id).cloned()
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.pending.read().await.len()
    }

    pub async fn create(
        &self,
        user_id: i64,
        username: Option<String>,
        amount: i64,
    ) -> Result<SaweriaDeposit, DepositError> {
        if amount < MIN_TOPUP_AMOUNT {
            return Err(DepositError::Validation(format!(
                "Minimum topup is Rp{}",
                MIN_TOPUP_AMOUNT
            )));
        }

        self.inner.ledger.ensure_user(user_id).await?;

        let invoice = self.inner.gateway.create_transaction(amount).await.map_err(|e| {
            warn!(user_id, amount, "Saweria transaction creation failed: {}", e);
            DepositError::from(e)
        })?;

        let expiry_minutes = self.inner.expiry.num_minutes().max(1);
        let qr_message = self
            .inner
            .notifier
            .send_saweria_qr(user_id, &invoice, amount, expiry_minutes)
            .await?;

        let deposit = SaweriaDeposit {
            transaction_id: invoice.transaction_id.clone(),
            user_id,
            username,
            amount,
            created_at: Utc::now(),
            qr_message,
            check_payment_url: invoice.check_payment_url.clone(),
            checked: false,
        };
        self.inner
            .pending
            .write()
            .await
            .insert(deposit.transaction_id.clone(), deposit.clone());

        info!(
            user_id,
            transaction_id = %deposit.transaction_id,
            amount,
            "Saweria deposit created"
        );
        Ok(deposit)
    }

    /// Fails with `AlreadyProcessed` once a paid check has claimed the record.
    pub async fn cancel(&self, transaction_id: &str, user_id: i64) -> Result<SaweriaDeposit, DepositError> {
        let deposit = {
            let mut pending = self.inner.pending.write().await;
            match pending.get(transaction_id).map(|d| (d.user_id, d.checked)) {
                Some((owner, _)) if owner != user_id => return Err(DepositError::NotFound),
                Some((_, true)) => return Err(DepositError::AlreadyProcessed),
                Some(_) => pending.remove(transaction_id),
                None => None,
            }
        }
        .ok_or(DepositError::NotFound)?;

        self.inner
            .notifier
            .deposit_cancelled(user_id, Some(deposit.qr_message), SAWERIA_METHOD)
            .await;
        info!(user_id, transaction_id, "Saweria deposit cancelled");
        Ok(deposit)
    }

    pub async fn pass(&self) -> PassReport {
        self.pass_at(Utc::now()).await
    }

    pub async fn pass_at(&self, now: DateTime<Utc>) -> PassReport {
        let mut report = PassReport::default();
        let snapshot: Vec<SaweriaDeposit> = self.inner.pending.read().await.values().cloned().collect();

        for deposit in snapshot {
            match saweria_step(deposit.checked, deposit.created_at, now, self.inner.expiry) {
                SaweriaStep::Skip => {}
                SaweriaStep::Expire => {
                    if self.expire(&deposit.transaction_id).await {
                        report.expired += 1;
                    }
                }
                SaweriaStep::Check => {
                    match self.inner.gateway.check_payment(&deposit.transaction_id).await {
                        Ok(true) => match self.settle(&deposit.transaction_id).await {
                            Ok(_) => report.settled += 1,
                            Err(DepositError::AlreadyProcessed) | Err(DepositError::NotFound) => {}
                            Err(e) => {
                                report.failed += 1;
                                error!(transaction_id = %deposit.transaction_id, "Saweria settlement failed: {}", e);
                            }
                        },
                        Ok(false) => {}
                        Err(e) => {
                            report.gateway_unavailable = true;
                            warn!(transaction_id = %deposit.transaction_id, "Saweria payment check failed: {}", e);
                        }
                    }
                }
            }
        }

        report
    }

    async fn expire(&self, transaction_id: &str) -> bool {
        let deposit = {
            let mut pending = self.inner.pending.write().await;
            match pending.get(transaction_id).map(|d| d.checked) {
                Some(false) => pending.remove(transaction_id),
                _ => None,
            }
        };
        let Some(deposit) = deposit else {
            return false;
        };
        self.inner
            .notifier
            .deposit_expired(deposit.user_id, Some(deposit.qr_message), SAWERIA_METHOD)
            .await;
        info!(user_id = deposit.user_id, transaction_id, "Saweria deposit expired");
        true
    }

    async fn settle(&self, transaction_id: &str) -> Result<TopupReceipt, DepositError> {
        let deposit = {
            let mut pending = self.inner.pending.write().await;
            match pending.get_mut(transaction_id) {
                Some(d) if d.checked => return Err(DepositError::AlreadyProcessed),
                Some(d) => {
                    d.checked = true;
                    d.clone()
                }
                None => return Err(DepositError::NotFound),
            }
        };

        let username = match deposit.username.clone() {
            Some(name) => Some(name),
            None => self.inner.notifier.lookup_username(deposit.user_id).await,
        };

        let result = async {
            let config = self.inner.ledger.bonus_config().await?;
            let bonus = compute_bonus(deposit.amount, &config);
            let request = SettlementRequest {
                unique_code: None,
                user_id: deposit.user_id,
                username: username.clone(),
                amount: deposit.amount,
                bonus: bonus.bonus,
                method: SAWERIA_METHOD.to_string(),
            };
            let receipt = self.inner.ledger.settle(&request).await?;
            Ok::<_, anyhow::Error>((bonus, receipt))
        }
        .await;

        let (bonus, receipt) = match result {
            Ok(done) => done,
            Err(e) => {
                if let Some(d) = self.inner.pending.write().await.get_mut(transaction_id) {
                    d.checked = false;
                }
                return Err(DepositError::Storage(e));
            }
        };

        self.inner.pending.write().await.remove(transaction_id);

        info!(
            user_id = deposit.user_id,
            transaction_id,
            amount = deposit.amount,
            bonus = bonus.bonus,
            balance = receipt.balance_after,
            "Saweria deposit settled"
        );

        let notice = TopupReceipt {
            user_id: deposit.user_id,
            username,
            method: SAWERIA_METHOD,
            paid_amount: deposit.amount,
            credited: deposit.amount,
            bonus,
            balance_after: receipt.balance_after,
            qr_message: Some(deposit.qr_message),
        };
        self.inner.notifier.payment_success(&notice).await;
        Ok(notice)
    }
}
