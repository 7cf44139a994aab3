use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::models::{BonusConfig, BonusLogEntry, PendingDeposit, TopupLogEntry, TopupMethod, TopupMethods};
use crate::repositories::{
    BonusRepository, DepositRepository, TopupMethodRepository, TopupRepository, UserRepository,
};

/// Everything needed to settle one matched payment.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementRequest {
    /// Pending row to remove in the same transaction, when the deposit was persisted.
    pub unique_code: Option<String>,
    pub user_id: i64,
    pub username: Option<String>,
    /// Amount credited to the balance (the requested amount, never the salted one).
    pub amount: i64,
    pub bonus: i64,
    pub method: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub balance_after: i64,
    /// False when the pending row had already been removed by someone else.
    pub pending_removed: bool,
}

/// Durable wallet operations the deposit engines depend on.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn ensure_user(&self, user_id: i64) -> Result<()>;

    async fn balance(&self, user_id: i64) -> Result<i64>;

    /// Signed admin adjustment; `None` when it would overdraw the account.
    async fn adjust_balance(&self, user_id: i64, delta: i64) -> Result<Option<i64>>;

    async fn insert_pending(&self, deposit: &PendingDeposit) -> Result<()>;

    async fn delete_pending(&self, unique_code: &str) -> Result<bool>;

    async fn load_pending(&self) -> Result<Vec<PendingDeposit>>;

    async fn bonus_config(&self) -> Result<BonusConfig>;

    async fn set_bonus_config(&self, config: &BonusConfig) -> Result<()>;

    async fn topup_methods(&self) -> Result<TopupMethods>;

    /// Turns one topup method on or off and returns the new switches.
    async fn toggle_topup_method(&self, method: TopupMethod) -> Result<TopupMethods>;

    /// Credits `amount + bonus`, removes the pending row and appends the
    /// topup and bonus logs atomically.
    async fn settle(&self, request: &SettlementRequest) -> Result<SettlementReceipt>;

    async fn recent_bonus_log(&self, limit: i64) -> Result<Vec<BonusLogEntry>>;

    async fn recent_topup_log(&self, limit: i64) -> Result<Vec<TopupLogEntry>>;
}

#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
    users: UserRepository,
    deposits: DepositRepository,
    bonuses: BonusRepository,
    topups: TopupRepository,
    methods: TopupMethodRepository,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            deposits: DepositRepository::new(pool.clone()),
            bonuses: BonusRepository::new(pool.clone()),
            topups: TopupRepository::new(pool.clone()),
            methods: TopupMethodRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn ensure_user(&self, user_id: i64) -> Result<()> {
        self.users.ensure(user_id).await
    }

    async fn balance(&self, user_id: i64) -> Result<i64> {
        self.users.balance(user_id).await
    }

    async fn adjust_balance(&self, user_id: i64, delta: i64) -> Result<Option<i64>> {
        self.users.ensure(user_id).await?;
        self.users.adjust(user_id, delta).await
    }

    async fn insert_pending(&self, deposit: &PendingDeposit) -> Result<()> {
        self.deposits.insert(deposit).await
    }

    async fn delete_pending(&self, unique_code: &str) -> Result<bool> {
        self.deposits.delete(unique_code).await
    }

    async fn load_pending(&self) -> Result<Vec<PendingDeposit>> {
        self.deposits.load_pending().await
    }

    async fn bonus_config(&self) -> Result<BonusConfig> {
        self.bonuses.get_config().await
    }

    async fn set_bonus_config(&self, config: &BonusConfig) -> Result<()> {
        self.bonuses.set_config(config).await
    }

    async fn topup_methods(&self) -> Result<TopupMethods> {
        self.methods.get().await
    }

    async fn toggle_topup_method(&self, method: TopupMethod) -> Result<TopupMethods> {
        let methods = self.methods.toggle(method).await?;
        info!(%method, enabled = methods.is_enabled(method), "Topup method toggled");
        Ok(methods)
    }

    async fn settle(&self, request: &SettlementRequest) -> Result<SettlementReceipt> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open settlement transaction")?;

        let pending_removed = match &request.unique_code {
            Some(code) => DepositRepository::delete_in_tx(&mut tx, code).await?,
            None => true,
        };
        if !pending_removed {
            warn!(
                user_id = request.user_id,
                code = ?request.unique_code,
                "Settling a deposit whose pending row is already gone"
            );
        }

        let mut balance_after =
            UserRepository::credit_in_tx(&mut tx, request.user_id, request.amount).await?;
        TopupRepository::log_in_tx(
            &mut tx,
            request.user_id,
            request.username.as_deref(),
            request.amount,
            &request.method,
        )
        .await?;

        if request.bonus > 0 {
            balance_after =
                UserRepository::credit_in_tx(&mut tx, request.user_id, request.bonus).await?;
            BonusRepository::log_in_tx(
                &mut tx,
                request.user_id,
                request.username.as_deref(),
                request.amount,
                request.bonus,
            )
            .await?;
        }

        tx.commit()
            .await
            .context("Failed to commit settlement transaction")?;

        info!(
            user_id = request.user_id,
            amount = request.amount,
            bonus = request.bonus,
            method = %request.method,
            balance_after,
            "Topup settled"
        );

        Ok(SettlementReceipt {
            balance_after,
            pending_removed,
        })
    }

    async fn recent_bonus_log(&self, limit: i64) -> Result<Vec<BonusLogEntry>> {
        self.bonuses.recent(limit).await
    }

    async fn recent_topup_log(&self, limit: i64) -> Result<Vec<TopupLogEntry>> {
        self.topups.recent(limit).await
    }
}
