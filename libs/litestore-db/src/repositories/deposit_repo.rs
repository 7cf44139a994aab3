use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::warn;

use crate::models::{MessageRef, PendingDeposit};

#[derive(Debug, Clone)]
pub struct DepositRepository {
    pool: PgPool,
}

impl DepositRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_deposit(row: &PgRow) -> Result<PendingDeposit> {
        let user_id: i64 = row.try_get("user_id")?;
        let status: String = row.try_get("status")?;
        let qr_message_id: Option<i32> = row.try_get("qr_message_id")?;
        Ok(PendingDeposit {
            unique_code: row.try_get("unique_code")?,
            user_id,
            username: row.try_get("username")?,
            target_amount: row.try_get("amount")?,
            requested_amount: row.try_get("original_amount")?,
            created_at: row.try_get::<DateTime<Utc>, _>("timestamp")?,
            status: status.parse()?,
            // QR photos are always sent to the owner's private chat.
            qr_message: qr_message_id.map(|message_id| MessageRef {
                chat_id: user_id,
                message_id,
            }),
        })
    }

    pub async fn insert(&self, deposit: &PendingDeposit) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_deposits
                (unique_code, user_id, username, amount, original_amount, timestamp, status, qr_message_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&deposit.unique_code)
        .bind(deposit.user_id)
        .bind(deposit.username.as_deref())
        .bind(deposit.target_amount)
        .bind(deposit.requested_amount)
        .bind(deposit.created_at)
        .bind(deposit.status.as_str())
        .bind(deposit.qr_message.map(|m| m.message_id))
        .execute(&self.pool)
        .await
        .context("Failed to insert pending deposit")?;
        Ok(())
    }

    /// Deleting a code that is already gone is not an error.
    pub async fn delete(&self, unique_code: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM pending_deposits WHERE unique_code = $1")
            .bind(unique_code)
            .execute(&self.pool)
            .await
            .context("Failed to delete pending deposit")?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn delete_in_tx(tx: &mut Transaction<'_, Postgres>, unique_code: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM pending_deposits WHERE unique_code = $1")
            .bind(unique_code)
            .execute(&mut **tx)
            .await
            .context("Failed to delete pending deposit")?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn load_pending(&self) -> Result<Vec<PendingDeposit>> {
        let rows = sqlx::query("SELECT * FROM pending_deposits WHERE status = 'pending' ORDER BY timestamp")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load pending deposits")?;

        let mut deposits = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_deposit(row) {
                Ok(deposit) => deposits.push(deposit),
                Err(e) => warn!("Skipping unreadable pending deposit row: {:#}", e),
            }
        }
        Ok(deposits)
    }
}
