use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::TopupLogEntry;

#[derive(Debug, Clone)]
pub struct TopupRepository {
    pool: PgPool,
}

impl TopupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        username: Option<&str>,
        amount: i64,
        method: &str,
    ) -> Result<()> {
        sqlx::query("INSERT INTO topup_log (user_id, username, amount, method) VALUES ($1, $2, $3, $4)")
            .bind(user_id)
            .bind(username)
            .bind(amount)
            .bind(method)
            .execute(&mut **tx)
            .await
            .context("Failed to append topup log")?;
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<TopupLogEntry>> {
        sqlx::query_as::<_, TopupLogEntry>(
            "SELECT id, user_id, username, amount, method, waktu FROM topup_log ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch topup log")
    }
}
