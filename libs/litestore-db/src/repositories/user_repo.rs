use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::UserAccount;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the account with a zero balance if it does not exist yet.
    pub async fn ensure(&self, user_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO users (user_id, saldo) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to ensure user account")?;
        Ok(())
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<UserAccount>> {
        sqlx::query_as::<_, UserAccount>("SELECT user_id, saldo FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user account")
    }

    pub async fn balance(&self, user_id: i64) -> Result<i64> {
        Ok(self.get(user_id).await?.map(|u| u.saldo).unwrap_or(0))
    }

    /// Applies a signed adjustment. Returns `None` when the account is missing
    /// or the debit would take the balance below zero.
    pub async fn adjust(&self, user_id: i64, delta: i64) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users SET saldo = saldo + $1 WHERE user_id = $2 AND saldo + $1 >= 0 RETURNING saldo",
        )
        .bind(delta)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to adjust user balance")
    }

    pub async fn credit_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        amount: i64,
    ) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (user_id, saldo) VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET saldo = users.saldo + excluded.saldo
            RETURNING saldo
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await
        .context("Failed to credit user balance")
    }
}
