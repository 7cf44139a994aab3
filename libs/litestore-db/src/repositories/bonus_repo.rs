use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{BonusConfig, BonusLogEntry};

#[derive(Debug, Clone)]
pub struct BonusRepository {
    pool: PgPool,
}

impl BonusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_config(&self) -> Result<BonusConfig> {
        let config = sqlx::query_as::<_, BonusConfig>(
            "SELECT enabled, min_topup, bonus_percent FROM bonus_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch bonus config")?;
        Ok(config.unwrap_or_default())
    }

    pub async fn set_config(&self, config: &BonusConfig) -> Result<()> {
        config.validate()?;
        sqlx::query(
            r#"
            INSERT INTO bonus_config (id, enabled, min_topup, bonus_percent)
            VALUES (1, $1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                enabled = excluded.enabled,
                min_topup = excluded.min_topup,
                bonus_percent = excluded.bonus_percent
            "#,
        )
        .bind(config.enabled)
        .bind(config.min_topup)
        .bind(config.bonus_percent)
        .execute(&self.pool)
        .await
        .context("Failed to update bonus config")?;
        Ok(())
    }

    pub async fn log_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        username: Option<&str>,
        amount: i64,
        bonus: i64,
    ) -> Result<()> {
        sqlx::query("INSERT INTO bonus_log (user_id, username, amount, bonus) VALUES ($1, $2, $3, $4)")
            .bind(user_id)
            .bind(username)
            .bind(amount)
            .bind(bonus)
            .execute(&mut **tx)
            .await
            .context("Failed to append bonus log")?;
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<BonusLogEntry>> {
        sqlx::query_as::<_, BonusLogEntry>(
            "SELECT id, user_id, username, amount, bonus, timestamp FROM bonus_log ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch bonus log")
    }
}
