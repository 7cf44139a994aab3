use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{TopupMethod, TopupMethods};

#[derive(Debug, Clone)]
pub struct TopupMethodRepository {
    pool: PgPool,
}

impl TopupMethodRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self) -> Result<TopupMethods> {
        let methods = sqlx::query_as::<_, TopupMethods>(
            "SELECT qris_enabled, saweria_enabled FROM topup_methods WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch topup methods")?;
        Ok(methods.unwrap_or_default())
    }

    /// Flips one method in place so concurrent toggles never lose an update.
    pub async fn toggle(&self, method: TopupMethod) -> Result<TopupMethods> {
        let sql = match method {
            TopupMethod::Qris => {
                "UPDATE topup_methods SET qris_enabled = NOT qris_enabled WHERE id = 1 RETURNING qris_enabled, saweria_enabled"
            }
            TopupMethod::Saweria => {
                "UPDATE topup_methods SET saweria_enabled = NOT saweria_enabled WHERE id = 1 RETURNING qris_enabled, saweria_enabled"
            }
        };
        sqlx::query_as::<_, TopupMethods>(sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to toggle topup method {}", method))
    }
}
