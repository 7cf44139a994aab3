use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TopupLogEntry {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub amount: i64,
    pub method: String,
    pub waktu: DateTime<Utc>,
}
