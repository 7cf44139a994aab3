pub mod db;
pub mod ledger;
pub mod models;
pub mod repositories;

pub use ledger::{Ledger, PgLedger, SettlementReceipt, SettlementRequest};
pub use sqlx;
