pub mod callback;
pub mod command;

use litestore_db::models::TopupMethods;
use teloxide::types::User;
use tracing::error;

use crate::state::AppState;

/// Current method switches; all methods stay offered if the store is unreachable.
pub async fn topup_methods(state: &AppState) -> TopupMethods {
    match state.ledger.topup_methods().await {
        Ok(methods) => methods,
        Err(e) => {
            error!("Failed to read topup methods: {:#}", e);
            TopupMethods::default()
        }
    }
}

/// `@handle` as stored in the logs, when the user has one.
pub fn display_username(user: &User) -> Option<String> {
    user.username.as_ref().map(|u| format!("@{}", u))
}
