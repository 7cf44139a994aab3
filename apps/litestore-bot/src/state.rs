use litestore_db::Ledger;
use std::sync::Arc;

use crate::config::Config;
use crate::services::deposit_service::DepositService;
use crate::services::input_service::InputService;
use crate::services::notification_service::NotificationService;
use crate::services::saweria_service::SaweriaService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<dyn Ledger>,
    pub deposits: DepositService,
    pub saweria: SaweriaService,
    pub input: InputService,
    pub notifier: NotificationService,
}
