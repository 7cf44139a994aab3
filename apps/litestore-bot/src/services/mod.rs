pub mod bonus_service;
pub mod deposit_service;
pub mod input_service;
pub mod notification_service;
pub mod payment;
pub mod reconcile;
pub mod saweria_service;
