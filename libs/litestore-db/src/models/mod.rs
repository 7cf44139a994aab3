pub mod bonus;
pub mod deposit;
pub mod topup;
pub mod topup_method;
pub mod user;

pub use bonus::{BonusConfig, BonusLogEntry};
pub use deposit::{DepositStatus, MessageRef, PendingDeposit};
pub use topup::TopupLogEntry;
pub use topup_method::{TopupMethod, TopupMethods};
pub use user::UserAccount;
