pub mod bonus_repo;
pub mod deposit_repo;
pub mod topup_method_repo;
pub mod topup_repo;
pub mod user_repo;

pub use bonus_repo::BonusRepository;
pub use deposit_repo::DepositRepository;
pub use topup_method_repo::TopupMethodRepository;
pub use topup_repo::TopupRepository;
pub use user_repo::UserRepository;
