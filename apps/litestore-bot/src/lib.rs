pub mod bot;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod transport;

pub use state::AppState;
