//! Identity models

pub mod app_connect;
pub mod principal;
pub mod user;

// Re-export for convenience
pub use app_connect::AppConnect;
pub use principal::Principal;
pub use user::{STATUS_ENABLED, User};
