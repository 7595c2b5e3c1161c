//! Identity resolution for shop logins
//!
//! Turns third-party logins (`<appId>:<bizUserId>` credentials) and
//! email/password pairs into [`Principal`]s, and links first-time provider
//! accounts to internal users.
//!
//! ```rust,no_run
//! use common::{
//!     cache::{RedisConfig, RedisPool},
//!     database::{DatabaseConfig, init_pool},
//! };
//! use identity::{IdentityConfig, IdentityResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     common::telemetry::init_tracing("info")?;
//!
//!     let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//!     let redis = RedisPool::new(&RedisConfig::from_env()?).await?;
//!     let resolver = IdentityResolver::connect(pool, redis, &IdentityConfig::from_env()?);
//!
//!     let principal = resolver.resolve_by_composite("1:oAbC123").await?;
//!     println!("Logged in as {}", principal.user_id);
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod models;
pub mod password;
pub mod repositories;
pub mod resolver;
pub mod validation;

pub use app::{App, LoginType};
pub use crate::config::IdentityConfig;
pub use error::{IdentityError, IdentityResult};
pub use models::{AppConnect, Principal, User};
pub use resolver::IdentityResolver;
