//! Shared infrastructure for the identity services
//!
//! This crate provides the pieces every service needs around its business
//! logic: PostgreSQL connectivity, a Redis cache client, a Redis-backed
//! distributed lock, error types and tracing setup.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     let is_healthy = health_check(&pool).await?;
//!     println!("Database health check: {}", is_healthy);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod lock;
pub mod telemetry;
