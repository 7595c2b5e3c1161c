//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database and Redis cache
//! are properly configured and accessible from the application. They need
//! both services running and are ignored by default.

use std::time::Duration;

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
    lock::{LockOptions, RedisLock},
};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires running PostgreSQL and Redis"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;
    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let test_key = "integration_test_key";
    redis_pool.set(test_key, "integration_test_value", Some(10)).await?;
    assert_eq!(
        redis_pool.get(test_key).await?,
        Some("integration_test_value".to_string()),
        "Redis SET/GET test failed"
    );
    redis_pool.delete(test_key).await?;
    assert_eq!(redis_pool.get(test_key).await?, None, "Redis delete operation failed");

    // A lease that is allowed to lapse must not be deletable by its old holder.
    let lock = RedisLock::new(
        redis_pool.clone(),
        LockOptions {
            lease: Duration::from_millis(100),
            ..LockOptions::default()
        },
    );
    let guard = lock.acquire("lock:integration_test").await?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    let successor = lock.acquire("lock:integration_test").await?;
    assert!(!lock.release(guard).await?, "Expired guard released a foreign lock");
    assert!(lock.release(successor).await?);

    Ok(())
}
