//! Database connection and pool management.
//!
//! Initializes a SeaORM connection pool with configurable parameters and
//! retry with exponential backoff for transient startup failures.

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::AppConfig;

/// Errors that can occur during database initialization.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Initializes the connection pool, retrying transient failures with
/// exponential backoff.
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "database URL cannot be empty".to_string(),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                tracing::info!(attempt, "Connected to database");
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    retry_in_ms = retry_delay.as_millis() as u64,
                    "Database connection attempt failed"
                );
                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Database::connect(opt).await.map_err(|e| {
        tracing::error!(error = %e, attempts = max_retries, "Failed to connect to database");
        anyhow::Error::from(DatabaseError::ConnectionFailed { source: e })
    })
}

/// Verifies the connection is still usable by executing a trivial query.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());

    db.query_one(stmt)
        .await
        .context("Database health check failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_database_url_rejected() {
        let config = AppConfig {
            database_url: String::new(),
            ..Default::default()
        };

        let result = init_pool(&config).await;
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().downcast::<DatabaseError>(),
            Ok(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_sqlite_memory_pool_and_health_check() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            ..Default::default()
        };

        let db = init_pool(&config).await.expect("in-memory pool");
        health_check(&db).await.expect("healthy");
    }
}
