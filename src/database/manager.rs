use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from the database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database is not open")]
    NotOpen,

    #[error("Database is already open")]
    AlreadyOpen,

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Opens SQLite pools for the durable and the test store
pub struct DatabaseManager;

impl DatabaseManager {
    const MEMORY_URL: &'static str = "sqlite::memory:";

    /// Open the durable store described by the config, creating the file if needed
    pub async fn open(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
        if config.url.contains(":memory:") {
            return Self::open_in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_with(options)
            .await?;

        info!("Opened database pool for: {}", config.url);
        Ok(pool)
    }

    /// Open a private in-memory store.
    ///
    /// Every SQLite connection to `:memory:` gets its own database, so the pool
    /// holds exactly one connection and never recycles it.
    pub async fn open_in_memory() -> Result<SqlitePool, DatabaseError> {
        let options = SqliteConnectOptions::from_str(Self::MEMORY_URL)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        info!("Opened in-memory database pool");
        Ok(pool)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(pool: &SqlitePool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Quote SQL identifier to prevent injection
    pub(crate) fn quote_identifier(name: &str) -> Result<String, DatabaseError> {
        if name.is_empty() || name.contains('\0') {
            return Err(DatabaseError::InvalidIdentifier(name.to_string()));
        }
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(DatabaseManager::quote_identifier("notes").unwrap(), "\"notes\"");
        assert_eq!(
            DatabaseManager::quote_identifier("we\"ird").unwrap(),
            "\"we\"\"ird\""
        );
        assert!(DatabaseManager::quote_identifier("").is_err());
    }

    #[tokio::test]
    async fn in_memory_pool_answers_health_check() {
        let pool = DatabaseManager::open_in_memory().await.unwrap();
        DatabaseManager::health_check(&pool).await.unwrap();
        pool.close().await;
    }
}
