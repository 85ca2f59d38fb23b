pub mod operations;
pub mod schema;

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::DatabaseConfig;

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("invalid database url: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub enum DbHealth {
    Connected { latency_ms: u64 },
    Disconnected { error: String },
}

/// Shared handle to the SQLite pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbInitError> {
        ensure_parent_dir(&config.url)?;

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        schema::run_migrations(&pool).await?;
        tracing::info!(url = %config.url, "database ready");

        Ok(Self { pool })
    }

    /// Private in-memory database. A single long-lived connection keeps the
    /// data alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self, DbInitError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbInitError::Config(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        schema::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn check_health(&self, timeout: Duration) -> DbHealth {
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(&self.pool)).await;

        match result {
            Ok(Ok(_)) => DbHealth::Connected {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(err)) => DbHealth::Disconnected { error: err.to_string() },
            Err(_) => DbHealth::Disconnected {
                error: "timeout".to_string(),
            },
        }
    }
}

fn ensure_parent_dir(url: &str) -> Result<(), DbInitError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
        }
    }
    Ok(())
}
