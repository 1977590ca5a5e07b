//! Ingestion configuration
//!
//! Built once at process start and handed by reference to the ledger, the
//! loader and the writer. Nothing below reads the environment after that.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default warehouse location for local runs.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/metro_retail.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default directory holding the source extracts.
pub const DEFAULT_DATA_DIR: &str = "data/sample";

/// Default rows per INSERT transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Files loaded in parallel by `ingest_all`.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 1;

/// Rows between progress log lines during a bulk write.
pub const DEFAULT_PROGRESS_EVERY_ROWS: u64 = 10_000;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Raw-layer ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    /// Directory source files are resolved against
    pub data_dir: PathBuf,
    /// Rows per committed INSERT batch (>= 1)
    pub batch_size: usize,
    /// Worker count for `ingest_all` (>= 1)
    pub max_concurrent_files: usize,
    /// TOML registry replacing the built-in file mappings
    pub registry_path: Option<PathBuf>,
    pub progress_every_rows: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            registry_path: None,
            progress_every_rows: DEFAULT_PROGRESS_EVERY_ROWS,
        }
    }
}

impl IngestConfig {
    /// Load `.env` (if present), then the environment, then validate
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables
    ///
    /// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`, `DATABASE_CONNECT_TIMEOUT`
    /// - `METRO_DATA_DIR`, `METRO_BATCH_SIZE`, `METRO_MAX_CONCURRENT_FILES`
    /// - `METRO_REGISTRY_PATH`, `METRO_PROGRESS_EVERY_ROWS`
    pub fn from_env() -> Result<Self> {
        let config = Self {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                )?,
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
            },
            data_dir: std::env::var("METRO_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
            batch_size: env_parse("METRO_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            max_concurrent_files: env_parse(
                "METRO_MAX_CONCURRENT_FILES",
                DEFAULT_MAX_CONCURRENT_FILES,
            )?,
            registry_path: std::env::var("METRO_REGISTRY_PATH").ok().map(PathBuf::from),
            progress_every_rows: env_parse(
                "METRO_PROGRESS_EVERY_ROWS",
                DEFAULT_PROGRESS_EVERY_ROWS,
            )?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(IngestError::config("Database max_connections must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(IngestError::config("Batch size must be at least 1"));
        }
        if self.max_concurrent_files == 0 {
            return Err(IngestError::config("max_concurrent_files must be at least 1"));
        }
        if self.progress_every_rows == 0 {
            return Err(IngestError::config("progress_every_rows must be at least 1"));
        }
        Ok(())
    }

    /// Location of a source file inside the data directory
    pub fn source_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database.url = url.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
