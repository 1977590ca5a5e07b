//! Warehouse connection handling
//!
//! The raw layer lives in a SQLite database reached through `sqlx`. This
//! module owns pool construction, the embedded manifest migration and the
//! identifier quoting used wherever a table or column name is spliced into
//! SQL text.

use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Open a connection pool for the warehouse, creating the database file and
/// its parent directory when missing.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IngestError::config(format!(
                    "Cannot create warehouse directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect_with(options)
        .await?;

    debug!(url = %config.url, max_connections = config.max_connections, "Warehouse pool created");
    Ok(pool)
}

/// Apply the embedded migrations (the manifest ledger table).
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(sqlx::Error::from)?;
    info!("Warehouse migrations applied");
    Ok(())
}

/// Round-trip a trivial query to prove the warehouse is reachable.
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

/// Quote a table or column name for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// ASCII letter or underscore, then letters, digits and underscores.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        },
        _ => false,
    }
}
