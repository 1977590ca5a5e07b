//! Error types for raw-layer ingestion
//!
//! Every failure path of a load attempt maps onto one variant so callers can
//! branch on [`ErrorKind`] instead of parsing messages. The `Display` text of
//! an error is what gets stored in the manifest's `Error_Message` column.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Which manifest write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestStage {
    /// Opening the STARTED record; no destination rows were written.
    Start,
    /// Closing the record; destination rows may already be committed.
    Complete,
}

impl fmt::Display for ManifestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestStage::Start => f.write_str("start"),
            ManifestStage::Complete => f.write_str("complete"),
        }
    }
}

/// Coarse classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnmappedSource,
    SourceRead,
    ManifestWrite,
    BulkInsert,
    Registry,
    Config,
    Database,
}

#[derive(Error, Debug)]
pub enum IngestError {
    /// The file has no registry entry. Raised before any database work.
    #[error("No table mapping for source file '{0}'")]
    UnmappedSource(String),

    /// The source file is missing, unreadable or malformed.
    #[error("Failed to read source file {}: {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Manifest {stage} failed for batch {batch_id}: {reason}")]
    ManifestWrite {
        batch_id: String,
        stage: ManifestStage,
        reason: String,
    },

    /// A batch failed; `rows_committed` rows from earlier batches remain.
    #[error(
        "Bulk insert into {table} failed on batch {batch_index} \
         ({rows_committed} rows committed by earlier batches): {source}"
    )]
    BulkInsert {
        table: String,
        batch_index: usize,
        rows_committed: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid source registry: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::UnmappedSource(_) => ErrorKind::UnmappedSource,
            IngestError::SourceRead { .. } => ErrorKind::SourceRead,
            IngestError::ManifestWrite { .. } => ErrorKind::ManifestWrite,
            IngestError::BulkInsert { .. } => ErrorKind::BulkInsert,
            IngestError::Registry(_) => ErrorKind::Registry,
            IngestError::Config(_) => ErrorKind::Config,
            IngestError::Database(_) => ErrorKind::Database,
        }
    }

    /// Rows that reached the destination before this error.
    pub fn rows_committed(&self) -> u64 {
        match self {
            IngestError::BulkInsert { rows_committed, .. } => *rows_committed,
            _ => 0,
        }
    }

    /// True when the ledger could not record the outcome of a finished write,
    /// so destination contents and manifest disagree.
    pub fn is_ledger_divergent(&self) -> bool {
        matches!(
            self,
            IngestError::ManifestWrite {
                stage: ManifestStage::Complete,
                ..
            }
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    pub(crate) fn manifest(batch_id: &str, stage: ManifestStage, reason: impl ToString) -> Self {
        Self::ManifestWrite {
            batch_id: batch_id.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_rows_committed() {
        let err = IngestError::BulkInsert {
            table: "raw_erp_products".to_string(),
            batch_index: 2,
            rows_committed: 100,
            source: sqlx::Error::RowNotFound,
        };
        assert_eq!(err.kind(), ErrorKind::BulkInsert);
        assert_eq!(err.rows_committed(), 100);
        assert!(err.to_string().contains("batch 2"));
        assert!(err.to_string().contains("100 rows committed"));

        let err = IngestError::UnmappedSource("unknown.csv".to_string());
        assert_eq!(err.kind(), ErrorKind::UnmappedSource);
        assert_eq!(err.rows_committed(), 0);
    }

    #[test]
    fn test_only_complete_stage_diverges() {
        let start = IngestError::manifest("erp_products_20260101_000000", ManifestStage::Start, "dup");
        let complete =
            IngestError::manifest("erp_products_20260101_000000", ManifestStage::Complete, "gone");
        assert!(!start.is_ledger_divergent());
        assert!(complete.is_ledger_divergent());
        assert_eq!(
            complete.to_string(),
            "Manifest complete failed for batch erp_products_20260101_000000: gone"
        );
    }
}
