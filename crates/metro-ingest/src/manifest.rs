//! Manifest ledger
//!
//! One row per load attempt in `ingestion_manifest`. A row is inserted as
//! STARTED with `Row_Count = 0` before any destination row is written, then
//! closed exactly once as COMPLETED or FAILED. There is no delete and no way
//! to reopen a closed row; a retry mints a new batch id and a new row.

use crate::batch_id::BatchId;
use crate::error::{IngestError, ManifestStage, Result};
use chrono::{DateTime, Utc};
use metro_common::{LoadStatus, SourceSystem, TerminalStatus};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// A row of `ingestion_manifest`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ManifestRecord {
    #[sqlx(rename = "Batch_ID")]
    pub batch_id: String,
    #[sqlx(rename = "Source_System", try_from = "String")]
    pub source_system: SourceSystem,
    #[sqlx(rename = "Entity_Name")]
    pub entity_name: String,
    #[sqlx(rename = "Source_File")]
    pub source_file: String,
    #[sqlx(rename = "Row_Count")]
    pub row_count: i64,
    #[sqlx(rename = "Load_Start_TS")]
    pub load_start_ts: DateTime<Utc>,
    #[sqlx(rename = "Load_End_TS")]
    pub load_end_ts: Option<DateTime<Utc>>,
    #[sqlx(rename = "Load_Status", try_from = "String")]
    pub load_status: LoadStatus,
    #[sqlx(rename = "Error_Message")]
    pub error_message: Option<String>,
}

const SELECT_RECORD: &str = r#"
    SELECT Batch_ID, Source_System, Entity_Name, Source_File, Row_Count,
           Load_Start_TS, Load_End_TS, Load_Status, Error_Message
    FROM ingestion_manifest
"#;

/// Append/update store of load attempts.
#[derive(Debug, Clone)]
pub struct ManifestLedger {
    pool: SqlitePool,
}

impl ManifestLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a STARTED record for `batch_id`.
    ///
    /// Fails with [`IngestError::ManifestWrite`] when the store rejects the
    /// insert, including when the id already exists.
    pub async fn start(
        &self,
        batch_id: &BatchId,
        source_system: SourceSystem,
        entity_name: &str,
        source_file: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_manifest (
                Batch_ID, Source_System, Entity_Name, Source_File,
                Row_Count, Load_Start_TS, Load_Status
            )
            VALUES ($1, $2, $3, $4, 0, $5, $6)
            "#,
        )
        .bind(batch_id.as_str())
        .bind(source_system.code())
        .bind(entity_name)
        .bind(source_file)
        .bind(Utc::now())
        .bind(LoadStatus::Started.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::manifest(batch_id.as_str(), ManifestStage::Start, e))?;

        info!(batch_id = %batch_id, source_system = %source_system, entity = entity_name, "Manifest entry created");
        Ok(())
    }

    /// Close the STARTED record for `batch_id` with a terminal status.
    ///
    /// Never creates a record: if none is open under that id the call fails
    /// with [`IngestError::ManifestWrite`].
    pub async fn complete(
        &self,
        batch_id: &BatchId,
        row_count: u64,
        status: TerminalStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let rows = i64::try_from(row_count).map_err(|_| {
            IngestError::manifest(
                batch_id.as_str(),
                ManifestStage::Complete,
                format!("row count {} does not fit the ledger", row_count),
            )
        })?;

        let result = sqlx::query(
            r#"
            UPDATE ingestion_manifest
            SET Row_Count = $1,
                Load_End_TS = $2,
                Load_Status = $3,
                Error_Message = $4
            WHERE Batch_ID = $5 AND Load_Status = 'STARTED'
            "#,
        )
        .bind(rows)
        .bind(Utc::now())
        .bind(status.as_str())
        .bind(error_message)
        .bind(batch_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::manifest(batch_id.as_str(), ManifestStage::Complete, e))?;

        if result.rows_affected() == 0 {
            let reason = match self.get(batch_id.as_str()).await {
                Ok(Some(existing)) => format!("record already closed as {}", existing.load_status),
                Ok(None) => "no STARTED record exists".to_string(),
                Err(e) => e.to_string(),
            };
            warn!(batch_id = %batch_id, %reason, "Manifest update matched no open record");
            return Err(IngestError::manifest(batch_id.as_str(), ManifestStage::Complete, reason));
        }

        info!(batch_id = %batch_id, status = %status, rows = row_count, "Manifest updated");
        Ok(())
    }

    /// Fetch one record by batch id.
    pub async fn get(&self, batch_id: &str) -> Result<Option<ManifestRecord>> {
        let record = sqlx::query_as::<_, ManifestRecord>(&format!("{} WHERE Batch_ID = $1", SELECT_RECORD))
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Every attempt recorded for one entity, oldest first.
    pub async fn history(
        &self,
        source_system: SourceSystem,
        entity_name: &str,
    ) -> Result<Vec<ManifestRecord>> {
        let records = sqlx::query_as::<_, ManifestRecord>(&format!(
            "{} WHERE Source_System = $1 AND Entity_Name = $2 ORDER BY Load_Start_TS, Batch_ID",
            SELECT_RECORD
        ))
        .bind(source_system.code())
        .bind(entity_name)
        .fetch_all(&self.pool)
        .await?;

        debug!(source_system = %source_system, entity = entity_name, attempts = records.len(), "Manifest history loaded");
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db;
    use crate::error::ErrorKind;
    use chrono::NaiveDate;

    async fn ledger() -> (tempfile::TempDir, ManifestLedger) {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("manifest.db").display()),
            ..DatabaseConfig::default()
        };
        let pool = db::create_pool(&config).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        (dir, ManifestLedger::new(pool))
    }

    fn batch(second: u32) -> BatchId {
        let now = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(6, 30, second)
            .unwrap();
        BatchId::mint(SourceSystem::Erp, "products", now)
    }

    #[tokio::test]
    async fn test_start_creates_started_record() {
        let (_dir, ledger) = ledger().await;
        let id = batch(0);

        ledger
            .start(&id, SourceSystem::Erp, "products", "erp_products.csv")
            .await
            .unwrap();

        let record = ledger.get(id.as_str()).await.unwrap().unwrap();
        assert_eq!(record.load_status, LoadStatus::Started);
        assert_eq!(record.row_count, 0);
        assert_eq!(record.source_system, SourceSystem::Erp);
        assert_eq!(record.source_file, "erp_products.csv");
        assert!(record.load_end_ts.is_none());
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_start_rejected() {
        let (_dir, ledger) = ledger().await;
        let id = batch(1);

        ledger.start(&id, SourceSystem::Erp, "products", "erp_products.csv").await.unwrap();
        let err = ledger
            .start(&id, SourceSystem::Erp, "products", "erp_products.csv")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ManifestWrite);
        assert!(matches!(err, IngestError::ManifestWrite { stage: ManifestStage::Start, .. }));
    }

    #[tokio::test]
    async fn test_complete_sets_terminal_fields() {
        let (_dir, ledger) = ledger().await;
        let id = batch(2);

        ledger.start(&id, SourceSystem::Erp, "products", "erp_products.csv").await.unwrap();
        ledger.complete(&id, 250, TerminalStatus::Completed, None).await.unwrap();

        let record = ledger.get(id.as_str()).await.unwrap().unwrap();
        assert_eq!(record.load_status, LoadStatus::Completed);
        assert_eq!(record.row_count, 250);
        let end = record.load_end_ts.unwrap();
        assert!(end >= record.load_start_ts);
    }

    #[tokio::test]
    async fn test_failed_completion_keeps_message() {
        let (_dir, ledger) = ledger().await;
        let id = batch(3);

        ledger.start(&id, SourceSystem::Erp, "products", "erp_products.csv").await.unwrap();
        ledger
            .complete(&id, 100, TerminalStatus::Failed, Some("batch 2 rejected"))
            .await
            .unwrap();

        let record = ledger.get(id.as_str()).await.unwrap().unwrap();
        assert_eq!(record.load_status, LoadStatus::Failed);
        assert_eq!(record.row_count, 100);
        assert_eq!(record.error_message.as_deref(), Some("batch 2 rejected"));
    }

    #[tokio::test]
    async fn test_complete_without_start_fails() {
        let (_dir, ledger) = ledger().await;
        let id = batch(4);

        let err = ledger
            .complete(&id, 10, TerminalStatus::Completed, None)
            .await
            .unwrap_err();

        assert!(err.is_ledger_divergent());
        assert!(err.to_string().contains("no STARTED record"));
        assert!(ledger.get(id.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_record_never_reopened() {
        let (_dir, ledger) = ledger().await;
        let id = batch(5);

        ledger.start(&id, SourceSystem::Erp, "products", "erp_products.csv").await.unwrap();
        ledger.complete(&id, 5, TerminalStatus::Completed, None).await.unwrap();

        let err = ledger
            .complete(&id, 0, TerminalStatus::Failed, Some("late failure"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already closed as COMPLETED"));

        let record = ledger.get(id.as_str()).await.unwrap().unwrap();
        assert_eq!(record.load_status, LoadStatus::Completed);
        assert_eq!(record.row_count, 5);
    }

    #[tokio::test]
    async fn test_history_keeps_every_attempt() {
        let (_dir, ledger) = ledger().await;
        let first = batch(6);
        let retry = batch(7);

        ledger.start(&first, SourceSystem::Erp, "products", "erp_products.csv").await.unwrap();
        ledger
            .complete(&first, 0, TerminalStatus::Failed, Some("file missing"))
            .await
            .unwrap();
        ledger.start(&retry, SourceSystem::Erp, "products", "erp_products.csv").await.unwrap();
        ledger.complete(&retry, 3, TerminalStatus::Completed, None).await.unwrap();

        let history = ledger.history(SourceSystem::Erp, "products").await.unwrap();
        let statuses: Vec<_> = history.iter().map(|r| r.load_status).collect();
        assert_eq!(statuses, vec![LoadStatus::Failed, LoadStatus::Completed]);
        assert!(ledger.history(SourceSystem::Crm, "products").await.unwrap().is_empty());
    }
}
