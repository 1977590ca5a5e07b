//! Ingestion orchestrator
//!
//! Drives one file through resolve -> manifest start -> stage -> write ->
//! manifest complete, and runs that for every registered file. Once a
//! manifest record is STARTED, the attempt always ends by closing it as
//! COMPLETED or FAILED, or by returning a ledger-divergence error when even
//! that write fails.

use crate::batch_id::BatchId;
use crate::config::IngestConfig;
use crate::db;
use crate::error::{IngestError, ManifestStage, Result};
use crate::loader::TabularLoader;
use crate::manifest::ManifestLedger;
use crate::registry::{MappingEntry, SourceRegistry};
use crate::writer::{BulkWriter, WriteReport};
use chrono::{NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use metro_common::TerminalStatus;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Span};

/// Source of "now" for batch ids, read as UTC.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Per-run switches from the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Empty the destination table before inserting
    pub truncate: bool,
}

/// A completed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub batch_id: BatchId,
    pub file_name: String,
    pub destination_table: String,
    pub rows_loaded: u64,
    pub batches: usize,
}

/// Per-file outcomes of [`IngestOrchestrator::ingest_all`], in registry order.
#[derive(Debug, Default)]
pub struct IngestSummary {
    results: Vec<(String, Result<LoadReport>)>,
}

impl IngestSummary {
    pub fn results(&self) -> &[(String, Result<LoadReport>)] {
        &self.results
    }

    pub fn get(&self, file_name: &str) -> Option<&Result<LoadReport>> {
        self.results
            .iter()
            .find(|(name, _)| name == file_name)
            .map(|(_, result)| result)
    }

    /// File name -> success
    pub fn status_map(&self) -> BTreeMap<String, bool> {
        self.results
            .iter()
            .map(|(name, result)| (name.clone(), result.is_ok()))
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

pub struct IngestOrchestrator {
    registry: SourceRegistry,
    ledger: ManifestLedger,
    loader: TabularLoader,
    writer: BulkWriter,
    max_concurrent_files: usize,
    clock: Clock,
}

impl IngestOrchestrator {
    pub fn new(config: &IngestConfig, pool: SqlitePool, registry: SourceRegistry) -> Self {
        Self {
            registry,
            ledger: ManifestLedger::new(pool.clone()),
            loader: TabularLoader::new(config),
            writer: BulkWriter::new(pool, config),
            max_concurrent_files: config.max_concurrent_files.max(1),
            clock: Arc::new(|| Utc::now().naive_utc()),
        }
    }

    /// Open the warehouse, apply migrations and load the registry named by
    /// `config` (the built-in one when no path is set).
    pub async fn connect(config: &IngestConfig) -> Result<Self> {
        config.validate()?;

        let registry = match config.registry_path {
            Some(ref path) => SourceRegistry::from_toml_file(path)?,
            None => SourceRegistry::builtin()?,
        };

        let pool = db::create_pool(&config.database).await?;
        db::run_migrations(&pool).await?;

        info!(sources = registry.len(), data_dir = %config.data_dir.display(), "Orchestrator ready");
        Ok(Self::new(config, pool, registry))
    }

    /// Replace the wall clock used to mint batch ids.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &ManifestLedger {
        &self.ledger
    }

    pub fn writer(&self) -> &BulkWriter {
        &self.writer
    }

    /// Load one registered file into its raw table.
    ///
    /// An unmapped file fails before any database work. Every later failure
    /// is recorded on the manifest as FAILED before it is returned.
    #[instrument(skip(self, options), fields(batch_id = tracing::field::Empty))]
    pub async fn ingest_one(&self, file_name: &str, options: IngestOptions) -> Result<LoadReport> {
        info!("Starting ingestion");

        let mapping = self.registry.resolve(file_name).inspect_err(|e| {
            error!(error = %e, "No table mapping, nothing recorded");
        })?;

        let batch_id = BatchId::mint(mapping.source_system(), mapping.entity_name(), (self.clock)());
        Span::current().record("batch_id", batch_id.as_str());
        info!(table = mapping.destination_table(), "Batch minted");

        self.ledger
            .start(&batch_id, mapping.source_system(), mapping.entity_name(), file_name)
            .await?;

        match self.stage_and_write(mapping, &batch_id, options).await {
            Ok(written) => {
                self.ledger
                    .complete(&batch_id, written.rows_written, TerminalStatus::Completed, None)
                    .await
                    .inspect_err(|e| {
                        error!(
                            error = %e,
                            rows_committed = written.rows_written,
                            "Rows committed but manifest could not be closed; ledger needs reconciliation"
                        );
                    })?;

                info!(rows = written.rows_written, "Ingestion completed");
                Ok(LoadReport {
                    batch_id,
                    file_name: file_name.to_string(),
                    destination_table: mapping.destination_table().to_string(),
                    rows_loaded: written.rows_written,
                    batches: written.batch_sizes.len(),
                })
            },
            Err(load_err) => {
                let message = load_err.to_string();
                let rows_committed = load_err.rows_committed();
                error!(error = %message, rows_committed, "Ingestion failed");

                if let Err(manifest_err) = self
                    .ledger
                    .complete(&batch_id, rows_committed, TerminalStatus::Failed, Some(&message))
                    .await
                {
                    error!(
                        error = %manifest_err,
                        "Failure could not be recorded; manifest left STARTED"
                    );
                    return Err(IngestError::manifest(
                        batch_id.as_str(),
                        ManifestStage::Complete,
                        format!("{} (while recording load failure: {})", manifest_err, message),
                    ));
                }

                Err(load_err)
            },
        }
    }

    async fn stage_and_write(
        &self,
        mapping: &MappingEntry,
        batch_id: &BatchId,
        options: IngestOptions,
    ) -> Result<WriteReport> {
        let staged = self.loader.load(mapping, batch_id)?;
        info!(rows = staged.len(), "Ready for insertion");

        if options.truncate {
            self.writer.truncate(mapping.destination_table()).await?;
        }

        self.writer.write(&staged, mapping.destination_table()).await
    }

    /// Load every registered file. Each file is an independent attempt; a
    /// failure never stops the others.
    pub async fn ingest_all(&self, options: IngestOptions) -> IngestSummary {
        info!(files = self.registry.len(), workers = self.max_concurrent_files, "Bulk ingestion of all source files");

        let files: Vec<String> = self.registry.file_names().map(String::from).collect();
        let results = stream::iter(files)
            .map(|file_name| async move {
                let result = self.ingest_one(&file_name, options).await;
                (file_name, result)
            })
            .buffered(self.max_concurrent_files)
            .collect::<Vec<_>>()
            .await;

        let summary = IngestSummary { results };
        log_summary(&summary);
        summary
    }
}

fn log_summary(summary: &IngestSummary) {
    for (file_name, result) in summary.results() {
        match result {
            Ok(report) => info!(file = %file_name, rows = report.rows_loaded, batch_id = %report.batch_id, "SUCCESS"),
            Err(e) => warn!(file = %file_name, error = %e, "FAILED"),
        }
    }
    info!(
        total = summary.len(),
        successful = summary.succeeded(),
        failed = summary.failed(),
        "Ingestion summary"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn report(rows: u64) -> LoadReport {
        LoadReport {
            batch_id: BatchId::mint(
                metro_common::SourceSystem::Erp,
                "products",
                chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            ),
            file_name: "erp_products.csv".to_string(),
            destination_table: "raw_erp_products".to_string(),
            rows_loaded: rows,
            batches: 1,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = IngestSummary {
            results: vec![
                ("erp_products.csv".to_string(), Ok(report(3))),
                (
                    "erp_stores.csv".to_string(),
                    Err(IngestError::UnmappedSource("erp_stores.csv".to_string())),
                ),
            ],
        };

        assert_eq!(summary.len(), 2);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.status_map().get("erp_products.csv"), Some(&true));
        assert_eq!(summary.status_map().get("erp_stores.csv"), Some(&false));
        assert_eq!(
            summary.get("erp_stores.csv").unwrap().as_ref().unwrap_err().kind(),
            ErrorKind::UnmappedSource
        );
        assert!(summary.get("missing.csv").is_none());
    }

    #[test]
    fn test_empty_summary_succeeds() {
        let summary = IngestSummary::default();
        assert!(summary.is_empty());
        assert!(summary.all_succeeded());
    }
}
