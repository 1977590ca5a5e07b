//! Bulk writer
//!
//! Inserts a staged row set into its destination table in fixed-size
//! batches. Each batch is one multi-row INSERT inside its own transaction:
//! a failing batch is rolled back on its own, batches committed before it
//! stay, and nothing after it is attempted. Batches run strictly in order.

use crate::config::IngestConfig;
use crate::db::{is_valid_identifier, quote_ident};
use crate::error::{IngestError, Result};
use crate::loader::StagedRowSet;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::ops::Range;
use tracing::{debug, error, info, warn};

/// Upper bound on bound parameters in one SQLite statement.
pub const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

/// Split `total_rows` into consecutive ranges of at most `batch_size` rows.
///
/// The ranges cover `0..total_rows` exactly once, in order.
pub fn plan_batches(total_rows: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..total_rows)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(total_rows))
        .collect()
}

/// Outcome of a fully successful write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub rows_written: u64,
    /// Row count of each committed batch, in commit order
    pub batch_sizes: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct BulkWriter {
    pool: SqlitePool,
    batch_size: usize,
    progress_every_rows: u64,
}

impl BulkWriter {
    pub fn new(pool: SqlitePool, config: &IngestConfig) -> Self {
        Self {
            pool,
            batch_size: config.batch_size,
            progress_every_rows: config.progress_every_rows.max(1),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert every staged row into `table`.
    ///
    /// On a batch failure returns [`IngestError::BulkInsert`] carrying the
    /// 1-based batch index and the rows committed before it.
    pub async fn write(&self, staged: &StagedRowSet, table: &str) -> Result<WriteReport> {
        self.check_target(staged, table)?;

        if staged.is_empty() {
            warn!(table, "Empty row set - nothing to insert");
            return Ok(WriteReport::default());
        }

        let columns = staged
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_prefix = format!("INSERT INTO {} ({}) ", quote_ident(table), columns);

        let batches = plan_batches(staged.len(), self.batch_size);
        let total_batches = batches.len();
        let mut report = WriteReport::default();

        for (idx, range) in batches.into_iter().enumerate() {
            let chunk = &staged.rows()[range];

            debug!(table, batch = idx + 1, total_batches, rows = chunk.len(), "Inserting batch");

            if let Err(source) = self.insert_batch(&insert_prefix, chunk).await {
                error!(
                    table,
                    batch = idx + 1,
                    rows_committed = report.rows_written,
                    error = %source,
                    "Bulk insert failed"
                );
                return Err(IngestError::BulkInsert {
                    table: table.to_string(),
                    batch_index: idx + 1,
                    rows_committed: report.rows_written,
                    source,
                });
            }

            let before = report.rows_written;
            report.rows_written += chunk.len() as u64;
            report.batch_sizes.push(chunk.len());

            if report.rows_written / self.progress_every_rows > before / self.progress_every_rows {
                info!(table, rows = report.rows_written, "Inserted rows so far");
            }
        }

        info!(table, rows = report.rows_written, batches = total_batches, "Bulk insert completed");
        Ok(report)
    }

    /// One batch, one transaction.
    async fn insert_batch(
        &self,
        insert_prefix: &str,
        chunk: &[Vec<Option<String>>],
    ) -> std::result::Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(insert_prefix);
        query_builder.push_values(chunk, |mut b, row| {
            for value in row {
                b.push_bind(value.as_deref());
            }
        });

        if let Err(e) = query_builder.build().execute(&mut *tx).await {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback after failed batch also failed");
            }
            return Err(e);
        }

        tx.commit().await
    }

    /// Delete every row of `table`, returning how many were removed.
    pub async fn truncate(&self, table: &str) -> Result<u64> {
        ensure_table_name(table)?;
        let result = sqlx::query(&format!("DELETE FROM {}", quote_ident(table)))
            .execute(&self.pool)
            .await?;
        info!(table, rows_removed = result.rows_affected(), "Table truncated");
        Ok(result.rows_affected())
    }

    /// Current row count of `table`.
    pub async fn table_row_count(&self, table: &str) -> Result<i64> {
        ensure_table_name(table)?;
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn check_target(&self, staged: &StagedRowSet, table: &str) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::config("Batch size must be at least 1"));
        }
        ensure_table_name(table)?;

        let params = staged.columns().len().saturating_mul(self.batch_size.min(staged.len().max(1)));
        if params > SQLITE_MAX_BIND_PARAMS {
            return Err(IngestError::config(format!(
                "batch of {} rows x {} columns needs {} parameters, limit is {}",
                self.batch_size,
                staged.columns().len(),
                params,
                SQLITE_MAX_BIND_PARAMS
            )));
        }
        Ok(())
    }
}

fn ensure_table_name(table: &str) -> Result<()> {
    if is_valid_identifier(table) {
        Ok(())
    } else {
        Err(IngestError::config(format!("'{}' is not a valid table name", table)))
    }
}
