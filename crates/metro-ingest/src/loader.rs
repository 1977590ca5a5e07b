//! Tabular loader
//!
//! Reads a delimited source extract into a [`StagedRowSet`]: every value as
//! text, missing values as `None`, the two lineage columns appended and the
//! mapping's column renames applied.

use crate::batch_id::BatchId;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::registry::MappingEntry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lineage column holding the load attempt's batch id.
pub const BATCH_ID_COLUMN: &str = "Batch_ID";

/// Lineage column holding the source file name.
pub const SOURCE_FILE_COLUMN: &str = "Source_File";

/// Text forms that mean "no value". These are the markers the upstream
/// extract tooling and spreadsheet exports emit for empty cells; none of them
/// may reach the raw layer as a literal string.
pub const NULL_SENTINELS: &[&str] = &[
    "", "nan", "NaN", "-nan", "-NaN", "None", "NULL", "null", "NA", "N/A", "n/a", "<NA>", "#N/A",
    "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "1.#IND", "1.#QNAN",
];

/// Map a raw field to the ingestion contract: text, or `None` if missing.
pub fn normalize_value(raw: &str) -> Option<String> {
    if NULL_SENTINELS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Rows of one source file, ready for the bulk writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl StagedRowSet {
    /// Build a row set; every row must have one value per column.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(IngestError::config("a staged row set needs at least one column"));
        }
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(IngestError::config(format!(
                "row {} has {} values for {} columns",
                idx + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of column `name`, ignoring ASCII case the way SQLite
    /// resolves identifiers.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value at `row` in column `name`; `None` for a missing column too.
    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.column_index(name)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Set every row's `name` column to `value`, adding the column if absent.
    /// A source column matching `name` in any case is taken over.
    fn set_constant_column(&mut self, name: &str, value: &str) {
        match self.column_index(name) {
            Some(col) => {
                self.columns[col] = name.to_string();
                for row in &mut self.rows {
                    row[col] = Some(value.to_string());
                }
            },
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(Some(value.to_string()));
                }
            },
        }
    }
}

/// Reads source files from the configured data directory.
#[derive(Debug, Clone)]
pub struct TabularLoader {
    data_dir: PathBuf,
}

impl TabularLoader {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
        }
    }

    pub fn source_path(&self, mapping: &MappingEntry) -> PathBuf {
        self.data_dir.join(mapping.file_name())
    }

    /// Stage the file named by `mapping` for the attempt `batch_id`.
    pub fn load(&self, mapping: &MappingEntry, batch_id: &BatchId) -> Result<StagedRowSet> {
        self.load_path(&self.source_path(mapping), mapping, batch_id)
    }

    /// Stage an explicit path using `mapping`'s metadata and renames.
    pub fn load_path(
        &self,
        path: &Path,
        mapping: &MappingEntry,
        batch_id: &BatchId,
    ) -> Result<StagedRowSet> {
        info!(path = %path.display(), "Reading source file");

        let mut staged = read_delimited(path).map_err(|source| IngestError::SourceRead {
            path: path.to_path_buf(),
            source,
        })?;

        info!(
            rows = staged.len(),
            columns = %staged.columns.join(", "),
            "Source file read"
        );

        staged.set_constant_column(BATCH_ID_COLUMN, batch_id.as_str());
        staged.set_constant_column(SOURCE_FILE_COLUMN, mapping.file_name());

        for rename in mapping.column_renames() {
            let Some(col) = staged.column_index(&rename.from) else {
                debug!(column = %rename.from, "Rename source column absent, skipping");
                continue;
            };
            if staged.column_index(&rename.to).is_some_and(|existing| existing != col) {
                return Err(IngestError::registry(format!(
                    "{}: cannot rename '{}' to '{}', the file already has that column",
                    mapping.file_name(),
                    rename.from,
                    rename.to
                )));
            }
            debug!(from = %rename.from, to = %rename.to, "Renaming column");
            staged.columns[col] = rename.to.clone();
        }

        Ok(staged)
    }
}

fn read_delimited(path: &Path) -> std::result::Result<StagedRowSet, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_path(path)?;

    let columns = header_names(reader.headers()?);
    if columns.is_empty() {
        return Err(csv::Error::from(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "file has no header row",
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(normalize_value).collect());
    }

    Ok(StagedRowSet { columns, rows })
}

/// Header names with blanks filled (`Unnamed: 3`) and repeats suffixed
/// (`Qty`, `qty.1`) so every destination column is distinct, case ignored.
fn header_names(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let base = if raw.trim().is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                raw.to_string()
            };
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.to_ascii_lowercase()) {
                name = format!("{}.{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}
