//! Source registry
//!
//! Maps a source file name to its raw-layer destination table, the upstream
//! system that produced it and the entity it carries. The registry is built
//! once, validated up front, and only read afterwards.

use crate::db::is_valid_identifier;
use crate::error::{IngestError, Result};
use crate::loader::{BATCH_ID_COLUMN, SOURCE_FILE_COLUMN};
use metro_common::SourceSystem;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Source column renamed to the destination's column name before insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub from: String,
    pub to: String,
}

/// Where one source file goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    file_name: String,
    destination_table: String,
    source_system: SourceSystem,
    entity_name: String,
    #[serde(default)]
    column_renames: Vec<ColumnRename>,
}

impl MappingEntry {
    pub fn new(
        file_name: impl Into<String>,
        destination_table: impl Into<String>,
        source_system: SourceSystem,
        entity_name: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            destination_table: destination_table.into(),
            source_system,
            entity_name: entity_name.into(),
            column_renames: Vec::new(),
        }
    }

    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.column_renames.push(ColumnRename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn destination_table(&self) -> &str {
        &self.destination_table
    }

    pub fn source_system(&self) -> SourceSystem {
        self.source_system
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn column_renames(&self) -> &[ColumnRename] {
        &self.column_renames
    }

    fn validate(&self) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(IngestError::registry("file_name cannot be empty"));
        }
        if !is_valid_identifier(&self.destination_table) {
            return Err(IngestError::registry(format!(
                "{}: destination table '{}' is not a valid identifier",
                self.file_name, self.destination_table
            )));
        }
        if !is_valid_identifier(&self.entity_name) {
            return Err(IngestError::registry(format!(
                "{}: entity name '{}' must be letters, digits and underscores",
                self.file_name, self.entity_name
            )));
        }

        let mut renamed = HashSet::new();
        for rename in &self.column_renames {
            if rename.from.trim().is_empty() || rename.to.trim().is_empty() {
                return Err(IngestError::registry(format!(
                    "{}: column renames need both 'from' and 'to'",
                    self.file_name
                )));
            }
            if is_metadata_column(&rename.to) {
                return Err(IngestError::registry(format!(
                    "{}: cannot rename '{}' onto metadata column '{}'",
                    self.file_name, rename.from, rename.to
                )));
            }
            if is_metadata_column(&rename.from) {
                return Err(IngestError::registry(format!(
                    "{}: metadata column '{}' cannot be renamed",
                    self.file_name, rename.from
                )));
            }
            if !renamed.insert(rename.from.as_str()) {
                return Err(IngestError::registry(format!(
                    "{}: column '{}' renamed more than once",
                    self.file_name, rename.from
                )));
            }
        }

        Ok(())
    }
}

fn is_metadata_column(name: &str) -> bool {
    name.eq_ignore_ascii_case(BATCH_ID_COLUMN) || name.eq_ignore_ascii_case(SOURCE_FILE_COLUMN)
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(rename = "source", default)]
    sources: Vec<MappingEntry>,
}

/// Validated, immutable file-to-table mapping.
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    entries: Vec<MappingEntry>,
    by_file: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Build a registry, rejecting empty fields, bad identifiers and
    /// duplicate file names or destination tables.
    pub fn new(entries: Vec<MappingEntry>) -> Result<Self> {
        let mut by_file = HashMap::with_capacity(entries.len());
        let mut tables = HashSet::with_capacity(entries.len());

        for (idx, entry) in entries.iter().enumerate() {
            entry.validate()?;

            if by_file.insert(entry.file_name.clone(), idx).is_some() {
                return Err(IngestError::registry(format!(
                    "file '{}' is registered more than once",
                    entry.file_name
                )));
            }
            if !tables.insert(entry.destination_table.as_str()) {
                return Err(IngestError::registry(format!(
                    "table '{}' is the destination of more than one file",
                    entry.destination_table
                )));
            }
        }

        Ok(Self { entries, by_file })
    }

    /// The MetroRetail source extracts and their raw tables.
    pub fn builtin() -> Result<Self> {
        Self::new(vec![
            MappingEntry::new(
                "pos_transactions_header.csv",
                "raw_pos_transactions_header",
                SourceSystem::Pos,
                "transactions_header",
            ),
            MappingEntry::new(
                "pos_transactions_lines.csv",
                "raw_pos_transactions_lines",
                SourceSystem::Pos,
                "transactions_lines",
            ),
            MappingEntry::new("erp_products.csv", "raw_erp_products", SourceSystem::Erp, "products"),
            MappingEntry::new("erp_stores.csv", "raw_erp_stores", SourceSystem::Erp, "stores"),
            MappingEntry::new(
                "erp_inventory.csv",
                "raw_erp_inventory",
                SourceSystem::Erp,
                "inventory",
            ),
            MappingEntry::new(
                "crm_customers.csv",
                "raw_crm_customers",
                SourceSystem::Crm,
                "customers",
            ),
            MappingEntry::new(
                "mkt_promotions.csv",
                "raw_mkt_promotions",
                SourceSystem::Mkt,
                "promotions",
            ),
            MappingEntry::new("api_weather.csv", "raw_api_weather", SourceSystem::Api, "weather")
                .with_rename("Store_ID", "Retail_Location_ID"),
        ])
    }

    /// Parse a registry from TOML `[[source]]` tables.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(text)
            .map_err(|e| IngestError::registry(format!("malformed registry: {}", e)))?;
        if file.sources.is_empty() {
            return Err(IngestError::registry("registry declares no sources"));
        }
        Self::new(file.sources)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::registry(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Look up the mapping for a file. Pure; never touches the database.
    pub fn resolve(&self, file_name: &str) -> Result<&MappingEntry> {
        self.by_file
            .get(file_name)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| IngestError::UnmappedSource(file_name.to_string()))
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.file_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
