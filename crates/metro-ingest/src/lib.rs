//! MetroRetail Raw-Layer Ingestion
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads flat-file extracts from the source systems (POS, ERP, CRM,
//! marketing, weather API) into the warehouse raw layer and records every
//! load attempt in the `ingestion_manifest` ledger.
//!
//! # Flow
//!
//! 1. [`registry::SourceRegistry`] resolves the file to a table and source
//! 2. [`batch_id::BatchId`] names the attempt
//! 3. [`manifest::ManifestLedger`] records it as STARTED
//! 4. [`loader::TabularLoader`] stages the rows as text with lineage columns
//! 5. [`writer::BulkWriter`] inserts them in committed batches
//! 6. the ledger closes the attempt as COMPLETED or FAILED
//!
//! [`orchestrator::IngestOrchestrator`] wires these together.
//!
//! # Example
//!
//! ```no_run
//! use metro_ingest::{IngestConfig, IngestOptions, IngestOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let orchestrator = IngestOrchestrator::connect(&config).await?;
//!
//!     let report = orchestrator
//!         .ingest_one("erp_products.csv", IngestOptions::default())
//!         .await?;
//!     println!("{} rows under {}", report.rows_loaded, report.batch_id);
//!     Ok(())
//! }
//! ```

pub mod batch_id;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod orchestrator;
pub mod registry;
pub mod writer;

pub use batch_id::BatchId;
pub use config::IngestConfig;
pub use error::{ErrorKind, IngestError, ManifestStage, Result};
pub use loader::{StagedRowSet, TabularLoader};
pub use manifest::{ManifestLedger, ManifestRecord};
pub use orchestrator::{IngestOptions, IngestOrchestrator, IngestSummary, LoadReport};
pub use registry::{MappingEntry, SourceRegistry};
pub use writer::{BulkWriter, WriteReport};
