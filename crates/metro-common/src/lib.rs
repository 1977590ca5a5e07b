//! MetroRetail Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared vocabulary and the logging bootstrap for the MetroRetail pipelines.
//!
//! # Overview
//!
//! - **Types**: source systems and manifest load statuses
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment variables
//!
//! # Example
//!
//! ```no_run
//! use metro_common::logging::{init_logging, LogConfig};
//! use metro_common::types::SourceSystem;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!(prefix = SourceSystem::Erp.prefix(), "ready");
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod types;

pub use types::{LoadStatus, SourceSystem, TerminalStatus, UnknownValue};
