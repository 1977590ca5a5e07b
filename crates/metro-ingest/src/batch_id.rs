//! Batch identifiers
//!
//! A batch id names one load attempt: `{source}_{entity}_{YYYYMMDD}_{HHMMSS}`,
//! e.g. `erp_products_20261018_142501`. It is the manifest's key and is
//! stamped on every row the attempt writes.
//!
//! The timestamp is UTC, the same basis as the manifest's `Load_Start_TS`
//! and `Load_End_TS`.
//!
//! Resolution is one second. Two loads of the same entity started within the
//! same second get the same id, and the second one is refused by the
//! manifest's unique key. Callers running concurrent loads of one entity must
//! not rely on these ids being distinct.

use chrono::{NaiveDateTime, Utc};
use metro_common::SourceSystem;
use std::fmt;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(String);

impl BatchId {
    /// Derive the id for a load of `entity_name` from `source_system` at `now`.
    pub fn mint(source_system: SourceSystem, entity_name: &str, now: NaiveDateTime) -> Self {
        Self(format!(
            "{}_{}_{}",
            source_system.prefix(),
            entity_name,
            now.format(TIMESTAMP_FORMAT)
        ))
    }

    /// [`BatchId::mint`] with the current UTC time.
    pub fn mint_now(source_system: SourceSystem, entity_name: &str) -> Self {
        Self::mint(source_system, entity_name, Utc::now().naive_utc())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<BatchId> for String {
    fn from(value: BatchId) -> Self {
        value.0
    }
}
