//! Common types used across the MetroRetail pipelines

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A string did not name any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// Source Systems
// ============================================================================

/// Upstream system that produced a flat file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceSystem {
    /// Point-of-sale
    Pos,
    /// Enterprise resource planning
    Erp,
    /// Customer relationship management
    Crm,
    /// Marketing
    Mkt,
    /// External weather API
    Api,
}

impl SourceSystem {
    pub const ALL: [SourceSystem; 5] = [
        SourceSystem::Pos,
        SourceSystem::Erp,
        SourceSystem::Crm,
        SourceSystem::Mkt,
        SourceSystem::Api,
    ];

    /// Upper-case code stored in the manifest (`ERP`).
    pub fn code(self) -> &'static str {
        match self {
            SourceSystem::Pos => "POS",
            SourceSystem::Erp => "ERP",
            SourceSystem::Crm => "CRM",
            SourceSystem::Mkt => "MKT",
            SourceSystem::Api => "API",
        }
    }

    /// Lower-case prefix used in file names and batch ids (`erp`).
    pub fn prefix(self) -> &'static str {
        match self {
            SourceSystem::Pos => "pos",
            SourceSystem::Erp => "erp",
            SourceSystem::Crm => "crm",
            SourceSystem::Mkt => "mkt",
            SourceSystem::Api => "api",
        }
    }
}

impl FromStr for SourceSystem {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceSystem::ALL
            .into_iter()
            .find(|system| system.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownValue {
                kind: "source system",
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for SourceSystem {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceSystem> for String {
    fn from(value: SourceSystem) -> Self {
        value.code().to_string()
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// Load Status
// ============================================================================

/// Status of a manifest record.
///
/// Records are born `Started` and move exactly once to a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    Started,
    Completed,
    Failed,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Started => "STARTED",
            LoadStatus::Completed => "COMPLETED",
            LoadStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoadStatus::Started)
    }
}

impl FromStr for LoadStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(LoadStatus::Started),
            "COMPLETED" => Ok(LoadStatus::Completed),
            "FAILED" => Ok(LoadStatus::Failed),
            other => Err(UnknownValue {
                kind: "load status",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for LoadStatus {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only statuses a manifest record may be closed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Completed,
    Failed,
}

impl TerminalStatus {
    pub fn as_str(&self) -> &'static str {
        LoadStatus::from(*self).as_str()
    }
}

impl From<TerminalStatus> for LoadStatus {
    fn from(value: TerminalStatus) -> Self {
        match value {
            TerminalStatus::Completed => LoadStatus::Completed,
            TerminalStatus::Failed => LoadStatus::Failed,
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_system_parse_is_case_insensitive() {
        assert_eq!("erp".parse::<SourceSystem>().unwrap(), SourceSystem::Erp);
        assert_eq!("POS".parse::<SourceSystem>().unwrap(), SourceSystem::Pos);
        assert_eq!(" Mkt ".parse::<SourceSystem>().unwrap(), SourceSystem::Mkt);
        assert!("sap".parse::<SourceSystem>().is_err());
    }

    #[test]
    fn test_source_system_code_and_prefix() {
        for system in SourceSystem::ALL {
            assert_eq!(system.code().to_lowercase(), system.prefix());
        }
    }

    #[test]
    fn test_load_status_round_trips_through_text() {
        for status in [LoadStatus::Started, LoadStatus::Completed, LoadStatus::Failed] {
            assert_eq!(status.as_str().parse::<LoadStatus>().unwrap(), status);
        }
        assert!("completed".parse::<LoadStatus>().is_err());
    }

    #[test]
    fn test_terminal_status_never_started() {
        assert!(LoadStatus::from(TerminalStatus::Completed).is_terminal());
        assert!(LoadStatus::from(TerminalStatus::Failed).is_terminal());
        assert!(!LoadStatus::Started.is_terminal());
        assert_eq!(TerminalStatus::Failed.as_str(), "FAILED");
    }
}
