//! Typed error taxonomy for the ingestion engine.
//!
//! Two tiers: [`ConfigError`] is fatal to the whole run (bad or ambiguous
//! mapping configuration), while [`FileError`] is caught at the
//! orchestrator's per-file boundary, logged, and skipped. Drift and
//! truncation are advisory records, not errors, and never appear here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Reading mapping configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parsing mapping configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(
        "Table '{table}': mappings '{first}' and '{second}' both target destination column '{target}'"
    )]
    ConflictingMapping {
        table: String,
        target: String,
        first: String,
        second: String,
    },
    #[error("Mapping for pattern '{pattern}' has an empty target table name")]
    EmptyTargetTable { pattern: String },
    #[error("No mapping configured for table '{table}'")]
    UnknownTable { table: String },
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("Parsing {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("Sheet '{sheet}' not found in {} (available: {})", path.display(), available.join(", "))]
    SheetNotFound {
        path: PathBuf,
        sheet: String,
        available: Vec<String>,
    },
    #[error("Required column '{column}' missing from {}", path.display())]
    MissingRequiredColumn { path: PathBuf, column: String },
    #[error("Loading into '{table}': {reason}")]
    Load { table: String, reason: String },
    #[error("Archiving {} to {}: {reason}", from.display(), to.display())]
    Archive {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
}

impl FileError {
    /// Stage label carried into audit error events.
    pub fn stage(&self) -> &'static str {
        match self {
            FileError::Parse { .. } | FileError::SheetNotFound { .. } => "parse",
            FileError::MissingRequiredColumn { .. } => "required-columns",
            FileError::Load { .. } => "load",
            FileError::Archive { .. } => "archive",
        }
    }
}
