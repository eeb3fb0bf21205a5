//! Mapping configuration: which files feed which staging tables, and how
//! incoming column names translate to destination names.
//!
//! Configuration is loaded once per run through the [`MappingRepository`]
//! seam and is immutable afterwards. The shipped implementation reads a
//! single YAML document; validation rejects ambiguous configurations
//! (two mappings targeting the same destination column) at load time so
//! the rename stage never has to pick a winner.

use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Delimited,
    Spreadsheet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column name as it appears in the source file (matched
    /// case-insensitively).
    pub from: String,
    /// Destination column name.
    pub to: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMapping {
    /// Destination staging table; must exist at the sink at load time.
    pub table: String,
    pub kind: FileKind,
    /// Glob pattern matched against file names in `source_dir`.
    pub pattern: String,
    pub source_dir: std::path::PathBuf,
    pub archive_dir: std::path::PathBuf,
    /// Field delimiter for delimited files.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Worksheet to read for spreadsheet files (first sheet if omitted).
    #[serde(default)]
    pub sheet: Option<String>,
    /// 1-based row index of the header row.
    #[serde(default = "default_header_row")]
    pub header_row: usize,
    /// Optional sink-side procedure run after a successful load.
    #[serde(default)]
    pub post_load_procedure: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnMapping>,
}

fn default_delimiter() -> char {
    ','
}

fn default_header_row() -> usize {
    1
}

impl TableMapping {
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }
}

pub trait MappingRepository {
    fn table_mappings(&self) -> Result<Vec<TableMapping>, ConfigError>;
    fn column_mappings(&self, table: &str) -> Result<Vec<ColumnMapping>, ConfigError>;
}

#[derive(Debug, Deserialize)]
struct MappingDocument {
    mappings: Vec<TableMapping>,
}

/// YAML-backed repository. The whole document is read and validated
/// eagerly so configuration failures surface before any file is touched.
#[derive(Debug)]
pub struct YamlMappingRepository {
    mappings: Vec<TableMapping>,
}

impl YamlMappingRepository {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let document: MappingDocument = serde_yaml::from_reader(BufReader::new(file))?;
        validate(&document.mappings)?;
        Ok(Self {
            mappings: document.mappings,
        })
    }
}

impl MappingRepository for YamlMappingRepository {
    fn table_mappings(&self) -> Result<Vec<TableMapping>, ConfigError> {
        Ok(self.mappings.clone())
    }

    fn column_mappings(&self, table: &str) -> Result<Vec<ColumnMapping>, ConfigError> {
        self.mappings
            .iter()
            .find(|m| m.table.eq_ignore_ascii_case(table))
            .map(|m| m.columns.clone())
            .ok_or_else(|| ConfigError::UnknownTable {
                table: table.to_string(),
            })
    }
}

fn validate(mappings: &[TableMapping]) -> Result<(), ConfigError> {
    for mapping in mappings {
        if mapping.table.trim().is_empty() {
            return Err(ConfigError::EmptyTargetTable {
                pattern: mapping.pattern.clone(),
            });
        }
        let mut targets: HashMap<String, &str> = HashMap::new();
        for column in &mapping.columns {
            let key = column.to.to_ascii_lowercase();
            if let Some(first) = targets.insert(key, column.from.as_str()) {
                return Err(ConfigError::ConflictingMapping {
                    table: mapping.table.clone(),
                    target: column.to.clone(),
                    first: first.to_string(),
                    second: column.from.clone(),
                });
            }
        }
    }
    Ok(())
}
