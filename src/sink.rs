//! Destination seam: anything that can enumerate columns, be cleared, and
//! accept a bulk write is a staging sink.
//!
//! The engine only ever talks to [`TabularSink`]; the relational store
//! behind it is somebody else's problem. Two implementations ship:
//!
//! - [`CsvDirSink`] stores each staging table as a CSV file under a root
//!   directory and introspects column names and widths from a
//!   destination-schema YAML, which makes a full pipeline runnable (and
//!   inspectable) without a database.
//! - [`MemorySink`] records every interaction for unit tests.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::Deserialize;

use crate::io_utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkColumn {
    pub name: String,
    /// Declared maximum string width, when the destination constrains one.
    pub max_length: Option<usize>,
}

pub trait TabularSink {
    /// Live column set for `table`; fails when the table does not exist.
    fn columns(&self, table: &str) -> Result<Vec<SinkColumn>>;
    /// Reset the staging table ahead of a reload.
    fn clear(&self, table: &str) -> Result<()>;
    /// Write `rows` restricted to `columns`, honoring `timeout` where the
    /// backend supports call-level deadlines. Returns rows written.
    fn bulk_write(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
        timeout: Duration,
    ) -> Result<usize>;
    /// Optional post-load hook.
    fn execute_procedure(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct DestinationColumn {
    name: String,
    #[serde(default)]
    max_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DestinationTable {
    columns: Vec<DestinationColumn>,
}

#[derive(Debug, Deserialize)]
struct DestinationSchema {
    tables: HashMap<String, DestinationTable>,
}

/// List the table names a destination-schema YAML declares, without
/// standing up a sink. Used by configuration checks.
pub fn destination_tables(schema_path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(schema_path)
        .with_context(|| format!("Opening destination schema {schema_path:?}"))?;
    let schema: DestinationSchema = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("Parsing destination schema {schema_path:?}"))?;
    Ok(schema.tables.keys().cloned().collect())
}

/// File-backed sink: one CSV file per staging table under `root`, schema
/// introspection from a YAML document. Post-load procedures are logged and
/// skipped; there is nothing to execute against a directory.
pub struct CsvDirSink {
    root: PathBuf,
    schema: DestinationSchema,
}

impl CsvDirSink {
    pub fn open(root: &Path, schema_path: &Path) -> Result<Self> {
        let file = fs::File::open(schema_path)
            .with_context(|| format!("Opening destination schema {schema_path:?}"))?;
        let schema: DestinationSchema = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing destination schema {schema_path:?}"))?;
        fs::create_dir_all(root)
            .with_context(|| format!("Creating staging directory {root:?}"))?;
        Ok(Self {
            root: root.to_path_buf(),
            schema,
        })
    }

    fn table_entry(&self, table: &str) -> Result<&DestinationTable> {
        self.schema
            .tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(table))
            .map(|(_, entry)| entry)
            .ok_or_else(|| anyhow!("Table '{table}' does not exist at the destination"))
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.csv"))
    }
}

impl TabularSink for CsvDirSink {
    fn columns(&self, table: &str) -> Result<Vec<SinkColumn>> {
        let entry = self.table_entry(table)?;
        Ok(entry
            .columns
            .iter()
            .map(|c| SinkColumn {
                name: c.name.clone(),
                max_length: c.max_length,
            })
            .collect())
    }

    fn clear(&self, table: &str) -> Result<()> {
        self.table_entry(table)?;
        let path = self.table_path(table);
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("Clearing staging table {path:?}"))?;
        }
        Ok(())
    }

    fn bulk_write(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
        _timeout: Duration,
    ) -> Result<usize> {
        self.table_entry(table)?;
        let path = self.table_path(table);
        let mut writer = io_utils::open_csv_writer(&path, b',')?;
        writer.write_record(columns)?;
        for row in rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(rows.len())
    }

    fn execute_procedure(&self, name: &str) -> Result<()> {
        debug!("File-backed sink has no procedures; '{name}' skipped");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<SinkColumn>,
    rows: Vec<Vec<Option<String>>>,
    written_columns: Vec<String>,
    clear_count: usize,
}

/// Test double recording clears, writes, and procedure calls.
#[derive(Default)]
pub struct MemorySink {
    tables: RefCell<HashMap<String, MemoryTable>>,
    procedures: RefCell<Vec<String>>,
    fail_writes: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn define_table(&self, table: &str, columns: Vec<SinkColumn>) {
        self.tables.borrow_mut().insert(
            table.to_ascii_lowercase(),
            MemoryTable {
                columns,
                ..MemoryTable::default()
            },
        );
    }

    pub fn rows(&self, table: &str) -> Vec<Vec<Option<String>>> {
        self.tables
            .borrow()
            .get(&table.to_ascii_lowercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn written_columns(&self, table: &str) -> Vec<String> {
        self.tables
            .borrow()
            .get(&table.to_ascii_lowercase())
            .map(|t| t.written_columns.clone())
            .unwrap_or_default()
    }

    pub fn clear_count(&self, table: &str) -> usize {
        self.tables
            .borrow()
            .get(&table.to_ascii_lowercase())
            .map(|t| t.clear_count)
            .unwrap_or_default()
    }

    pub fn executed_procedures(&self) -> Vec<String> {
        self.procedures.borrow().clone()
    }
}

impl TabularSink for MemorySink {
    fn columns(&self, table: &str) -> Result<Vec<SinkColumn>> {
        self.tables
            .borrow()
            .get(&table.to_ascii_lowercase())
            .map(|t| t.columns.clone())
            .ok_or_else(|| anyhow!("Table '{table}' does not exist at the destination"))
    }

    fn clear(&self, table: &str) -> Result<()> {
        let mut tables = self.tables.borrow_mut();
        let entry = tables
            .get_mut(&table.to_ascii_lowercase())
            .ok_or_else(|| anyhow!("Table '{table}' does not exist at the destination"))?;
        entry.rows.clear();
        entry.clear_count += 1;
        Ok(())
    }

    fn bulk_write(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<Option<String>>],
        _timeout: Duration,
    ) -> Result<usize> {
        if self.fail_writes {
            return Err(anyhow!("constraint violation: simulated rejection"));
        }
        let mut tables = self.tables.borrow_mut();
        let entry = tables
            .get_mut(&table.to_ascii_lowercase())
            .ok_or_else(|| anyhow!("Table '{table}' does not exist at the destination"))?;
        entry.written_columns = columns.to_vec();
        entry.rows.extend(rows.iter().cloned());
        Ok(rows.len())
    }

    fn execute_procedure(&self, name: &str) -> Result<()> {
        self.procedures.borrow_mut().push(name.to_string());
        Ok(())
    }
}
