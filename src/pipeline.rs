//! Run orchestration: drives every configured mapping through discovery,
//! parse, rename, reconcile, load, and archive.
//!
//! Failure boundaries are deliberate and narrow. A broken mapping
//! configuration aborts the run before any file is touched. Everything
//! after that is per-file: a file that fails at any stage becomes an audit
//! error event and the loop moves on. An archive failure after a
//! successful load is only a warning, since the data is already in and the
//! file will be retried (and collide) on the next run.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use encoding_rs::Encoding;
use itertools::Itertools;
use log::{info, warn};

use crate::{
    archive,
    audit::AuditSink,
    error::FileError,
    loader, mapper,
    mapping::{MappingRepository, TableMapping},
    reader,
    sink::TabularSink,
};

pub struct RunOptions {
    pub load_timeout: Duration,
    pub encoding: &'static Encoding,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(300),
            encoding: encoding_rs::UTF_8,
        }
    }
}

/// Per-file result; decides archiving and the run summary bucket.
#[derive(Debug)]
pub enum ProcessingOutcome {
    Loaded { rows: usize, archived: bool },
    Skipped(FileError),
    Failed(FileError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_loaded: usize,
}

pub fn execute_run(
    repository: &dyn MappingRepository,
    sink: &dyn TabularSink,
    audit: &dyn AuditSink,
    options: &RunOptions,
) -> Result<RunSummary> {
    audit.message(&format!("Ingestion run started at {}", Utc::now().to_rfc3339()))?;

    // Configuration failures are fatal; nothing has been touched yet.
    let mappings = repository
        .table_mappings()
        .context("Loading table mappings")?;
    info!("Loaded {} table mapping(s)", mappings.len());

    let mut summary = RunSummary::default();
    for mapping in &mappings {
        if let Err(e) = sink.columns(&mapping.table) {
            audit.error(
                "setup",
                &format!("Mapping for '{}' skipped: {e}", mapping.table),
            )?;
            continue;
        }

        let files = match discover_files(mapping) {
            Ok(files) => files,
            Err(e) => {
                audit.error(
                    "discovery",
                    &format!("Listing files for '{}': {e}", mapping.table),
                )?;
                continue;
            }
        };
        info!(
            "Mapping '{}': {} file(s) matching '{}' in {}",
            mapping.table,
            files.len(),
            mapping.pattern,
            mapping.source_dir.display()
        );

        for path in files {
            let outcome = process_file(&path, mapping, sink, audit, options)?;
            match outcome {
                ProcessingOutcome::Loaded { rows, .. } => {
                    summary.files_loaded += 1;
                    summary.rows_loaded += rows;
                }
                ProcessingOutcome::Skipped(e) => {
                    summary.files_skipped += 1;
                    audit.error(e.stage(), &format!("{}: {e}", path.display()))?;
                }
                ProcessingOutcome::Failed(e) => {
                    summary.files_failed += 1;
                    audit.error(e.stage(), &format!("{}: {e}", path.display()))?;
                }
            }
        }
    }

    audit.message(&format!(
        "Ingestion run completed at {}: {} loaded, {} skipped, {} failed, {} row(s)",
        Utc::now().to_rfc3339(),
        summary.files_loaded,
        summary.files_skipped,
        summary.files_failed,
        summary.rows_loaded
    ))?;
    Ok(summary)
}

/// Glob the mapping's source directory; matches are sorted ascending so
/// processing order is reproducible.
pub fn discover_files(mapping: &TableMapping) -> Result<Vec<PathBuf>> {
    let pattern = mapping
        .source_dir
        .join(&mapping.pattern)
        .display()
        .to_string();
    let entries = glob::glob(&pattern).with_context(|| format!("Invalid pattern '{pattern}'"))?;
    let files = entries
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!("Skipping unreadable path: {e}");
                None
            }
        })
        .sorted()
        .collect();
    Ok(files)
}

/// Run one file through the full stage chain inside its failure boundary.
/// Only audit-sink failures escape as `Err`.
fn process_file(
    path: &PathBuf,
    mapping: &TableMapping,
    sink: &dyn TabularSink,
    audit: &dyn AuditSink,
    options: &RunOptions,
) -> Result<ProcessingOutcome> {
    info!("Processing {} for table '{}'", path.display(), mapping.table);

    let rowset = match reader::parse(path, mapping, options.encoding) {
        Ok(rowset) => rowset,
        Err(e @ FileError::MissingRequiredColumn { .. }) => {
            return Ok(ProcessingOutcome::Skipped(e));
        }
        Err(e) => return Ok(ProcessingOutcome::Failed(e)),
    };

    let rowset = mapper::apply(&rowset, &mapping.columns);

    // Drift and truncation are persisted before the load so they survive a
    // failed write.
    let (drift, truncations) = match crate::reconcile::reconcile(&rowset, &mapping.table, sink) {
        Ok(records) => records,
        Err(e) => {
            return Ok(ProcessingOutcome::Failed(FileError::Load {
                table: mapping.table.clone(),
                reason: e.to_string(),
            }));
        }
    };
    for record in &drift {
        audit.drift(record)?;
    }
    for record in &truncations {
        audit.truncation(record)?;
    }

    let rows = match loader::load(
        &rowset,
        &mapping.table,
        sink,
        options.load_timeout,
        mapping.post_load_procedure.as_deref(),
    ) {
        Ok(rows) => rows,
        Err(e) => return Ok(ProcessingOutcome::Failed(e)),
    };

    match archive::archive(path, &mapping.archive_dir, Local::now().date_naive()) {
        Ok(_) => Ok(ProcessingOutcome::Loaded {
            rows,
            archived: true,
        }),
        Err(e) => {
            // Data is loaded; the file stays put for the next run.
            audit.error(e.stage(), &format!("{}: {e} (data loaded; will retry)", path.display()))?;
            Ok(ProcessingOutcome::Loaded {
                rows,
                archived: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use crate::{
        audit::LogAudit,
        error::ConfigError,
        mapping::{ColumnMapping, FileKind},
        sink::{MemorySink, SinkColumn},
    };

    use super::*;

    struct StaticRepository(Vec<TableMapping>);

    impl MappingRepository for StaticRepository {
        fn table_mappings(&self) -> Result<Vec<TableMapping>, ConfigError> {
            Ok(self.0.clone())
        }

        fn column_mappings(&self, table: &str) -> Result<Vec<ColumnMapping>, ConfigError> {
            self.0
                .iter()
                .find(|m| m.table.eq_ignore_ascii_case(table))
                .map(|m| m.columns.clone())
                .ok_or_else(|| ConfigError::UnknownTable {
                    table: table.to_string(),
                })
        }
    }

    struct FailingRepository;

    impl MappingRepository for FailingRepository {
        fn table_mappings(&self) -> Result<Vec<TableMapping>, ConfigError> {
            Err(ConfigError::EmptyTargetTable {
                pattern: "*.csv".into(),
            })
        }

        fn column_mappings(&self, _table: &str) -> Result<Vec<ColumnMapping>, ConfigError> {
            unreachable!()
        }
    }

    fn claim_mapping(source_dir: PathBuf, archive_dir: PathBuf) -> TableMapping {
        TableMapping {
            table: "Claim_Staging".into(),
            kind: FileKind::Delimited,
            pattern: "claims_*.csv".into(),
            source_dir,
            archive_dir,
            delimiter: ',',
            sheet: None,
            header_row: 1,
            post_load_procedure: None,
            columns: vec![ColumnMapping {
                from: "Clm No".into(),
                to: "ClaimNumber".into(),
                required: true,
            }],
        }
    }

    fn claim_sink() -> MemorySink {
        let sink = MemorySink::new();
        sink.define_table(
            "Claim_Staging",
            vec![
                SinkColumn {
                    name: "ClaimNumber".into(),
                    max_length: Some(20),
                },
                SinkColumn {
                    name: "Amount".into(),
                    max_length: None,
                },
                SinkColumn {
                    name: "SourceFileName".into(),
                    max_length: None,
                },
            ],
        );
        sink
    }

    #[test]
    fn run_loads_archives_and_counts_per_file() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("in");
        let archive_root = dir.path().join("archive");
        fs::create_dir_all(&source).expect("source dir");
        fs::write(source.join("claims_b.csv"), "Clm No,Amount\nC3,30\n").expect("write b");
        fs::write(source.join("claims_a.csv"), "Clm No,Amount\nC1,10\nC2,20\n").expect("write a");
        // Lacks the required column: skipped, not fatal.
        fs::write(source.join("claims_c.csv"), "Other\nx\n").expect("write c");
        fs::write(source.join("ignored.txt"), "nope").expect("write ignored");

        let repository = StaticRepository(vec![claim_mapping(source.clone(), archive_root.clone())]);
        let sink = claim_sink();
        let summary = execute_run(&repository, &sink, &LogAudit, &RunOptions::default())
            .expect("run succeeds");

        assert_eq!(summary.files_loaded, 2);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_failed, 0);
        assert_eq!(summary.rows_loaded, 3);

        // Staging holds the last processed file only (truncate per file),
        // with the mapped destination name.
        assert_eq!(sink.written_columns("Claim_Staging")[0], "ClaimNumber");
        assert_eq!(sink.rows("Claim_Staging").len(), 1);
        assert_eq!(sink.clear_count("Claim_Staging"), 2);

        // Loaded files archived; the skipped one remains for inspection.
        let month = Local::now().date_naive().format("%Y-%m").to_string();
        assert!(archive_root.join(&month).join("claims_a.csv").exists());
        assert!(archive_root.join(&month).join("claims_b.csv").exists());
        assert!(source.join("claims_c.csv").exists());
        assert!(!source.join("claims_a.csv").exists());
    }

    #[test]
    fn load_failure_leaves_file_in_place_and_run_continues() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("in");
        fs::create_dir_all(&source).expect("source dir");
        fs::write(source.join("claims_a.csv"), "Clm No\nC1\n").expect("write a");

        let sink = MemorySink::failing_writes();
        sink.define_table(
            "Claim_Staging",
            vec![SinkColumn {
                name: "ClaimNumber".into(),
                max_length: None,
            }],
        );
        let repository = StaticRepository(vec![claim_mapping(
            source.clone(),
            dir.path().join("archive"),
        )]);
        let summary = execute_run(&repository, &sink, &LogAudit, &RunOptions::default())
            .expect("run succeeds");

        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_loaded, 0);
        assert!(source.join("claims_a.csv").exists());
    }

    #[test]
    fn repository_failure_is_fatal() {
        let sink = claim_sink();
        let result = execute_run(&FailingRepository, &sink, &LogAudit, &RunOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn unknown_destination_table_skips_the_mapping() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().join("in");
        fs::create_dir_all(&source).expect("source dir");
        fs::write(source.join("claims_a.csv"), "Clm No\nC1\n").expect("write a");

        let mut mapping = claim_mapping(source, dir.path().join("archive"));
        mapping.table = "Not_There".into();
        let repository = StaticRepository(vec![mapping]);
        let sink = claim_sink();
        let summary = execute_run(&repository, &sink, &LogAudit, &RunOptions::default())
            .expect("run succeeds");
        assert_eq!(summary.files_loaded + summary.files_failed + summary.files_skipped, 0);
    }

    #[test]
    fn discovery_is_sorted_ascending() {
        let dir = tempdir().expect("temp dir");
        let source = dir.path().to_path_buf();
        fs::write(source.join("claims_b.csv"), "x").expect("write b");
        fs::write(source.join("claims_a.csv"), "x").expect("write a");
        let mapping = claim_mapping(source, dir.path().join("archive"));
        let files = discover_files(&mapping).expect("discover");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["claims_a.csv", "claims_b.csv"]);
    }
}
