//! Schema reconciliation: compares a row-set's shape and value widths
//! against the live destination schema.
//!
//! Emits one [`SchemaDriftRecord`] per row-set column per pass (mapped or
//! not, so the audit trail shows the full shape of every file), and one
//! [`TruncationRecord`] per value that exceeds a destination column's
//! declared width. Both are advisory; nothing here stops the load.

use anyhow::Result;

use crate::{
    audit::{SchemaDriftRecord, TruncationRecord},
    rowset::{RowSet, SOURCE_FILE_COLUMN},
    sink::TabularSink,
};

/// Head of an over-width value carried into the audit trail.
const PREVIEW_CHARS: usize = 64;

pub fn reconcile(
    rowset: &RowSet,
    table: &str,
    sink: &dyn TabularSink,
) -> Result<(Vec<SchemaDriftRecord>, Vec<TruncationRecord>)> {
    let destination = sink.columns(table)?;
    let source_file = rowset
        .column_index(SOURCE_FILE_COLUMN)
        .and_then(|idx| rowset.cell(0, idx))
        .unwrap_or("")
        .to_string();

    let mut drift = Vec::with_capacity(rowset.columns().len());
    for column in rowset.columns() {
        let mapped = destination
            .iter()
            .any(|dest| dest.name.eq_ignore_ascii_case(column));
        let suggested_alter = (!mapped)
            .then(|| format!("ALTER TABLE {table} ADD [{column}] NVARCHAR(MAX);"));
        drift.push(SchemaDriftRecord {
            table: table.to_string(),
            column: column.clone(),
            detected: true,
            mapped,
            suggested_alter,
            source_file: source_file.clone(),
        });
    }

    let mut truncations = Vec::new();
    for dest in destination.iter() {
        let Some(max_length) = dest.max_length else {
            continue;
        };
        let Some(idx) = rowset.column_index(&dest.name) else {
            continue;
        };
        for row in 0..rowset.row_count() {
            let Some(value) = rowset.cell(row, idx) else {
                continue;
            };
            let actual_length = value.chars().count();
            if actual_length > max_length {
                truncations.push(TruncationRecord {
                    table: table.to_string(),
                    column: dest.name.clone(),
                    source_file: source_file.clone(),
                    actual_length,
                    max_allowed_length: max_length,
                    preview: value.chars().take(PREVIEW_CHARS).collect(),
                });
            }
        }
    }

    Ok((drift, truncations))
}
