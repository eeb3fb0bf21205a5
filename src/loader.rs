//! Truncate-and-reload of a staging table from a row-set.
//!
//! Only the intersection of row-set and destination columns is written;
//! row-set-only columns were already reported as drift and are excluded
//! here. Columns are written under the destination's canonical casing.

use std::time::Duration;

use log::{debug, info};

use crate::{error::FileError, rowset::RowSet, sink::TabularSink};

pub fn load(
    rowset: &RowSet,
    table: &str,
    sink: &dyn TabularSink,
    timeout: Duration,
    post_load_procedure: Option<&str>,
) -> Result<usize, FileError> {
    let load_error = |reason: String| FileError::Load {
        table: table.to_string(),
        reason,
    };

    let destination = sink.columns(table).map_err(|e| load_error(e.to_string()))?;

    // (cell index, canonical destination name) for every shared column.
    let mut selected: Vec<(usize, String)> = Vec::new();
    for (idx, column) in rowset.columns().iter().enumerate() {
        if let Some(dest) = destination
            .iter()
            .find(|dest| dest.name.eq_ignore_ascii_case(column))
        {
            selected.push((idx, dest.name.clone()));
        } else {
            debug!("Column '{column}' not at destination '{table}'; excluded from load");
        }
    }
    if selected.is_empty() {
        return Err(load_error(
            "no row-set column exists at the destination".to_string(),
        ));
    }

    let columns: Vec<String> = selected.iter().map(|(_, name)| name.clone()).collect();
    let rows: Vec<Vec<Option<String>>> = rowset
        .rows()
        .iter()
        .map(|row| {
            selected
                .iter()
                .map(|(idx, _)| row.get(*idx).cloned().flatten())
                .collect()
        })
        .collect();

    sink.clear(table).map_err(|e| load_error(e.to_string()))?;
    let written = sink
        .bulk_write(table, &columns, &rows, timeout)
        .map_err(|e| load_error(e.to_string()))?;
    info!("Loaded {written} row(s) into '{table}' across {} column(s)", columns.len());

    if let Some(procedure) = post_load_procedure {
        sink.execute_procedure(procedure)
            .map_err(|e| load_error(format!("post-load procedure '{procedure}': {e}")))?;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use crate::{
        rowset::SOURCE_FILE_COLUMN,
        sink::{MemorySink, SinkColumn},
    };

    use super::*;

    fn sink_with(columns: &[&str]) -> MemorySink {
        let sink = MemorySink::new();
        sink.define_table(
            "Claim_Staging",
            columns
                .iter()
                .map(|name| SinkColumn {
                    name: name.to_string(),
                    max_length: None,
                })
                .collect(),
        );
        sink
    }

    fn rowset() -> RowSet {
        let mut rs = RowSet::new(vec!["ClaimNumber".into(), "Surprise".into()]);
        rs.push_row(vec![Some("C1".into()), Some("x".into())]);
        rs.push_row(vec![Some("C2".into()), None]);
        rs.add_constant_column(SOURCE_FILE_COLUMN, "claims.csv");
        rs
    }

    #[test]
    fn writes_only_the_destination_intersection() {
        let sink = sink_with(&["claimnumber", "SourceFileName"]);
        let written = load(
            &rowset(),
            "Claim_Staging",
            &sink,
            Duration::from_secs(1),
            None,
        )
        .expect("load");
        assert_eq!(written, 2);
        // Canonical destination casing, drift column excluded.
        assert_eq!(
            sink.written_columns("Claim_Staging"),
            ["claimnumber", "SourceFileName"]
        );
        assert_eq!(sink.clear_count("Claim_Staging"), 1);
        assert_eq!(sink.rows("Claim_Staging")[0][0], Some("C1".into()));
        assert_eq!(sink.rows("Claim_Staging")[0][1], Some("claims.csv".into()));
    }

    #[test]
    fn sink_rejection_becomes_a_load_error() {
        let sink = MemorySink::failing_writes();
        sink.define_table(
            "Claim_Staging",
            vec![SinkColumn {
                name: "ClaimNumber".into(),
                max_length: None,
            }],
        );
        let err = load(
            &rowset(),
            "Claim_Staging",
            &sink,
            Duration::from_secs(1),
            None,
        )
        .unwrap_err();
        match err {
            FileError::Load { reason, .. } => assert!(reason.contains("constraint violation")),
            other => panic!("expected Load, got {other}"),
        }
    }

    #[test]
    fn disjoint_schemas_fail_instead_of_writing_nothing() {
        let sink = sink_with(&["Unrelated"]);
        assert!(matches!(
            load(
                &rowset(),
                "Claim_Staging",
                &sink,
                Duration::from_secs(1),
                None
            ),
            Err(FileError::Load { .. })
        ));
    }

    #[test]
    fn loaded_columns_reconcile_clean_against_the_destination() {
        let sink = sink_with(&["ClaimNumber", "SourceFileName"]);
        load(
            &rowset(),
            "Claim_Staging",
            &sink,
            Duration::from_secs(1),
            None,
        )
        .expect("load");

        // Rebuild a row-set from what was actually written; every column
        // must already be mapped at the destination.
        let written = RowSet::new(sink.written_columns("Claim_Staging"));
        let (drift, _) =
            crate::reconcile::reconcile(&written, "Claim_Staging", &sink).expect("reconcile");
        assert!(drift.iter().all(|d| d.mapped));
    }

    #[test]
    fn post_load_procedure_runs_after_a_successful_write() {
        let sink = sink_with(&["ClaimNumber"]);
        load(
            &rowset(),
            "Claim_Staging",
            &sink,
            Duration::from_secs(1),
            Some("usp_After_Claim_Load"),
        )
        .expect("load");
        assert_eq!(sink.executed_procedures(), ["usp_After_Claim_Load"]);
    }
}
