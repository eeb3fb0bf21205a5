//! Append-only audit trail: run messages, per-file error events, and the
//! advisory drift/truncation records.
//!
//! Two sinks ship: [`LogAudit`] routes everything through the `log`
//! facade, [`JsonlAudit`] appends timestamped JSON lines to a file so
//! drift history survives the process. Records are written before the
//! load they describe, so they are visible even when the load fails.

use std::{
    cell::RefCell,
    fs::OpenOptions,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

/// One observation per row-set column per reconcile pass, mirroring the
/// destination's schema-history audit table.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDriftRecord {
    pub table: String,
    pub column: String,
    /// Always true: the column was seen in the source file.
    pub detected: bool,
    /// True when the destination already has the column.
    pub mapped: bool,
    /// Advisory ALTER statement, present only for unmapped columns.
    pub suggested_alter: Option<String>,
    pub source_file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TruncationRecord {
    pub table: String,
    pub column: String,
    pub source_file: String,
    pub actual_length: usize,
    pub max_allowed_length: usize,
    /// Bounded head of the offending value; never the full text.
    pub preview: String,
}

pub trait AuditSink {
    fn message(&self, text: &str) -> Result<()>;
    fn error(&self, kind: &str, text: &str) -> Result<()>;
    fn drift(&self, record: &SchemaDriftRecord) -> Result<()>;
    fn truncation(&self, record: &TruncationRecord) -> Result<()>;
}

/// Audit sink backed by the `log` facade only.
#[derive(Default)]
pub struct LogAudit;

impl AuditSink for LogAudit {
    fn message(&self, text: &str) -> Result<()> {
        info!("{text}");
        Ok(())
    }

    fn error(&self, kind: &str, text: &str) -> Result<()> {
        error!("[{kind}] {text}");
        Ok(())
    }

    fn drift(&self, record: &SchemaDriftRecord) -> Result<()> {
        if record.mapped {
            info!(
                "Schema check {}.{}: mapped",
                record.table, record.column
            );
        } else {
            warn!(
                "Schema drift {}.{}: not at destination (suggest: {})",
                record.table,
                record.column,
                record.suggested_alter.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    }

    fn truncation(&self, record: &TruncationRecord) -> Result<()> {
        warn!(
            "Truncation risk {}.{} from {}: {} > {} ('{}...')",
            record.table,
            record.column,
            record.source_file,
            record.actual_length,
            record.max_allowed_length,
            record.preview
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum AuditEvent<'a> {
    Message { text: &'a str },
    Error { kind: &'a str, text: &'a str },
    SchemaDrift(&'a SchemaDriftRecord),
    Truncation(&'a TruncationRecord),
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: AuditEvent<'a>,
}

/// Audit sink appending one JSON object per line to a file.
pub struct JsonlAudit {
    writer: RefCell<BufWriter<std::fs::File>>,
}

impl JsonlAudit {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Opening audit file {path:?}"))?;
        Ok(Self {
            writer: RefCell::new(BufWriter::new(file)),
        })
    }

    fn append(&self, event: AuditEvent<'_>) -> Result<()> {
        let line = AuditLine {
            timestamp: Utc::now(),
            event,
        };
        let mut writer = self.writer.borrow_mut();
        serde_json::to_writer(&mut *writer, &line).context("Serializing audit event")?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl AuditSink for JsonlAudit {
    fn message(&self, text: &str) -> Result<()> {
        info!("{text}");
        self.append(AuditEvent::Message { text })
    }

    fn error(&self, kind: &str, text: &str) -> Result<()> {
        error!("[{kind}] {text}");
        self.append(AuditEvent::Error { kind, text })
    }

    fn drift(&self, record: &SchemaDriftRecord) -> Result<()> {
        self.append(AuditEvent::SchemaDrift(record))
    }

    fn truncation(&self, record: &TruncationRecord) -> Result<()> {
        self.append(AuditEvent::Truncation(record))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn jsonl_audit_appends_one_line_per_event() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("audit.jsonl");
        let audit = JsonlAudit::open(&path).expect("open audit");

        audit.message("run started").expect("message");
        audit
            .drift(&SchemaDriftRecord {
                table: "Claim_Staging".into(),
                column: "NewField".into(),
                detected: true,
                mapped: false,
                suggested_alter: Some(
                    "ALTER TABLE Claim_Staging ADD [NewField] NVARCHAR(MAX);".into(),
                ),
                source_file: "claims_2024.csv".into(),
            })
            .expect("drift");

        let contents = fs::read_to_string(&path).expect("read audit");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"event\":\"message\""));
        assert!(lines[1].contains("\"event\":\"schema_drift\""));
        assert!(lines[1].contains("NewField"));

        // Append mode: a reopened sink extends the same trail.
        let audit = JsonlAudit::open(&path).expect("reopen audit");
        audit.error("load", "boom").expect("error");
        let contents = fs::read_to_string(&path).expect("read audit");
        assert_eq!(contents.lines().count(), 3);
    }
}
