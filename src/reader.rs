//! File parsing into the uniform [`RowSet`] representation.
//!
//! Two source shapes:
//!
//! - **Delimited text**: the first line is the header, split on the
//!   configured delimiter with surrounding quotes stripped afterwards.
//!   Lines with more fields than headers log a format warning and drop the
//!   extras; short lines pad with nulls; wholly blank lines are dropped.
//! - **Spreadsheet workbooks**: the configured sheet is resolved
//!   case-insensitively (trailing `$`/quote markers ignored), the header
//!   row may sit below leading metadata rows, and header cells are
//!   normalized (non-breaking spaces, smart quotes) before use.
//!
//! Both modes append a [`SOURCE_FILE_COLUMN`] value to every kept row and
//! enforce required-column mappings before handing the row-set on.

use std::path::Path;

use calamine::{Data, Reader as _, open_workbook_auto};
use encoding_rs::Encoding;
use log::warn;

use crate::{
    error::FileError,
    io_utils,
    mapping::{ColumnMapping, FileKind, TableMapping},
    rowset::{RowSet, SOURCE_FILE_COLUMN},
};

pub fn parse(
    path: &Path,
    mapping: &TableMapping,
    encoding: &'static Encoding,
) -> Result<RowSet, FileError> {
    let rowset = match mapping.kind {
        FileKind::Delimited => parse_delimited(path, mapping.delimiter_byte(), encoding)?,
        FileKind::Spreadsheet => parse_spreadsheet(path, mapping)?,
    };
    check_required_columns(&rowset, &mapping.columns, path)?;
    Ok(rowset)
}

fn parse_error(path: &Path, reason: impl Into<String>) -> FileError {
    FileError::Parse {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn source_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn parse_delimited(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<RowSet, FileError> {
    let mut reader =
        io_utils::open_raw_reader(path, delimiter).map_err(|e| parse_error(path, e.to_string()))?;

    let mut record = csv::ByteRecord::new();
    let mut records = Vec::new();
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {
                let fields = io_utils::decode_record(&record, encoding)
                    .map_err(|e| parse_error(path, e.to_string()))?;
                records.push(fields);
            }
            Ok(false) => break,
            Err(e) => return Err(parse_error(path, e.to_string())),
        }
    }

    let Some(header_line) = records.first() else {
        return Err(parse_error(path, "file is empty"));
    };

    // A header line with no delimiter occurrence that is wholly quoted is
    // a single bare list of identifiers: one column named by the dequoted
    // header.
    let headers: Vec<String> = header_line
        .iter()
        .map(|h| io_utils::dequote(h).to_string())
        .collect();
    let header_count = headers.len();

    let mut rowset = RowSet::new(headers);
    for (line_no, fields) in records.iter().enumerate().skip(1) {
        if fields.len() > header_count {
            warn!(
                "{}: line {} has {} field(s) for {} header(s); extras dropped",
                path.display(),
                line_no + 1,
                fields.len(),
                header_count
            );
        }
        let cells: Vec<Option<String>> = fields
            .iter()
            .map(|f| {
                let value = io_utils::dequote(f);
                if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            })
            .collect();
        if RowSet::is_blank_row(&cells) {
            continue;
        }
        rowset.push_row(cells);
    }

    rowset.add_constant_column(SOURCE_FILE_COLUMN, &source_file_name(path));
    Ok(rowset)
}

fn parse_spreadsheet(path: &Path, mapping: &TableMapping) -> Result<RowSet, FileError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| parse_error(path, e.to_string()))?;
    let available = workbook.sheet_names().to_owned();
    if available.is_empty() {
        return Err(parse_error(path, "workbook contains no sheets"));
    }

    let sheet = match mapping.sheet.as_deref() {
        Some(wanted) => resolve_sheet_name(&available, wanted).ok_or_else(|| {
            FileError::SheetNotFound {
                path: path.to_path_buf(),
                sheet: wanted.to_string(),
                available: available.clone(),
            }
        })?,
        None => available[0].clone(),
    };

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| parse_error(path, e.to_string()))?;

    let grid: Vec<Vec<Option<String>>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_text).collect())
        .collect();

    rowset_from_grid(grid, mapping.header_row, path)
}

/// Resolve a configured sheet name against the workbook's sheet list,
/// ignoring case and trailing marker characters (`Claims$` matches
/// `Claims`).
pub(crate) fn resolve_sheet_name(available: &[String], wanted: &str) -> Option<String> {
    let normalized = wanted
        .trim()
        .trim_end_matches(['$', '\'', '"'])
        .to_ascii_lowercase();
    available
        .iter()
        .find(|name| {
            name.trim()
                .trim_end_matches(['$', '\'', '"'])
                .eq_ignore_ascii_case(&normalized)
        })
        .cloned()
}

/// Normalize a raw header cell: non-breaking spaces become plain spaces,
/// smart and straight quotes are removed, surrounding whitespace trimmed.
pub(crate) fn normalize_header_cell(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '\u{a0}' => Some(' '),
            '"' | '\'' | '\u{2018}' | '\u{2019}' | '\u{201c}' | '\u{201d}' => None,
            other => Some(other),
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Build a row-set from a raw cell grid: the row at 1-based `header_row`
/// names the columns, everything above it is discarded, blank rows are
/// dropped, and the source file column is appended.
pub(crate) fn rowset_from_grid(
    grid: Vec<Vec<Option<String>>>,
    header_row: usize,
    path: &Path,
) -> Result<RowSet, FileError> {
    if grid.is_empty() {
        return Err(parse_error(path, "sheet is empty"));
    }
    if header_row == 0 || header_row > grid.len() {
        return Err(parse_error(
            path,
            format!(
                "header row {header_row} is out of range ({} row(s) available)",
                grid.len()
            ),
        ));
    }

    let header_cells = &grid[header_row - 1];
    let headers: Vec<String> = header_cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| {
            let normalized = cell.as_deref().map(normalize_header_cell).unwrap_or_default();
            if normalized.is_empty() {
                format!("Column{}", idx + 1)
            } else {
                normalized
            }
        })
        .collect();

    let mut rowset = RowSet::new(headers);
    for cells in grid.into_iter().skip(header_row) {
        if RowSet::is_blank_row(&cells) {
            continue;
        }
        rowset.push_row(cells);
    }

    rowset.add_constant_column(SOURCE_FILE_COLUMN, &source_file_name(path));
    Ok(rowset)
}

fn cell_to_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Some(format!("{}", *f as i64))
            } else {
                Some(f.to_string())
            }
        }
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => Some(
            dt.as_datetime()
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| dt.as_f64().to_string()),
        ),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(e) => Some(format!("#ERR:{e:?}")),
    }
}

/// Fail with the first required mapping whose incoming column is absent.
pub(crate) fn check_required_columns(
    rowset: &RowSet,
    mappings: &[ColumnMapping],
    path: &Path,
) -> Result<(), FileError> {
    for mapping in mappings.iter().filter(|m| m.required) {
        if !rowset.has_column(&mapping.from) {
            return Err(FileError::MissingRequiredColumn {
                path: path.to_path_buf(),
                column: mapping.from.clone(),
            });
        }
    }
    Ok(())
}
