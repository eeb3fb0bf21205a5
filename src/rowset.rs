//! In-memory row-set: the file-format-independent intermediate table.
//!
//! A [`RowSet`] holds ordered column names and rows of optional text cells.
//! Every row is padded to the column count at insertion, so downstream
//! stages can index cells positionally without bounds anxiety. Column
//! lookup is case-insensitive throughout the engine, matching how the
//! destination schema is compared.

/// Synthetic column appended to every parsed file so loaded rows keep
/// their provenance.
pub const SOURCE_FILE_COLUMN: &str = "SourceFileName";

#[derive(Debug, Clone, Default)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append a row, truncating extra cells and padding short rows with
    /// nulls so the width invariant holds.
    pub fn push_row(&mut self, mut cells: Vec<Option<String>>) {
        cells.truncate(self.columns.len());
        cells.resize(self.columns.len(), None);
        self.rows.push(cells);
    }

    /// True when every cell in the row is null or trims to empty.
    pub fn is_blank_row(cells: &[Option<String>]) -> bool {
        cells
            .iter()
            .all(|cell| cell.as_deref().map(str::trim).unwrap_or("").is_empty())
    }

    /// Add a column whose value is constant across all existing rows.
    pub fn add_constant_column(&mut self, name: &str, value: &str) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Some(value.to_string()));
        }
    }

    /// Produce a new row-set with `renames` applied as `(index, new_name)`
    /// pairs. Rows are shared by clone; the shape is unchanged.
    pub fn with_renamed_columns(&self, renames: &[(usize, String)]) -> Self {
        let mut columns = self.columns.clone();
        for (idx, new_name) in renames {
            if let Some(slot) = columns.get_mut(*idx) {
                *slot = new_name.clone();
            }
        }
        Self {
            columns,
            rows: self.rows.clone(),
        }
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }
}
