//! Column rename stage: applies [`ColumnMapping`]s to a parsed row-set.
//!
//! A pure transform producing a new [`RowSet`] with destination column
//! names in place of the incoming ones. Mappings whose incoming column is
//! absent are skipped silently; required-column enforcement already
//! happened at parse time, and destination-name conflicts were rejected at
//! configuration load.

use log::debug;

use crate::{mapping::ColumnMapping, rowset::RowSet};

pub fn apply(rowset: &RowSet, mappings: &[ColumnMapping]) -> RowSet {
    let mut renames = Vec::new();
    for mapping in mappings {
        match rowset.column_index(&mapping.from) {
            Some(idx) => renames.push((idx, mapping.to.clone())),
            None => debug!(
                "Mapping '{}' -> '{}' skipped: column not present in file",
                mapping.from, mapping.to
            ),
        }
    }
    rowset.with_renamed_columns(&renames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(from: &str, to: &str) -> ColumnMapping {
        ColumnMapping {
            from: from.into(),
            to: to.into(),
            required: false,
        }
    }

    fn sample_rowset() -> RowSet {
        let mut rs = RowSet::new(vec!["Clm No".into(), "Amt".into()]);
        rs.push_row(vec![Some("C1".into()), Some("10".into())]);
        rs
    }

    #[test]
    fn renames_matching_columns_case_insensitively() {
        let mapped = apply(
            &sample_rowset(),
            &[mapping("clm no", "ClaimNumber"), mapping("AMT", "Amount")],
        );
        assert_eq!(mapped.columns(), ["ClaimNumber", "Amount"]);
        assert_eq!(mapped.cell(0, 0), Some("C1"));
    }

    #[test]
    fn absent_incoming_columns_are_skipped() {
        let mapped = apply(&sample_rowset(), &[mapping("Payee", "PayeeName")]);
        assert_eq!(mapped.columns(), ["Clm No", "Amt"]);
    }

    #[test]
    fn source_rowset_is_left_untouched() {
        let original = sample_rowset();
        let _ = apply(&original, &[mapping("Clm No", "ClaimNumber")]);
        assert_eq!(original.columns(), ["Clm No", "Amt"]);
    }
}
