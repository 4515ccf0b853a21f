use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::macros::date;
use time::Date;

use crate::LoaderError;

/// Date substituted for all-zero date positions.
pub const SENTINEL_DATE: Date = date!(0001 - 01 - 01);

const DATE_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Date,
}

impl FieldKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Date => "date",
        }
    }

    /// Column affinity used for staging tables.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Text | Self::Date => "TEXT",
            Self::Integer => "INTEGER",
        }
    }
}

/// One positional field, 1-based and inclusive on both ends.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub kind: FieldKind,
}

impl ColumnSpec {
    #[must_use]
    pub fn width(&self) -> usize {
        self.end + 1 - self.start
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

impl ColumnRange {
    /// Characters `start..=end` of `line`, if the line is long enough.
    #[must_use]
    pub fn slice<'a>(&self, line: &'a str) -> Option<&'a str> {
        char_columns(line, self.start, self.end)
    }
}

/// Characters `start..=end` (1-based, inclusive) of `line`. Positions count
/// characters, not bytes.
#[must_use]
pub fn char_columns(line: &str, start: usize, end: usize) -> Option<&str> {
    if start == 0 || end < start {
        return None;
    }
    let mut boundaries = line
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(line.len()));
    let from = boundaries.nth(start - 1)?;
    let to = boundaries.nth(end - start)?;
    Some(&line[from..to])
}

/// Ordered column map for one entity's fixed-width records.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnLayout {
    columns: Vec<ColumnSpec>,
    max_end: usize,
    sentinel_date: Date,
}

impl ColumnLayout {
    /// Builds a layout, validating positions, widths and field names.
    ///
    /// # Errors
    /// Returns [`LoaderError::Configuration`] for empty layouts, zero or
    /// inverted positions, duplicate names, overlapping columns, or date
    /// columns that are not eight characters wide. Gaps between columns are
    /// filler and allowed.
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, LoaderError> {
        if columns.is_empty() {
            return Err(LoaderError::Configuration(
                "column layout MUST contain at least one column".to_string(),
            ));
        }

        let mut names = BTreeSet::new();
        for column in &columns {
            ensure_identifier("column name", &column.name)?;
            if !names.insert(column.name.to_ascii_lowercase()) {
                return Err(LoaderError::Configuration(format!(
                    "duplicate column name: {}",
                    column.name
                )));
            }
            if column.start == 0 || column.end < column.start {
                return Err(LoaderError::Configuration(format!(
                    "column {} has invalid positions {}..={}",
                    column.name, column.start, column.end
                )));
            }
            if column.kind == FieldKind::Date && column.width() != DATE_WIDTH {
                return Err(LoaderError::Configuration(format!(
                    "date column {} MUST be {DATE_WIDTH} characters wide",
                    column.name
                )));
            }
        }

        let mut spans = columns.iter().collect::<Vec<_>>();
        spans.sort_by_key(|column| column.start);
        for pair in spans.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(LoaderError::Configuration(format!(
                    "columns {} and {} overlap at position {}",
                    pair[0].name, pair[1].name, pair[1].start
                )));
            }
        }

        let max_end = columns.iter().map(|column| column.end).max().unwrap_or(0);
        Ok(Self {
            columns,
            max_end,
            sentinel_date: SENTINEL_DATE,
        })
    }

    #[must_use]
    pub fn with_sentinel_date(mut self, sentinel_date: Date) -> Self {
        self.sentinel_date = sentinel_date;
        self
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Minimum line length every record must reach.
    #[must_use]
    pub fn max_end(&self) -> usize {
        self.max_end
    }

    #[must_use]
    pub fn sentinel_date(&self) -> Date {
        self.sentinel_date
    }
}

/// Whether an entity has a working processor yet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    #[default]
    Table,
    Pending,
}

/// One named transform operation with its extra parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransformStep {
    pub operation: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Static description of one entity extract.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EntityDescriptor {
    pub code: String,
    pub drop_file: String,
    pub staging_table: String,
    pub processor: ProcessorKind,
    pub layout: ColumnLayout,
    pub extract_date: ColumnRange,
    pub transforms: Vec<TransformStep>,
}

impl EntityDescriptor {
    #[must_use]
    pub fn data_file(&self) -> String {
        format!("{}.dat", self.code)
    }

    #[must_use]
    pub fn bad_file(&self) -> String {
        format!("{}.bad", self.code)
    }

    #[must_use]
    pub fn output_file(&self) -> String {
        format!("{}.out", self.code)
    }

    #[must_use]
    pub fn load_log_file(&self) -> String {
        format!("load{}.log", self.code)
    }

    /// Files the rotator archives rather than deletes.
    #[must_use]
    pub fn archived_files(&self) -> [String; 3] {
        [self.bad_file(), self.output_file(), self.load_log_file()]
    }
}

/// Rejects anything but `[A-Za-z_][A-Za-z0-9_]*`; identifiers end up in SQL.
///
/// # Errors
/// Returns [`LoaderError::Configuration`] when `value` is not a plain identifier.
pub fn ensure_identifier(field: &str, value: &str) -> Result<(), LoaderError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(LoaderError::Configuration(format!(
            "{field} MUST be a plain identifier, got {value:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, start: usize, end: usize, kind: FieldKind) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            start,
            end,
            kind,
        }
    }

    #[test]
    fn layout_tracks_widest_end_position() {
        let layout = ColumnLayout::new(vec![
            column("extract_dt", 1, 8, FieldKind::Date),
            column("acct_no", 9, 18, FieldKind::Text),
            column("balance", 19, 27, FieldKind::Integer),
        ]);
        match layout {
            Ok(layout) => assert_eq!(layout.max_end(), 27),
            Err(err) => panic!("unexpected layout error: {err}"),
        }
    }

    #[test]
    fn layout_rejects_narrow_date_and_duplicates() {
        assert!(ColumnLayout::new(vec![column("dt", 1, 6, FieldKind::Date)]).is_err());
        assert!(ColumnLayout::new(vec![
            column("a", 1, 2, FieldKind::Text),
            column("A", 3, 4, FieldKind::Text),
        ])
        .is_err());
        assert!(ColumnLayout::new(vec![column("a", 0, 2, FieldKind::Text)]).is_err());
        assert!(ColumnLayout::new(Vec::new()).is_err());
    }

    #[test]
    fn layout_rejects_overlap_but_allows_filler_gaps() {
        let overlapping = ColumnLayout::new(vec![
            column("extract_dt", 1, 8, FieldKind::Date),
            column("acct_no", 8, 17, FieldKind::Text),
        ]);
        match overlapping {
            Ok(_) => panic!("expected overlap error"),
            Err(err) => assert!(err.to_string().contains("overlap")),
        }

        assert!(ColumnLayout::new(vec![
            column("acct_no", 12, 20, FieldKind::Text),
            column("extract_dt", 1, 8, FieldKind::Date),
        ])
        .is_ok());
    }

    #[test]
    fn column_positions_count_characters() {
        assert_eq!(char_columns("JOSÉ 0042", 1, 5), Some("JOSÉ "));
        assert_eq!(char_columns("JOSÉ 0042", 6, 9), Some("0042"));
        assert_eq!(char_columns("JOSÉ 0042", 6, 10), None);
        assert_eq!(
            ColumnRange { start: 2, end: 4 }.slice("ÅÉÎÕÜ"),
            Some("ÉÎÕ")
        );
    }

    #[test]
    fn identifiers_reject_sql_fragments() {
        assert!(ensure_identifier("table", "stg_account").is_ok());
        assert!(ensure_identifier("table", "stg;drop").is_err());
        assert!(ensure_identifier("table", "1abc").is_err());
        assert!(ensure_identifier("table", "").is_err());
    }
}
