//! Positional decoding of fixed-width extract lines.
//!
//! Decoding is pure: callers hand in one line at a time and receive either a
//! [`DecodedRecord`] carrying every field of the layout, or a
//! [`DecodeWarning`] describing why the line was skipped.

use time::macros::format_description;
use time::Date;

use crate::entity::{char_columns, ColumnLayout, ColumnSpec, FieldKind};
use crate::format_compact_date;

const ZERO_DATE: &str = "00000000";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DecodeWarning {
    #[error("line is {actual} characters, layout requires {required}")]
    ShortLine { required: usize, actual: usize },
    #[error("field {field} holds invalid date {raw:?}")]
    InvalidDate { field: String, raw: String },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Date(Date),
}

impl FieldValue {
    #[must_use]
    pub fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }
}

/// One decoded line, fields in layout order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DecodedRecord {
    fields: Vec<(String, FieldValue)>,
}

impl DecodedRecord {
    #[must_use]
    pub fn new(fields: Vec<(String, FieldValue)>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decodes one fixed-width line against `layout`.
///
/// Numeric fields that do not parse become `0`. Date fields that are all
/// zeros (or blank) become the layout's sentinel date.
///
/// # Errors
/// Returns a [`DecodeWarning`] when the line is shorter than the layout or
/// a date field holds an invalid calendar date. Positions and lengths count
/// characters.
pub fn decode(line: &str, layout: &ColumnLayout) -> Result<DecodedRecord, DecodeWarning> {
    let line = line.trim_end_matches(['\r', '\n']);
    let actual = line.chars().count();
    let short_line = || DecodeWarning::ShortLine {
        required: layout.max_end(),
        actual,
    };
    if actual < layout.max_end() {
        return Err(short_line());
    }

    let mut fields = Vec::with_capacity(layout.columns().len());
    for column in layout.columns() {
        let raw = char_columns(line, column.start, column.end).ok_or_else(short_line)?;
        let value = decode_field(column, raw, layout.sentinel_date())?;
        fields.push((column.name.clone(), value));
    }

    Ok(DecodedRecord { fields })
}

fn decode_field(column: &ColumnSpec, raw: &str, sentinel: Date) -> Result<FieldValue, DecodeWarning> {
    match column.kind {
        FieldKind::Text => Ok(FieldValue::Text(raw.trim().to_string())),
        FieldKind::Integer => Ok(FieldValue::Integer(raw.trim().parse().unwrap_or(0))),
        FieldKind::Date => {
            if raw == ZERO_DATE || raw.trim().is_empty() {
                return Ok(FieldValue::Date(sentinel));
            }
            Date::parse(raw, format_description!("[year][month][day]"))
                .map(FieldValue::Date)
                .map_err(|_| DecodeWarning::InvalidDate {
                    field: column.name.clone(),
                    raw: raw.to_string(),
                })
        }
    }
}

/// Renders `record` back into a fixed-width line for `layout`.
///
/// Text is left-aligned, integers are zero-padded on the left, and the
/// sentinel date is written as `00000000`. Values wider than their column are
/// truncated; gaps between columns are spaces.
#[must_use]
pub fn encode(record: &DecodedRecord, layout: &ColumnLayout) -> String {
    let mut line = vec![' '; layout.max_end()];

    for column in layout.columns() {
        let width = column.width();
        let rendered = match record.get(&column.name) {
            Some(FieldValue::Text(value)) => format!("{value:<width$}"),
            Some(FieldValue::Integer(value)) => format!("{value:0width$}"),
            Some(FieldValue::Date(value)) if *value == layout.sentinel_date() => {
                ZERO_DATE.to_string()
            }
            Some(FieldValue::Date(value)) => format_compact_date(*value),
            None => String::new(),
        };

        for (offset, ch) in rendered.chars().take(width).enumerate() {
            line[column.start - 1 + offset] = ch;
        }
    }

    line.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SENTINEL_DATE;
    use proptest::prelude::*;
    use time::macros::date;

    fn account_layout() -> ColumnLayout {
        let columns = vec![
            ColumnSpec {
                name: "extract_dt".to_string(),
                start: 1,
                end: 8,
                kind: FieldKind::Date,
            },
            ColumnSpec {
                name: "acct_no".to_string(),
                start: 9,
                end: 18,
                kind: FieldKind::Text,
            },
            ColumnSpec {
                name: "balance".to_string(),
                start: 19,
                end: 27,
                kind: FieldKind::Integer,
            },
            ColumnSpec {
                name: "closed_dt".to_string(),
                start: 28,
                end: 35,
                kind: FieldKind::Date,
            },
        ];
        match ColumnLayout::new(columns) {
            Ok(layout) => layout,
            Err(err) => panic!("invalid fixture layout: {err}"),
        }
    }

    fn must_decode(line: &str) -> DecodedRecord {
        match decode(line, &account_layout()) {
            Ok(record) => record,
            Err(err) => panic!("expected record, got warning: {err}"),
        }
    }

    #[test]
    fn decodes_typed_fields_in_layout_order() {
        let record = must_decode("20260207ACC000000100001234520251231");
        assert_eq!(record.len(), 4);
        assert_eq!(
            record.get("extract_dt"),
            Some(&FieldValue::Date(date!(2026 - 02 - 07)))
        );
        assert_eq!(
            record.get("acct_no"),
            Some(&FieldValue::Text("ACC0000001".to_string()))
        );
        assert_eq!(record.get("balance"), Some(&FieldValue::Integer(12345)));
        assert_eq!(record.fields()[3].0, "closed_dt");
    }

    #[test]
    fn short_line_is_a_warning_not_a_panic() {
        let result = decode("20260207ACC00", &account_layout());
        assert_eq!(
            result,
            Err(DecodeWarning::ShortLine {
                required: 35,
                actual: 13
            })
        );
    }

    #[test]
    fn zero_date_becomes_sentinel() {
        let record = must_decode("20260207ACC000000100001234500000000");
        assert_eq!(record.get("closed_dt"), Some(&FieldValue::Date(SENTINEL_DATE)));
    }

    #[test]
    fn sentinel_is_configurable() {
        let layout = account_layout().with_sentinel_date(date!(1900 - 01 - 01));
        let record = decode("20260207ACC000000100001234500000000", &layout);
        assert_eq!(
            record.map(|value| value.get("closed_dt").cloned()),
            Ok(Some(FieldValue::Date(date!(1900 - 01 - 01))))
        );
    }

    #[test]
    fn unparsable_integer_defaults_to_zero() {
        let record = must_decode("20260207ACC00000010000X234520251231");
        assert_eq!(record.get("balance"), Some(&FieldValue::Integer(0)));
    }

    #[test]
    fn invalid_calendar_date_is_a_warning() {
        let result = decode("20261345ACC000000100001234520251231", &account_layout());
        assert!(matches!(result, Err(DecodeWarning::InvalidDate { .. })));
    }

    #[test]
    fn trailing_carriage_return_is_ignored() {
        let record = must_decode("20260207ACC000000100001234520251231\r");
        assert_eq!(
            record.get("closed_dt"),
            Some(&FieldValue::Date(date!(2025 - 12 - 31)))
        );
    }

    #[test]
    fn accented_text_keeps_later_fields_in_place() {
        let record = must_decode("20260207JOSÉ PÉREZ00001234520251231");
        assert_eq!(
            record.get("acct_no"),
            Some(&FieldValue::Text("JOSÉ PÉREZ".to_string()))
        );
        assert_eq!(record.get("balance"), Some(&FieldValue::Integer(12345)));
        assert_eq!(
            record.get("closed_dt"),
            Some(&FieldValue::Date(date!(2025 - 12 - 31)))
        );
    }

    #[test]
    fn short_line_length_counts_characters() {
        let result = decode("20260207ÉÉÉ", &account_layout());
        assert_eq!(
            result,
            Err(DecodeWarning::ShortLine {
                required: 35,
                actual: 11
            })
        );
    }

    #[test]
    fn encode_pads_to_layout_width() {
        let record = must_decode("20260207ACC000000100001234500000000");
        let line = encode(&record, &account_layout());
        assert_eq!(line, "20260207ACC000000100001234500000000");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_encode_then_decode_recovers_fields(
            acct in "[A-Z0-9ÀÉÑÜß]{1,10}",
            balance in 0i64..999_999_999,
            day in 1u8..=28,
            month in 1u8..=12,
            year in 1990i32..2100,
        ) {
            let layout = account_layout();
            let extract = match time::Month::try_from(month)
                .ok()
                .and_then(|month| Date::from_calendar_date(year, month, day).ok())
            {
                Some(value) => value,
                None => panic!("invalid generated date"),
            };
            let record = DecodedRecord::new(vec![
                ("extract_dt".to_string(), FieldValue::Date(extract)),
                ("acct_no".to_string(), FieldValue::Text(acct)),
                ("balance".to_string(), FieldValue::Integer(balance)),
                ("closed_dt".to_string(), FieldValue::Date(SENTINEL_DATE)),
            ]);

            let decoded = decode(&encode(&record, &layout), &layout);
            prop_assert_eq!(decoded, Ok(record));
        }
    }
}
