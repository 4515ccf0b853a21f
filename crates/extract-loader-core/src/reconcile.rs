//! Extract-date parsing and comparison.

use time::macros::format_description;
use time::{Date, Duration};

use crate::entity::ColumnRange;
use crate::{format_slash_date, LoaderError};

/// Gap required between the primary daily extract and the latest weekly
/// companion extract.
pub const WEEKLY_COMPANION_GAP_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Reconciliation {
    pub diff_days: i64,
    pub matches: bool,
}

/// Parses an extract date in either `YYYYMMDD` or `MM/DD/YYYY` form, chosen
/// by length.
///
/// # Errors
/// Returns [`LoaderError::DateFormat`] for any other length or an invalid
/// calendar date.
pub fn parse_extract_date(value: &str) -> Result<Date, LoaderError> {
    let parsed = match value.len() {
        8 => Date::parse(value, format_description!("[year][month][day]")),
        10 => Date::parse(value, format_description!("[month]/[day]/[year]")),
        _ => {
            return Err(LoaderError::DateFormat(format!(
                "extract date MUST be YYYYMMDD or MM/DD/YYYY, got {value:?}"
            )))
        }
    };

    parsed.map_err(|err| LoaderError::DateFormat(format!("invalid extract date {value:?}: {err}")))
}

/// Day of the year for an extract date string.
///
/// # Errors
/// Returns [`LoaderError::DateFormat`] when the string is not a recognised
/// extract date.
pub fn to_ordinal(value: &str) -> Result<u16, LoaderError> {
    Ok(parse_extract_date(value)?.ordinal())
}

/// Compares two extract dates by full calendar difference, so pairs that
/// straddle a year boundary still produce their true gap.
#[must_use]
pub fn reconcile(current: Date, previous: Date, expected_gap: i64) -> Reconciliation {
    let diff_days = (current - previous).whole_days();
    Reconciliation {
        diff_days,
        matches: diff_days == expected_gap,
    }
}

/// The weekly-vs-daily check with the reference gap.
#[must_use]
pub fn reconcile_weekly(current_daily: Date, latest_weekly: Date) -> Reconciliation {
    reconcile(current_daily, latest_weekly, WEEKLY_COMPANION_GAP_DAYS)
}

/// Previous recorded extract date advanced by the schedule offset.
///
/// # Errors
/// Returns [`LoaderError::Validation`] when the result leaves the supported
/// calendar range.
pub fn expected_extract_date(previous: Date, offset_days: i64) -> Result<Date, LoaderError> {
    previous
        .checked_add(Duration::days(offset_days))
        .ok_or_else(|| {
            LoaderError::Validation(format!(
                "cannot add {offset_days} days to {}",
                format_slash_date(previous)
            ))
        })
}

/// Reads the extract date held in `range` of a raw record line.
///
/// # Errors
/// Returns [`LoaderError::DateFormat`] when the line is too short for the
/// range or the text there is not a `YYYYMMDD` date.
pub fn read_extract_date(line: &str, range: ColumnRange) -> Result<Date, LoaderError> {
    let raw = range.slice(line).ok_or_else(|| {
        LoaderError::DateFormat(format!(
            "record too short for extract date at columns {}..={}",
            range.start, range.end
        ))
    })?;
    parse_extract_date(raw)
}

/// Checks a first-record extract date against the expected one.
///
/// # Errors
/// Returns [`LoaderError::DateMismatch`] naming the entity with observed and
/// expected values.
pub fn validate_extract_date(entity: &str, observed: Date, expected: Date) -> Result<(), LoaderError> {
    if observed == expected {
        return Ok(());
    }
    Err(LoaderError::DateMismatch(format!(
        "entity {entity} extract date {} does not match expected {}",
        format_slash_date(observed),
        format_slash_date(expected)
    )))
}
