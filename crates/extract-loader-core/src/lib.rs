//! Core types for the daily extract loader: the fixed-width decoder, the
//! extraction schedule, extract-date reconciliation, entity descriptors,
//! deployment configuration and the collaborator traits the pipeline is
//! wired against.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset, Weekday};

pub mod config;
pub mod decoder;
pub mod entity;
pub mod reconcile;
pub mod schedule;
pub mod store;

pub use config::LoaderConfig;
pub use decoder::{decode, encode, DecodeWarning, DecodedRecord, FieldValue};
pub use entity::{ColumnLayout, ColumnRange, ColumnSpec, EntityDescriptor, FieldKind};
pub use entity::{ProcessorKind, TransformStep};
pub use reconcile::{parse_extract_date, reconcile, to_ordinal, Reconciliation};
pub use schedule::SchedulePolicy;

/// Serde adapter storing [`Date`] values as `YYYY-MM-DD` text.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    #[allow(clippy::missing_errors_doc)]
    pub fn serialize<S: Serializer>(value: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_iso_date(*value))
    }

    #[allow(clippy::missing_errors_doc)]
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_iso_date(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum LoaderError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("date format error: {0}")]
    DateFormat(String),
    #[error("date mismatch: {0}")]
    DateMismatch(String),
}

impl LoaderError {
    /// The message without its category prefix.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::Configuration(message)
            | Self::DateFormat(message)
            | Self::DateMismatch(message) => message,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    #[must_use]
    pub fn of(date: Date) -> Self {
        Self::from(date.weekday())
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    /// Three-letter suffix used for weekday backup generations.
    #[must_use]
    pub fn abbreviation(self) -> &'static str {
        match self {
            Self::Monday => "Mon",
            Self::Tuesday => "Tue",
            Self::Wednesday => "Wed",
            Self::Thursday => "Thu",
            Self::Friday => "Fri",
            Self::Saturday => "Sat",
            Self::Sunday => "Sun",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "monday" | "mon" => Some(Self::Monday),
            "tuesday" | "tue" => Some(Self::Tuesday),
            "wednesday" | "wed" => Some(Self::Wednesday),
            "thursday" | "thu" => Some(Self::Thursday),
            "friday" | "fri" => Some(Self::Friday),
            "saturday" | "sat" => Some(Self::Saturday),
            "sunday" | "sun" => Some(Self::Sunday),
            _ => None,
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(value: Weekday) -> Self {
        match value {
            Weekday::Monday => Self::Monday,
            Weekday::Tuesday => Self::Tuesday,
            Weekday::Wednesday => Self::Wednesday,
            Weekday::Thursday => Self::Thursday,
            Weekday::Friday => Self::Friday,
            Weekday::Saturday => Self::Saturday,
            Weekday::Sunday => Self::Sunday,
        }
    }
}

impl Display for DayOfWeek {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage at which a run stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    FileArrival,
    CopyVerification,
    WeeklyCrossCheck,
    DateValidation,
    StageLoad,
    BadRecords,
    TransformSql,
    RecordAudit,
    ErrorScan,
}

impl FailureStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileArrival => "file_arrival",
            Self::CopyVerification => "copy_verification",
            Self::WeeklyCrossCheck => "weekly_cross_check",
            Self::DateValidation => "date_validation",
            Self::StageLoad => "stage_load",
            Self::BadRecords => "bad_records",
            Self::TransformSql => "transform_sql",
            Self::RecordAudit => "record_audit",
            Self::ErrorScan => "error_scan",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "file_arrival" => Some(Self::FileArrival),
            "copy_verification" => Some(Self::CopyVerification),
            "weekly_cross_check" => Some(Self::WeeklyCrossCheck),
            "date_validation" => Some(Self::DateValidation),
            "stage_load" => Some(Self::StageLoad),
            "bad_records" => Some(Self::BadRecords),
            "transform_sql" => Some(Self::TransformSql),
            "record_audit" => Some(Self::RecordAudit),
            "error_scan" => Some(Self::ErrorScan),
            _ => None,
        }
    }
}

impl Display for FailureStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RunFailure {
    pub stage: FailureStage,
    pub entity: Option<String>,
    pub reason: String,
}

impl RunFailure {
    #[must_use]
    pub fn new(stage: FailureStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            entity: None,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn for_entity(stage: FailureStage, entity: &str, reason: impl Into<String>) -> Self {
        Self {
            stage,
            entity: Some(entity.to_string()),
            reason: reason.into(),
        }
    }
}

impl Display for RunFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "[{}] entity {entity}: {}", self.stage, self.reason),
            None => write!(f, "[{}] {}", self.stage, self.reason),
        }
    }
}

/// Terminal state of one run. Created once, at the end of processing.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RunOutcome {
    Success { entities_loaded: usize },
    SkippedHoliday { holiday: Date },
    SkippedNoRunDay { weekday: DayOfWeek },
    Failed(RunFailure),
}

impl RunOutcome {
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::SkippedHoliday { .. } => "skipped_holiday",
            Self::SkippedNoRunDay { .. } => "skipped_no_run_day",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Process exit code: skips are successful runs.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.is_failure())
    }

    #[must_use]
    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl Display for RunOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { entities_loaded } => {
                write!(f, "SUCCESS ({entities_loaded} entities loaded)")
            }
            Self::SkippedHoliday { holiday } => {
                write!(f, "SKIPPED_HOLIDAY (holiday {})", format_slash_date(*holiday))
            }
            Self::SkippedNoRunDay { weekday } => write!(f, "SKIPPED_NO_RUN_DAY ({weekday})"),
            Self::Failed(failure) => write!(f, "FAILED {failure}"),
        }
    }
}

/// Parses a run date given as `MM/DD/YYYY`.
///
/// # Errors
/// Returns [`LoaderError::DateFormat`] for any other shape or an invalid
/// calendar date.
pub fn parse_run_date(value: &str) -> Result<Date, LoaderError> {
    if value.len() != 10 {
        return Err(LoaderError::DateFormat(format!(
            "run date MUST be MM/DD/YYYY, got {value:?}"
        )));
    }
    Date::parse(value, format_description!("[month]/[day]/[year]"))
        .map_err(|err| LoaderError::DateFormat(format!("invalid run date {value:?}: {err}")))
}

#[must_use]
pub fn format_slash_date(value: Date) -> String {
    format!(
        "{:02}/{:02}/{:04}",
        u8::from(value.month()),
        value.day(),
        value.year()
    )
}

#[must_use]
pub fn format_compact_date(value: Date) -> String {
    format!(
        "{:04}{:02}{:02}",
        value.year(),
        u8::from(value.month()),
        value.day()
    )
}

#[must_use]
pub fn format_iso_date(value: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        value.year(),
        u8::from(value.month()),
        value.day()
    )
}

/// Parses a stored `YYYY-MM-DD` date.
///
/// # Errors
/// Returns [`LoaderError::DateFormat`] when the value is not an ISO date.
pub fn parse_iso_date(value: &str) -> Result<Date, LoaderError> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|err| LoaderError::DateFormat(format!("invalid ISO date {value:?}: {err}")))
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`LoaderError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, LoaderError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| LoaderError::Validation(format!("failed to format RFC3339 timestamp: {err}")))
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

/// Today's date in the host's local offset, falling back to UTC when the
/// offset cannot be determined.
#[must_use]
pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| now_utc())
        .date()
}
