//! Collaborator seams the pipeline is wired against.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use ulid::Ulid;

use crate::decoder::DecodedRecord;
use crate::entity::EntityDescriptor;
use crate::RunOutcome;

/// Named parameters handed to a transform operation.
pub type TransformParams = BTreeMap<String, String>;

pub trait HolidayCalendar {
    /// Returns the holiday date when the day before `date` was a holiday.
    #[allow(clippy::missing_errors_doc)]
    fn holiday_for(&self, date: Date) -> Result<Option<Date>>;
}

pub trait TransformExecutor {
    /// Executes a named, parametrized operation and returns rows affected.
    #[allow(clippy::missing_errors_doc)]
    fn run_transform(&mut self, operation: &str, params: &TransformParams) -> Result<usize>;
}

pub trait Notifier {
    #[allow(clippy::missing_errors_doc)]
    fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

pub trait LoaderStore {
    /// Empties (creating if needed) the entity's staging table.
    #[allow(clippy::missing_errors_doc)]
    fn truncate_staging(&mut self, descriptor: &EntityDescriptor) -> Result<()>;

    /// Inserts one batch and commits it.
    #[allow(clippy::missing_errors_doc)]
    fn insert_staging_batch(
        &mut self,
        descriptor: &EntityDescriptor,
        records: &[DecodedRecord],
    ) -> Result<usize>;

    /// Maximum extract date ever recorded for `entity_code`.
    #[allow(clippy::missing_errors_doc)]
    fn latest_extract_date(&self, entity_code: &str) -> Result<Option<Date>>;

    #[allow(clippy::missing_errors_doc)]
    fn append_extract_date(&mut self, input: &ExtractDateInput) -> Result<ExtractDateRecord>;

    #[allow(clippy::missing_errors_doc)]
    fn record_holiday_skip(&mut self, run_date: Date, holiday: Date, host: &str) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn record_run_outcome(&mut self, audit: &RunAudit<'_>) -> Result<()>;
}

/// Everything an entity processor writes through.
pub trait EntityStore: LoaderStore + TransformExecutor {}

impl<T: LoaderStore + TransformExecutor> EntityStore for T {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractDateInput {
    pub entity_code: String,
    pub extract_date: Date,
    pub host: String,
    pub row_count: u64,
}

/// One row of the append-only extract-date ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractDateRecord {
    pub ledger_seq: i64,
    pub entity_code: String,
    #[serde(with = "crate::iso_date")]
    pub extract_date: Date,
    pub loaded_at: String,
    pub host: String,
    pub row_count: u64,
}

#[derive(Debug, Clone)]
pub struct RunAudit<'a> {
    pub run_id: Ulid,
    pub run_date: Date,
    pub host: &'a str,
    pub started_at: OffsetDateTime,
    pub outcome: &'a RunOutcome,
}
