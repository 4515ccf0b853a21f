//! Deployment configuration, read from YAML.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::entity::{
    ensure_identifier, ColumnLayout, ColumnRange, ColumnSpec, EntityDescriptor, FieldKind,
    ProcessorKind, TransformStep,
};
use crate::reconcile::{parse_extract_date, WEEKLY_COMPANION_GAP_DAYS};
use crate::schedule::SchedulePolicy;
use crate::{DayOfWeek, LoaderError};

const DEFAULT_RUN_LOG: &str = "extract_loader.log";
const DEFAULT_DATABASE: &str = "extract_loader.sqlite3";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub schedule: SchedulePolicy,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub weekly_check: Option<WeeklyCheckConfig>,
    #[serde(default)]
    pub holidays: Vec<HolidayEntry>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub operations: BTreeMap<String, String>,
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub drop_dir: PathBuf,
    pub work_dir: PathBuf,
    pub backup_dir: PathBuf,
    #[serde(default)]
    pub run_log: Option<PathBuf>,
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl PathsConfig {
    #[must_use]
    pub fn run_log_path(&self) -> PathBuf {
        self.run_log
            .clone()
            .unwrap_or_else(|| self.work_dir.join(DEFAULT_RUN_LOG))
    }

    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.work_dir.join(DEFAULT_DATABASE))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Absent means wait indefinitely.
    #[serde(default)]
    pub max_wait_minutes: Option<u64>,
    /// File name in the working directory whose presence aborts the wait.
    #[serde(default)]
    pub abort_file: Option<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_minutes: None,
            abort_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoadConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// `YYYYMMDD` substituted for all-zero date fields.
    #[serde(default = "default_sentinel_date")]
    pub sentinel_date: String,
    /// Host name written to the ledger; defaults to the environment.
    #[serde(default)]
    pub host: Option<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            sentinel_date: default_sentinel_date(),
            host: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WeeklyCheckConfig {
    pub daily_entity: String,
    pub weekly_entity: String,
    #[serde(default = "default_weekly_gap")]
    pub gap_days: i64,
    /// Weekdays on which the check runs; empty means every run.
    #[serde(default)]
    pub on_weekdays: Vec<DayOfWeek>,
}

impl WeeklyCheckConfig {
    #[must_use]
    pub fn applies_on(&self, weekday: DayOfWeek) -> bool {
        self.on_weekdays.is_empty() || self.on_weekdays.contains(&weekday)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HolidayEntry {
    /// `MM/DD/YYYY` or `YYYYMMDD`.
    pub date: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_notify_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub code: String,
    #[serde(default)]
    pub drop_file: Option<String>,
    pub staging_table: String,
    #[serde(default)]
    pub processor: ProcessorKind,
    pub extract_date: ColumnRange,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub transforms: Vec<TransformStep>,
}

impl LoaderConfig {
    /// Reads and validates a YAML configuration file.
    ///
    /// # Errors
    /// Returns [`LoaderError::Configuration`] when the file cannot be read,
    /// parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, LoaderError> {
        let content = fs::read_to_string(path).map_err(|err| {
            LoaderError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Parses and validates YAML configuration text.
    ///
    /// # Errors
    /// Returns [`LoaderError::Configuration`] for malformed YAML, unknown
    /// keys, or values that fail validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, LoaderError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|err| LoaderError::Configuration(format!("invalid loader YAML: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field invariants.
    ///
    /// # Errors
    /// Returns [`LoaderError::Configuration`] describing the first violation.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.entities.is_empty() {
            return Err(LoaderError::Configuration(
                "at least one entity MUST be configured".to_string(),
            ));
        }

        if self.watcher.poll_interval_secs == 0 {
            return Err(LoaderError::Configuration(
                "watcher.poll_interval_secs MUST be >= 1".to_string(),
            ));
        }

        if self.load.batch_size == 0 {
            return Err(LoaderError::Configuration(
                "load.batch_size MUST be >= 1".to_string(),
            ));
        }

        if let Some(abort_file) = &self.watcher.abort_file {
            if abort_file.trim().is_empty() || abort_file.contains(['/', '\\']) {
                return Err(LoaderError::Configuration(
                    "watcher.abort_file MUST be a bare file name".to_string(),
                ));
            }
        }

        self.sentinel_date()?;
        self.holiday_dates()?;

        for (name, sql) in &self.operations {
            ensure_identifier("operation name", name)?;
            if sql.trim().is_empty() {
                return Err(LoaderError::Configuration(format!(
                    "operation {name} has empty SQL"
                )));
            }
        }

        let mut codes = BTreeSet::new();
        for entity in &self.entities {
            self.validate_entity(entity)?;
            if !codes.insert(entity.code.as_str()) {
                return Err(LoaderError::Configuration(format!(
                    "duplicate entity code: {}",
                    entity.code
                )));
            }
        }

        if let Some(weekly) = &self.weekly_check {
            ensure_identifier("weekly_check.weekly_entity", &weekly.weekly_entity)?;
            let daily = self
                .entities
                .iter()
                .find(|entity| entity.code == weekly.daily_entity)
                .ok_or_else(|| {
                    LoaderError::Configuration(format!(
                        "weekly_check.daily_entity {} is not a configured entity",
                        weekly.daily_entity
                    ))
                })?;
            if daily.processor == ProcessorKind::Pending {
                return Err(LoaderError::Configuration(format!(
                    "weekly_check.daily_entity {} has a pending processor; its file is never copied",
                    weekly.daily_entity
                )));
            }
            if weekly.gap_days < 0 {
                return Err(LoaderError::Configuration(
                    "weekly_check.gap_days MUST be >= 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn validate_entity(&self, entity: &EntityConfig) -> Result<(), LoaderError> {
        ensure_identifier("entity code", &entity.code)?;
        ensure_identifier("staging_table", &entity.staging_table)?;
        if let Some(drop_file) = &entity.drop_file {
            if drop_file.trim().is_empty() || drop_file.contains(['/', '\\']) {
                return Err(LoaderError::Configuration(format!(
                    "entity {} drop_file MUST be a bare file name",
                    entity.code
                )));
            }
        }

        let range = entity.extract_date;
        if range.start == 0 || range.end < range.start || range.end + 1 - range.start != 8 {
            return Err(LoaderError::Configuration(format!(
                "entity {} extract_date MUST span exactly 8 columns",
                entity.code
            )));
        }

        ColumnLayout::new(entity.columns.clone()).map_err(|err| match err {
            LoaderError::Configuration(message) => {
                LoaderError::Configuration(format!("entity {}: {message}", entity.code))
            }
            other => other,
        })?;

        let covered = entity.columns.iter().any(|column| {
            column.kind == FieldKind::Date && column.start <= range.start && range.end <= column.end
        });
        if !covered {
            return Err(LoaderError::Configuration(format!(
                "entity {} extract_date {}..={} MUST lie inside a date column",
                entity.code, range.start, range.end
            )));
        }

        for step in &entity.transforms {
            if !self.operations.contains_key(&step.operation) {
                return Err(LoaderError::Configuration(format!(
                    "entity {} references unknown operation {}",
                    entity.code, step.operation
                )));
            }
        }

        Ok(())
    }

    /// # Errors
    /// Returns [`LoaderError::Configuration`] when `load.sentinel_date` is
    /// not a `YYYYMMDD` date.
    pub fn sentinel_date(&self) -> Result<Date, LoaderError> {
        if self.load.sentinel_date.len() != 8 {
            return Err(LoaderError::Configuration(format!(
                "load.sentinel_date MUST be YYYYMMDD, got {:?}",
                self.load.sentinel_date
            )));
        }
        parse_extract_date(&self.load.sentinel_date)
            .map_err(|err| LoaderError::Configuration(format!("load.sentinel_date: {err}")))
    }

    /// Holiday calendar entries as dates.
    ///
    /// # Errors
    /// Returns [`LoaderError::Configuration`] for an unparsable entry.
    pub fn holiday_dates(&self) -> Result<Vec<(Date, Option<String>)>, LoaderError> {
        self.holidays
            .iter()
            .map(|entry| {
                parse_extract_date(&entry.date)
                    .map(|date| (date, entry.description.clone()))
                    .map_err(|err| LoaderError::Configuration(format!("holidays: {err}")))
            })
            .collect()
    }

    /// Entity descriptors in processing order.
    ///
    /// # Errors
    /// Returns [`LoaderError::Configuration`] when a layout is invalid.
    pub fn descriptors(&self) -> Result<Vec<EntityDescriptor>, LoaderError> {
        let sentinel = self.sentinel_date()?;
        self.entities
            .iter()
            .map(|entity| {
                Ok(EntityDescriptor {
                    code: entity.code.clone(),
                    drop_file: entity
                        .drop_file
                        .clone()
                        .unwrap_or_else(|| entity.code.clone()),
                    staging_table: entity.staging_table.clone(),
                    processor: entity.processor,
                    layout: ColumnLayout::new(entity.columns.clone())?.with_sentinel_date(sentinel),
                    extract_date: entity.extract_date,
                    transforms: entity.transforms.clone(),
                })
            })
            .collect()
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_batch_size() -> usize {
    1_000
}

fn default_sentinel_date() -> String {
    "00010101".to_string()
}

fn default_weekly_gap() -> i64 {
    WEEKLY_COMPANION_GAP_DAYS
}

fn default_notify_timeout_ms() -> u64 {
    5_000
}
