use std::path::{Path, PathBuf};

use extract_loader_core::config::PathsConfig;
use extract_loader_core::entity::EntityDescriptor;
use extract_loader_core::schedule::SchedulePolicy;
use extract_loader_core::{now_utc, DayOfWeek};
use time::{Date, OffsetDateTime};
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub drop_dir: PathBuf,
    pub work_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub run_log: PathBuf,
}

impl RunPaths {
    #[must_use]
    pub fn from_config(paths: &PathsConfig) -> Self {
        Self {
            drop_dir: paths.drop_dir.clone(),
            work_dir: paths.work_dir.clone(),
            backup_dir: paths.backup_dir.clone(),
            run_log: paths.run_log_path(),
        }
    }
}

/// Everything a stage needs to know about the current run. Built once after
/// the schedule gates pass and shared by reference afterwards.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Ulid,
    pub run_date: Date,
    pub weekday: DayOfWeek,
    pub offset_days: i64,
    pub entity_codes: Vec<String>,
    pub paths: RunPaths,
    pub host: String,
    pub started_at: OffsetDateTime,
}

impl RunContext {
    #[must_use]
    pub fn build(
        run_id: Ulid,
        run_date: Date,
        policy: &SchedulePolicy,
        descriptors: &[EntityDescriptor],
        paths: RunPaths,
        host: &str,
    ) -> Self {
        let weekday = DayOfWeek::of(run_date);
        Self {
            run_id,
            run_date,
            weekday,
            offset_days: policy.compute_offset(weekday),
            entity_codes: descriptors
                .iter()
                .map(|descriptor| descriptor.code.clone())
                .collect(),
            paths,
            host: host.to_string(),
            started_at: now_utc(),
        }
    }

    #[must_use]
    pub fn work_file(&self, name: &str) -> PathBuf {
        self.paths.work_dir.join(name)
    }

    #[must_use]
    pub fn drop_file(&self, descriptor: &EntityDescriptor) -> PathBuf {
        self.paths.drop_dir.join(&descriptor.drop_file)
    }

    /// Backup location for `name`, suffixed with the run's weekday.
    #[must_use]
    pub fn backup_file(&self, name: &str) -> PathBuf {
        self.paths
            .backup_dir
            .join(format!("{name}.{}", self.weekday.abbreviation()))
    }

    #[must_use]
    pub fn data_file(&self, descriptor: &EntityDescriptor) -> PathBuf {
        self.work_file(&descriptor.data_file())
    }
}

/// Host recorded in the ledger: configuration first, then the environment.
#[must_use]
pub fn resolve_host(configured: Option<&str>) -> String {
    if let Some(host) = configured.map(str::trim).filter(|host| !host.is_empty()) {
        return host.to_string();
    }

    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|key| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}
