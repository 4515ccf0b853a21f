//! Waits for the upstream feed to drop every required extract, then copies
//! each into the working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use extract_loader_core::config::WatcherConfig;
use extract_loader_core::entity::EntityDescriptor;
use extract_loader_core::FailureStage;
use tracing::{info, warn};

use crate::context::{file_name, RunContext};
use crate::runlog::NarrativeLog;

/// Shared flag that wakes a sleeping watcher as soon as it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for up to `timeout`; returns `true` when cancelled.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);

        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = signal
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("wait for {entity} drop file cancelled")]
    Cancelled { entity: String },
    #[error("wait for {entity} drop file aborted by {}", .abort_file.display())]
    Aborted { entity: String, abort_file: PathBuf },
    #[error("drop file for {entity} missing after {waited_secs}s")]
    TimedOut { entity: String, waited_secs: u64 },
    #[error("failed to copy {entity} drop file: {reason}")]
    CopyFailed { entity: String, reason: String },
    #[error("working copy {} for {entity} is empty", .path.display())]
    EmptyCopy { entity: String, path: PathBuf },
}

impl WatchError {
    #[must_use]
    pub fn entity(&self) -> &str {
        match self {
            Self::Cancelled { entity }
            | Self::Aborted { entity, .. }
            | Self::TimedOut { entity, .. }
            | Self::CopyFailed { entity, .. }
            | Self::EmptyCopy { entity, .. } => entity,
        }
    }

    #[must_use]
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Cancelled { .. } | Self::Aborted { .. } | Self::TimedOut { .. } => {
                FailureStage::FileArrival
            }
            Self::CopyFailed { .. } | Self::EmptyCopy { .. } => FailureStage::CopyVerification,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    pub poll_interval: Duration,
    /// `None` waits indefinitely.
    pub max_wait: Option<Duration>,
    pub abort_file: Option<PathBuf>,
}

impl WatcherSettings {
    #[must_use]
    pub fn from_config(config: &WatcherConfig, work_dir: &Path) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_wait: config
                .max_wait_minutes
                .map(|minutes| Duration::from_secs(minutes.saturating_mul(60))),
            abort_file: config.abort_file.as_ref().map(|name| work_dir.join(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivedFile {
    pub entity: String,
    pub source: PathBuf,
    pub working: PathBuf,
    pub bytes: u64,
}

pub struct FileArrivalWatcher {
    settings: WatcherSettings,
    cancel: CancelToken,
}

impl FileArrivalWatcher {
    #[must_use]
    pub fn new(settings: WatcherSettings, cancel: CancelToken) -> Self {
        Self { settings, cancel }
    }

    /// Blocks until every descriptor's drop file exists, then copies each to
    /// `<work>/<code>.dat`. Entities are handled in order; the wait budget
    /// covers the whole call.
    pub fn await_all(
        &self,
        ctx: &RunContext,
        descriptors: &[EntityDescriptor],
        run_log: &mut NarrativeLog,
    ) -> Result<Vec<ArrivedFile>, WatchError> {
        let started = Instant::now();
        let mut arrived = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let source = ctx.drop_file(descriptor);
            self.wait_for(&descriptor.code, &source, started, run_log)?;
            let file = copy_to_work(ctx, descriptor, &source)?;
            run_log.line(&format!(
                "{} copied to {} ({} bytes)",
                file_name(&file.source),
                file_name(&file.working),
                file.bytes
            ));
            info!(entity = %descriptor.code, bytes = file.bytes, "drop file copied");
            arrived.push(file);
        }

        Ok(arrived)
    }

    fn wait_for(
        &self,
        entity: &str,
        source: &Path,
        started: Instant,
        run_log: &mut NarrativeLog,
    ) -> Result<(), WatchError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(WatchError::Cancelled {
                    entity: entity.to_string(),
                });
            }
            if let Some(abort_file) = self.settings.abort_file.as_ref().filter(|path| path.exists()) {
                return Err(WatchError::Aborted {
                    entity: entity.to_string(),
                    abort_file: abort_file.clone(),
                });
            }
            if source.is_file() {
                return Ok(());
            }

            let mut sleep = self.settings.poll_interval;
            if let Some(max_wait) = self.settings.max_wait {
                let elapsed = started.elapsed();
                if elapsed >= max_wait {
                    return Err(WatchError::TimedOut {
                        entity: entity.to_string(),
                        waited_secs: elapsed.as_secs(),
                    });
                }
                sleep = sleep.min(max_wait - elapsed);
            }

            warn!(
                entity,
                path = %source.display(),
                retry_secs = sleep.as_secs(),
                "drop file not yet available"
            );
            run_log.warning(&format!(
                "{} not yet available; checking again in {}s",
                file_name(source),
                sleep.as_secs()
            ));

            if self.cancel.wait(sleep) {
                return Err(WatchError::Cancelled {
                    entity: entity.to_string(),
                });
            }
        }
    }
}

fn copy_to_work(
    ctx: &RunContext,
    descriptor: &EntityDescriptor,
    source: &Path,
) -> Result<ArrivedFile, WatchError> {
    let working = ctx.data_file(descriptor);
    let copy_failed = |reason: String| WatchError::CopyFailed {
        entity: descriptor.code.clone(),
        reason,
    };

    fs::create_dir_all(&ctx.paths.work_dir)
        .map_err(|err| copy_failed(format!("{}: {err}", ctx.paths.work_dir.display())))?;
    fs::copy(source, &working).map_err(|err| copy_failed(err.to_string()))?;

    let bytes = fs::metadata(&working)
        .map_err(|err| copy_failed(format!("{} not readable: {err}", working.display())))?
        .len();
    if bytes == 0 {
        return Err(WatchError::EmptyCopy {
            entity: descriptor.code.clone(),
            path: working,
        });
    }

    Ok(ArrivedFile {
        entity: descriptor.code.clone(),
        source: source.to_path_buf(),
        working,
        bytes,
    })
}
