//! Plain-text narrative logs read by operators: the run log and each entity's
//! `<code>.out`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;

use extract_loader_core::now_utc;

/// Timestamped line writer. Write failures are reported through `tracing`
/// and never interrupt the run.
#[derive(Debug)]
pub struct NarrativeLog {
    path: PathBuf,
    file: File,
}

impl NarrativeLog {
    /// Opens `path` for appending, creating parent directories.
    pub fn append(path: &Path) -> Result<Self> {
        Self::open(path, false)
    }

    /// Opens `path` empty, discarding any previous content.
    pub fn truncate(path: &Path) -> Result<Self> {
        Self::open(path, true)
    }

    fn open(path: &Path, truncate: bool) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if truncate {
            File::create(path)
                .with_context(|| format!("failed to truncate log {}", path.display()))?;
        }

        // Always append: transforms may spool into the same file.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, message: &str) {
        let stamped = format!("{} {message}\n", timestamp(local_now()));
        if let Err(err) = self.file.write_all(stamped.as_bytes()) {
            warn!(path = %self.path.display(), error = %err, "narrative log write failed");
        }
    }

    pub fn warning(&mut self, message: &str) {
        self.line(&format!("WARNING: {message}"));
    }

    /// Terminal line written before a run or entity stops.
    pub fn fatal(&mut self, reason: &str) {
        self.line(&format!("ERROR: {reason} EXITING"));
    }
}

fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| now_utc())
}

fn timestamp(value: OffsetDateTime) -> String {
    value
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default()
}
