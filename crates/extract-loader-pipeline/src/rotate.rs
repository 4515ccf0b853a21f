//! Clears the previous run's artifacts out of the working directory.
//!
//! `<code>.dat` is deleted; `<code>.bad`, `<code>.out` and `load<code>.log`
//! move into the backup directory with the run weekday appended
//! (`ACCT.out.Tue`), replacing the generation from a week earlier. Nothing
//! here is fatal.

use std::fs;
use std::io;
use std::path::Path;

use extract_loader_core::entity::EntityDescriptor;
use tracing::{debug, info, warn};

use crate::context::RunContext;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub deleted: Vec<String>,
    pub archived: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

impl RotationReport {
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

pub fn rotate_artifacts(ctx: &RunContext, descriptors: &[EntityDescriptor]) -> RotationReport {
    let mut report = RotationReport::default();

    if let Err(err) = fs::create_dir_all(&ctx.paths.backup_dir) {
        warn!(
            path = %ctx.paths.backup_dir.display(),
            error = %err,
            "backup directory unavailable"
        );
    }

    for descriptor in descriptors {
        let data_file = descriptor.data_file();
        match fs::remove_file(ctx.work_file(&data_file)) {
            Ok(()) => report.deleted.push(data_file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(file = %data_file, "no previous data file");
                report.missing.push(data_file);
            }
            Err(err) => {
                warn!(file = %data_file, error = %err, "failed to delete previous data file");
                report.failed.push(data_file);
            }
        }

        for name in descriptor.archived_files() {
            let source = ctx.work_file(&name);
            if !source.exists() {
                debug!(file = %name, "nothing to archive");
                report.missing.push(name);
                continue;
            }

            match move_replacing(&source, &ctx.backup_file(&name)) {
                Ok(()) => report.archived.push(name),
                Err(err) => {
                    warn!(file = %name, error = %err, "failed to archive artifact");
                    report.failed.push(name);
                }
            }
        }
    }

    info!(
        deleted = report.deleted.len(),
        archived = report.archived.len(),
        missing = report.missing.len(),
        failed = report.failed.len(),
        suffix = ctx.weekday.abbreviation(),
        "previous artifacts rotated"
    );
    report
}

fn move_replacing(source: &Path, target: &Path) -> io::Result<()> {
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    if fs::rename(source, target).is_ok() {
        return Ok(());
    }

    // rename cannot cross filesystems
    fs::copy(source, target)?;
    fs::remove_file(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunPaths;
    use extract_loader_core::entity::{ColumnLayout, ColumnRange, ColumnSpec, FieldKind};
    use extract_loader_core::schedule::SchedulePolicy;
    use extract_loader_core::ProcessorKind;
    use std::path::PathBuf;
    use time::macros::date;
    use ulid::Ulid;

    fn descriptor(code: &str) -> EntityDescriptor {
        let layout = match ColumnLayout::new(vec![ColumnSpec {
            name: "extract_dt".to_string(),
            start: 1,
            end: 8,
            kind: FieldKind::Date,
        }]) {
            Ok(value) => value,
            Err(err) => panic!("invalid fixture layout: {err}"),
        };
        EntityDescriptor {
            code: code.to_string(),
            drop_file: code.to_string(),
            staging_table: format!("stg_{}", code.to_ascii_lowercase()),
            processor: ProcessorKind::Table,
            layout,
            extract_date: ColumnRange { start: 1, end: 8 },
            transforms: Vec::new(),
        }
    }

    fn fixture_context(root: &Path) -> RunContext {
        RunContext::build(
            Ulid::new(),
            date!(2026 - 02 - 10),
            &SchedulePolicy::default(),
            &[],
            RunPaths {
                drop_dir: root.join("drop"),
                work_dir: root.join("work"),
                backup_dir: root.join("backup"),
                run_log: root.join("work").join("run.log"),
            },
            "batch01",
        )
    }

    fn write(path: PathBuf, content: &str) {
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                panic!("failed to create {}: {err}", parent.display());
            }
        }
        if let Err(err) = fs::write(&path, content) {
            panic!("failed to write {}: {err}", path.display());
        }
    }

    fn read(path: PathBuf) -> String {
        match fs::read_to_string(&path) {
            Ok(value) => value,
            Err(err) => panic!("failed to read {}: {err}", path.display()),
        }
    }

    #[test]
    fn artifacts_move_to_weekday_backups_and_data_is_deleted() {
        let root = std::env::temp_dir().join(format!("extract-loader-rotate-{}", Ulid::new()));
        let ctx = fixture_context(&root);
        write(ctx.work_file("ACCT.dat"), "old data");
        write(ctx.work_file("ACCT.out"), "new narrative");
        write(ctx.work_file("loadACCT.log"), "load log");
        write(ctx.backup_file("ACCT.out"), "last week");

        let report = rotate_artifacts(&ctx, &[descriptor("ACCT")]);

        assert_eq!(report.deleted, vec!["ACCT.dat".to_string()]);
        assert_eq!(
            report.archived,
            vec!["ACCT.out".to_string(), "loadACCT.log".to_string()]
        );
        assert_eq!(report.missing, vec!["ACCT.bad".to_string()]);
        assert_eq!(report.failure_count(), 0);
        assert!(!ctx.work_file("ACCT.dat").exists());
        assert!(!ctx.work_file("ACCT.out").exists());
        assert_eq!(read(root.join("backup").join("ACCT.out.Tue")), "new narrative");
        assert_eq!(read(root.join("backup").join("loadACCT.log.Tue")), "load log");
    }

    #[test]
    fn empty_working_directory_is_not_an_error() {
        let root = std::env::temp_dir().join(format!("extract-loader-rotate-{}", Ulid::new()));
        let ctx = fixture_context(&root);

        let report = rotate_artifacts(&ctx, &[descriptor("ACCT"), descriptor("LOAN")]);
        assert!(report.deleted.is_empty());
        assert!(report.archived.is_empty());
        assert_eq!(report.missing.len(), 8);
        assert_eq!(report.failure_count(), 0);
    }
}
