use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use extract_loader_core::config::{LoaderConfig, WeeklyCheckConfig};
use extract_loader_core::entity::{ColumnRange, EntityDescriptor};
use extract_loader_core::reconcile::{
    expected_extract_date, read_extract_date, reconcile, validate_extract_date,
};
use extract_loader_core::schedule::SchedulePolicy;
use extract_loader_core::store::{EntityStore, HolidayCalendar, Notifier, RunAudit};
use extract_loader_core::{
    format_slash_date, now_utc, DayOfWeek, FailureStage, RunFailure, RunOutcome,
};
use time::{Date, OffsetDateTime};
use tracing::{error, info, warn};
use ulid::Ulid;

use crate::context::{file_name, resolve_host, RunContext, RunPaths};
use crate::processor::ProcessorRegistry;
use crate::rotate::rotate_artifacts;
use crate::runlog::NarrativeLog;
use crate::scanner::scan_output_log;
use crate::watcher::{CancelToken, FileArrivalWatcher, WatchError, WatcherSettings};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub schedule: SchedulePolicy,
    pub weekly_check: Option<WeeklyCheckConfig>,
    pub paths: RunPaths,
    pub watcher: WatcherSettings,
    pub host: String,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &LoaderConfig) -> Self {
        let paths = RunPaths::from_config(&config.paths);
        Self {
            schedule: config.schedule.clone(),
            weekly_check: config.weekly_check.clone(),
            watcher: WatcherSettings::from_config(&config.watcher, &paths.work_dir),
            paths,
            host: resolve_host(config.load.host.as_deref()),
        }
    }
}

/// One invocation of the daily load.
pub struct Pipeline<'a> {
    settings: &'a PipelineSettings,
    descriptors: &'a [EntityDescriptor],
    registry: &'a ProcessorRegistry,
    notifier: &'a dyn Notifier,
    cancel: CancelToken,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(
        settings: &'a PipelineSettings,
        descriptors: &'a [EntityDescriptor],
        registry: &'a ProcessorRegistry,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            settings,
            descriptors,
            registry,
            notifier,
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the whole pipeline for `run_date` and returns its outcome.
    ///
    /// # Errors
    /// Returns an error only when the run log cannot be opened or the
    /// schedule gates cannot consult or update the store. Every stage failure
    /// after the gates is reported as [`RunOutcome::Failed`].
    pub fn run<S>(&self, run_date: Date, store: &mut S) -> Result<RunOutcome>
    where
        S: EntityStore + HolidayCalendar,
    {
        let run_id = Ulid::new();
        let started_at = now_utc();
        let weekday = DayOfWeek::of(run_date);

        let mut run_log = NarrativeLog::append(&self.settings.paths.run_log)?;
        run_log.line(&format!(
            "run {run_id} started for {} ({weekday})",
            format_slash_date(run_date)
        ));
        info!(%run_id, run_date = %format_slash_date(run_date), %weekday, "run started");

        let outcome = match self.gate(run_date, weekday, &mut *store, &mut run_log) {
            Ok(Some(skipped)) => skipped,
            Ok(None) => self.execute(run_id, run_date, &mut *store, &mut run_log),
            Err(err) => {
                run_log.fatal(&format!("schedule gate failed: {err:#}"));
                return Err(err);
            }
        };

        self.finish(run_id, run_date, started_at, &outcome, store, &mut run_log);
        Ok(outcome)
    }

    fn gate<S>(
        &self,
        run_date: Date,
        weekday: DayOfWeek,
        store: &mut S,
        run_log: &mut NarrativeLog,
    ) -> Result<Option<RunOutcome>>
    where
        S: EntityStore + HolidayCalendar,
    {
        let schedule = &self.settings.schedule;
        if schedule.is_no_run_day(weekday) {
            run_log.line(&format!("{weekday} is not a run day; nothing to load"));
            info!(%weekday, "no-run day");
            return Ok(Some(RunOutcome::SkippedNoRunDay { weekday }));
        }

        if let Some(holiday) = schedule.holiday_gate(&*store, run_date)? {
            store
                .record_holiday_skip(run_date, holiday, &self.settings.host)
                .context("failed to record holiday skip")?;
            run_log.line(&format!(
                "{} was a holiday; no extracts expected",
                format_slash_date(holiday)
            ));
            info!(holiday = %format_slash_date(holiday), "holiday skip");
            return Ok(Some(RunOutcome::SkippedHoliday { holiday }));
        }

        Ok(None)
    }

    fn execute(
        &self,
        run_id: Ulid,
        run_date: Date,
        store: &mut dyn EntityStore,
        run_log: &mut NarrativeLog,
    ) -> RunOutcome {
        let ctx = RunContext::build(
            run_id,
            run_date,
            &self.settings.schedule,
            self.descriptors,
            self.settings.paths.clone(),
            &self.settings.host,
        );
        run_log.line(&format!(
            "offset {} days; entities {}",
            ctx.offset_days,
            ctx.entity_codes.join(", ")
        ));

        let rotation = rotate_artifacts(&ctx, self.descriptors);
        run_log.line(&format!(
            "previous artifacts: {} archived, {} deleted, {} could not be moved",
            rotation.archived.len(),
            rotation.deleted.len(),
            rotation.failure_count()
        ));

        let active = self
            .descriptors
            .iter()
            .filter(|descriptor| self.registry.contains(&descriptor.code))
            .cloned()
            .collect::<Vec<_>>();

        let watcher = FileArrivalWatcher::new(self.settings.watcher.clone(), self.cancel.clone());
        if let Err(err) = watcher.await_all(&ctx, &active, run_log) {
            if matches!(err, WatchError::TimedOut { .. }) {
                self.escalate(&ctx, &err);
            }
            return RunOutcome::Failed(RunFailure::for_entity(
                err.stage(),
                err.entity(),
                err.to_string(),
            ));
        }

        if let Err(failure) = self.weekly_cross_check(&ctx, store, run_log) {
            return RunOutcome::Failed(failure);
        }

        let mut loaded = 0;
        for descriptor in self.descriptors {
            let Some(processor) = self.registry.get(&descriptor.code) else {
                warn!(entity = %descriptor.code, "no processor registered; skipped");
                run_log.warning(&format!(
                    "no processor registered for {}; skipped",
                    descriptor.code
                ));
                continue;
            };

            let expected = match self.validate_entity_date(&ctx, descriptor, store) {
                Ok(value) => value,
                Err(failure) => {
                    append_entity_fatal(&ctx, descriptor, &failure.reason);
                    return RunOutcome::Failed(failure);
                }
            };
            run_log.line(&format!(
                "{} extract date {} validated",
                descriptor.code,
                format_slash_date(expected)
            ));

            let report = processor.process(&ctx, expected, store);
            if !report.success {
                return RunOutcome::Failed(RunFailure::for_entity(
                    report.failure_stage(),
                    &descriptor.code,
                    report
                        .failure
                        .unwrap_or_else(|| "processing did not complete".to_string()),
                ));
            }

            if let Err(failure) = scan_entity_output(descriptor, &report.output_log, run_log) {
                return RunOutcome::Failed(failure);
            }

            run_log.line(&format!(
                "{} loaded: {} rows",
                descriptor.code, report.rows_loaded
            ));
            loaded += 1;
        }

        RunOutcome::Success {
            entities_loaded: loaded,
        }
    }

    fn weekly_cross_check(
        &self,
        ctx: &RunContext,
        store: &dyn EntityStore,
        run_log: &mut NarrativeLog,
    ) -> Result<(), RunFailure> {
        let Some(weekly) = self
            .settings
            .weekly_check
            .as_ref()
            .filter(|weekly| weekly.applies_on(ctx.weekday))
        else {
            return Ok(());
        };

        let failure = |reason: String| {
            RunFailure::for_entity(FailureStage::WeeklyCrossCheck, &weekly.weekly_entity, reason)
        };

        let daily = self
            .descriptors
            .iter()
            .find(|descriptor| descriptor.code == weekly.daily_entity)
            .ok_or_else(|| failure(format!("daily entity {} is not configured", weekly.daily_entity)))?;
        let current = first_record_date(&ctx.data_file(daily), daily.extract_date)
            .map_err(|err| failure(format!("{err:#}")))?;
        let latest_weekly = store
            .latest_extract_date(&weekly.weekly_entity)
            .map_err(|err| failure(format!("{err:#}")))?
            .ok_or_else(|| {
                failure(format!(
                    "no extract date recorded for weekly entity {}",
                    weekly.weekly_entity
                ))
            })?;

        let result = reconcile(current, latest_weekly, weekly.gap_days);
        if !result.matches {
            return Err(failure(format!(
                "{} extract {} is {} days after {} extract {}; expected {}",
                weekly.daily_entity,
                format_slash_date(current),
                result.diff_days,
                weekly.weekly_entity,
                format_slash_date(latest_weekly),
                weekly.gap_days
            )));
        }

        run_log.line(&format!(
            "weekly check passed: {} {} vs {} {}",
            weekly.daily_entity,
            format_slash_date(current),
            weekly.weekly_entity,
            format_slash_date(latest_weekly)
        ));
        Ok(())
    }

    fn validate_entity_date(
        &self,
        ctx: &RunContext,
        descriptor: &EntityDescriptor,
        store: &dyn EntityStore,
    ) -> Result<Date, RunFailure> {
        let failure = |reason: String| {
            RunFailure::for_entity(FailureStage::DateValidation, &descriptor.code, reason)
        };

        let previous = store
            .latest_extract_date(&descriptor.code)
            .map_err(|err| failure(format!("{err:#}")))?
            .ok_or_else(|| {
                failure(format!(
                    "no previous extract date recorded for {}; seed the ledger first",
                    descriptor.code
                ))
            })?;
        let expected = expected_extract_date(previous, ctx.offset_days)
            .map_err(|err| failure(err.detail().to_string()))?;
        let observed = first_record_date(&ctx.data_file(descriptor), descriptor.extract_date)
            .map_err(|err| failure(format!("{err:#}")))?;

        validate_extract_date(&descriptor.code, observed, expected)
            .map_err(|err| failure(err.detail().to_string()))?;
        Ok(expected)
    }

    fn escalate(&self, ctx: &RunContext, err: &WatchError) {
        let subject = format!("extract loader waiting on {}", err.entity());
        let body = format!(
            "run {} for {}: {err}",
            ctx.run_id,
            format_slash_date(ctx.run_date)
        );
        if let Err(notify_err) = self.notifier.notify(&subject, &body) {
            warn!(error = %notify_err, "escalation notification failed");
        }
    }

    fn finish(
        &self,
        run_id: Ulid,
        run_date: Date,
        started_at: OffsetDateTime,
        outcome: &RunOutcome,
        store: &mut dyn EntityStore,
        run_log: &mut NarrativeLog,
    ) {
        match outcome.failure() {
            Some(failure) => {
                run_log.fatal(&failure.to_string());
                error!(%run_id, stage = %failure.stage, entity = ?failure.entity, reason = %failure.reason, "run failed");
            }
            None => {
                run_log.line(&format!("run {run_id} finished: {outcome}"));
                info!(%run_id, status = outcome.status(), "run finished");
            }
        }

        let audit = RunAudit {
            run_id,
            run_date,
            host: &self.settings.host,
            started_at,
            outcome,
        };
        if let Err(err) = store.record_run_outcome(&audit) {
            warn!(%run_id, error = %err, "run audit not recorded");
            run_log.warning(&format!("run audit not recorded: {err:#}"));
        }

        let subject = format!(
            "extract loader {} for {}",
            outcome.status(),
            format_slash_date(run_date)
        );
        let body = format!("run {run_id} on {}: {outcome}", self.settings.host);
        if let Err(err) = self.notifier.notify(&subject, &body) {
            warn!(%run_id, error = %err, "notification failed");
        }
    }
}

/// Extract date carried by the first record of a working file.
fn first_record_date(path: &Path, range: ColumnRange) -> Result<Date> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut first = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut first)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if first.is_empty() {
        return Err(anyhow!("{} has no records", file_name(path)));
    }

    let line = String::from_utf8_lossy(&first);
    read_extract_date(line.trim_end_matches(['\r', '\n']), range)
        .map_err(|err| anyhow!("{}: {}", file_name(path), err.detail()))
}

fn scan_entity_output(
    descriptor: &EntityDescriptor,
    output_log: &Path,
    run_log: &mut NarrativeLog,
) -> Result<(), RunFailure> {
    let offending = scan_output_log(output_log).map_err(|err| {
        RunFailure::for_entity(FailureStage::ErrorScan, &descriptor.code, format!("{err:#}"))
    })?;
    if offending.is_empty() {
        return Ok(());
    }

    for line in &offending {
        error!(
            entity = %descriptor.code,
            line = line.line_number,
            pass = line.pass.as_str(),
            text = %line.text,
            "failure keyword in output log"
        );
        run_log.line(&format!(
            "{} line {}: {}",
            file_name(output_log),
            line.line_number,
            line.text
        ));
    }

    Err(RunFailure::for_entity(
        FailureStage::ErrorScan,
        &descriptor.code,
        format!(
            "{} lines with failure keywords in {}",
            offending.len(),
            file_name(output_log)
        ),
    ))
}

fn append_entity_fatal(ctx: &RunContext, descriptor: &EntityDescriptor, reason: &str) {
    match NarrativeLog::append(&ctx.work_file(&descriptor.output_file())) {
        Ok(mut out) => out.fatal(reason),
        Err(err) => warn!(entity = %descriptor.code, error = %err, "output log unavailable"),
    }
}
