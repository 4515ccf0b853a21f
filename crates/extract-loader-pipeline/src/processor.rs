//! Per-entity processing: stage the working file, reject bad records, run the
//! configured transforms, scan `<code>.out` for failure keywords and append
//! the ledger row that marks the entity loaded.
//!
//! The ledger row is the last thing written, so an entity that stops in any
//! earlier state can be re-run for the same extract date.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use extract_loader_core::entity::{EntityDescriptor, ProcessorKind};
use extract_loader_core::store::{EntityStore, ExtractDateInput, TransformParams};
use extract_loader_core::{decode, format_iso_date, DecodedRecord, FailureStage};
use time::Date;
use tracing::{error, info};

use crate::context::RunContext;
use crate::runlog::NarrativeLog;
use crate::scanner::scan_output_log;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    StageLoad,
    ValidateBadRecords,
    RunTransformSql,
    ScanOutput,
    RecordAudit,
    Done,
    Failed,
}

impl ProcessorState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StageLoad => "StageLoad",
            Self::ValidateBadRecords => "ValidateBadRecords",
            Self::RunTransformSql => "RunTransformSql",
            Self::ScanOutput => "ScanOutput",
            Self::RecordAudit => "RecordAudit",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }

    /// Run-level stage reported when processing stops in this state.
    #[must_use]
    pub fn failure_stage(self) -> Option<FailureStage> {
        match self {
            Self::StageLoad => Some(FailureStage::StageLoad),
            Self::ValidateBadRecords => Some(FailureStage::BadRecords),
            Self::RunTransformSql => Some(FailureStage::TransformSql),
            Self::ScanOutput => Some(FailureStage::ErrorScan),
            Self::RecordAudit => Some(FailureStage::RecordAudit),
            Self::Done | Self::Failed => None,
        }
    }
}

impl Display for ProcessorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub entity: String,
    pub success: bool,
    /// `Done` or `Failed`.
    pub state: ProcessorState,
    /// State that was running when processing stopped.
    pub failed_in: Option<ProcessorState>,
    pub output_log: PathBuf,
    pub rows_loaded: u64,
    pub bad_records: u64,
    pub ledger_seq: Option<i64>,
    pub failure: Option<String>,
}

impl ProcessReport {
    #[must_use]
    pub fn failure_stage(&self) -> FailureStage {
        self.failed_in
            .and_then(ProcessorState::failure_stage)
            .unwrap_or(FailureStage::StageLoad)
    }
}

pub trait EntityProcessor {
    fn entity_code(&self) -> &str;

    /// Runs every state for one entity. Never panics or returns early with an
    /// error; failures are described by the report.
    fn process(
        &self,
        ctx: &RunContext,
        expected_date: Date,
        store: &mut dyn EntityStore,
    ) -> ProcessReport;
}

/// Entity processors keyed by entity code.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Box<dyn EntityProcessor>>,
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a [`TableEntityProcessor`] for every descriptor whose
    /// processor is not `pending`.
    #[must_use]
    pub fn from_descriptors(descriptors: &[EntityDescriptor], batch_size: usize) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            if descriptor.processor == ProcessorKind::Table {
                registry.register(Box::new(TableEntityProcessor::new(
                    descriptor.clone(),
                    batch_size,
                )));
            }
        }
        registry
    }

    /// Replaces any processor already registered for the same code.
    pub fn register(&mut self, processor: Box<dyn EntityProcessor>) {
        self.processors
            .insert(processor.entity_code().to_string(), processor);
    }

    #[must_use]
    pub fn get(&self, entity_code: &str) -> Option<&dyn EntityProcessor> {
        self.processors.get(entity_code).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, entity_code: &str) -> bool {
        self.processors.contains_key(entity_code)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

/// Processor driven entirely by an [`EntityDescriptor`].
#[derive(Debug, Clone)]
pub struct TableEntityProcessor {
    descriptor: EntityDescriptor,
    batch_size: usize,
}

#[derive(Debug, Default)]
struct Tally {
    rows_loaded: u64,
    bad_records: u64,
    ledger_seq: Option<i64>,
}

struct StageFailure {
    state: ProcessorState,
    reason: String,
}

impl TableEntityProcessor {
    #[must_use]
    pub fn new(descriptor: EntityDescriptor, batch_size: usize) -> Self {
        Self {
            descriptor,
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    fn run_states(
        &self,
        ctx: &RunContext,
        expected_date: Date,
        store: &mut dyn EntityStore,
        out: &mut NarrativeLog,
        tally: &mut Tally,
    ) -> Result<(), StageFailure> {
        let clock = Instant::now();
        let (rows, bad, batches) = self
            .stage_load(ctx, store)
            .map_err(|err| fail(ProcessorState::StageLoad, &err))?;
        tally.rows_loaded = rows;
        tally.bad_records = bad;
        out.line(&format!(
            "StageLoad: {rows} rows staged in {batches} batches, {bad} rejected ({} ms)",
            clock.elapsed().as_millis()
        ));

        let clock = Instant::now();
        if bad > 0 {
            return Err(StageFailure {
                state: ProcessorState::ValidateBadRecords,
                reason: format!("{bad} bad records written to {}", self.descriptor.bad_file()),
            });
        }
        out.line(&format!(
            "ValidateBadRecords: no rejected records ({} ms)",
            clock.elapsed().as_millis()
        ));

        let params = self.base_params(ctx, expected_date);
        let total = self.descriptor.transforms.len();
        for (index, step) in self.descriptor.transforms.iter().enumerate() {
            let clock = Instant::now();
            let mut step_params = step.params.clone();
            step_params.extend(params.clone());
            let changed = store
                .run_transform(&step.operation, &step_params)
                .map_err(|err| fail(ProcessorState::RunTransformSql, &err))?;
            out.line(&format!(
                "RunTransformSql: step {} of {total} changed {changed} rows ({} ms)",
                index + 1,
                clock.elapsed().as_millis()
            ));
        }

        let clock = Instant::now();
        let offending = scan_output_log(out.path())
            .map_err(|err| fail(ProcessorState::ScanOutput, &err))?;
        if let Some(first) = offending.first() {
            return Err(StageFailure {
                state: ProcessorState::ScanOutput,
                reason: format!(
                    "{} lines with failure keywords in {}, first at line {}: {}",
                    offending.len(),
                    self.descriptor.output_file(),
                    first.line_number,
                    first.text.trim()
                ),
            });
        }
        out.line(&format!(
            "ScanOutput: output log clean ({} ms)",
            clock.elapsed().as_millis()
        ));

        let clock = Instant::now();
        let record = store
            .append_extract_date(&ExtractDateInput {
                entity_code: self.descriptor.code.clone(),
                extract_date: expected_date,
                host: ctx.host.clone(),
                row_count: rows,
            })
            .map_err(|err| fail(ProcessorState::RecordAudit, &err))?;
        tally.ledger_seq = Some(record.ledger_seq);
        out.line(&format!(
            "RecordAudit: ledger row {} appended for {} ({} ms)",
            record.ledger_seq,
            format_iso_date(expected_date),
            clock.elapsed().as_millis()
        ));

        Ok(())
    }

    /// Truncates staging and loads the working file in committed batches.
    /// Returns `(rows, rejected, batches)`.
    fn stage_load(&self, ctx: &RunContext, store: &mut dyn EntityStore) -> Result<(u64, u64, u64)> {
        let descriptor = &self.descriptor;
        let data_path = ctx.data_file(descriptor);
        let bad_path = ctx.work_file(&descriptor.bad_file());

        store.truncate_staging(descriptor)?;

        let mut load_log = NarrativeLog::truncate(&ctx.work_file(&descriptor.load_log_file()))?;
        load_log.line(&format!(
            "load of {} into {} started",
            descriptor.data_file(),
            descriptor.staging_table
        ));

        let reader = BufReader::new(
            File::open(&data_path)
                .with_context(|| format!("failed to open {}", data_path.display()))?,
        );

        let mut bad_file: Option<File> = None;
        let mut batch: Vec<DecodedRecord> = Vec::with_capacity(self.batch_size);
        let (mut rows, mut bad, mut batches) = (0_u64, 0_u64, 0_u64);

        for (index, raw) in reader.split(b'\n').enumerate() {
            let raw = raw.with_context(|| format!("failed to read {}", data_path.display()))?;
            let decoded = String::from_utf8(raw.clone())
                .map_err(|_| "record is not valid UTF-8".to_string())
                .and_then(|line| decode(&line, &descriptor.layout).map_err(|err| err.to_string()));

            match decoded {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() == self.batch_size {
                        rows += store.insert_staging_batch(descriptor, &batch)? as u64;
                        batches += 1;
                        batch.clear();
                    }
                }
                Err(reason) => {
                    bad += 1;
                    load_log.warning(&format!("record {} rejected: {reason}", index + 1));
                    write_bad_line(&mut bad_file, &bad_path, &raw)?;
                }
            }
        }

        if !batch.is_empty() {
            rows += store.insert_staging_batch(descriptor, &batch)? as u64;
            batches += 1;
        }

        load_log.line(&format!("{rows} rows loaded, {bad} rejected"));
        Ok((rows, bad, batches))
    }

    fn base_params(&self, ctx: &RunContext, expected_date: Date) -> TransformParams {
        let mut params = TransformParams::new();
        params.insert("entity".to_string(), self.descriptor.code.clone());
        params.insert("extract_date".to_string(), format_iso_date(expected_date));
        params.insert("run_date".to_string(), format_iso_date(ctx.run_date));
        params.insert(
            "staging_table".to_string(),
            self.descriptor.staging_table.clone(),
        );
        params
    }
}

impl EntityProcessor for TableEntityProcessor {
    fn entity_code(&self) -> &str {
        &self.descriptor.code
    }

    fn process(
        &self,
        ctx: &RunContext,
        expected_date: Date,
        store: &mut dyn EntityStore,
    ) -> ProcessReport {
        let code = self.descriptor.code.as_str();
        let output_log = ctx.work_file(&self.descriptor.output_file());
        let mut tally = Tally::default();

        let mut out = match NarrativeLog::truncate(&output_log) {
            Ok(value) => value,
            Err(err) => {
                error!(entity = code, error = %err, "cannot open output log");
                return report(code, output_log, &tally, Some(ProcessorState::StageLoad), Some(format!("{err:#}")));
            }
        };

        let clock = Instant::now();
        out.line("StageLoad started");
        match self.run_states(ctx, expected_date, store, &mut out, &mut tally) {
            Ok(()) => {
                out.line(&format!("Done: completed in {} ms", clock.elapsed().as_millis()));
                info!(
                    entity = code,
                    rows = tally.rows_loaded,
                    ledger_seq = tally.ledger_seq,
                    "entity loaded"
                );
                report(code, output_log, &tally, None, None)
            }
            Err(failure) => {
                out.fatal(&format!("{}: {}", failure.state, failure.reason));
                error!(entity = code, state = %failure.state, reason = %failure.reason, "entity processing stopped");
                report(code, output_log, &tally, Some(failure.state), Some(failure.reason))
            }
        }
    }
}

fn fail(state: ProcessorState, err: &anyhow::Error) -> StageFailure {
    StageFailure {
        state,
        reason: format!("{err:#}"),
    }
}

fn report(
    entity: &str,
    output_log: PathBuf,
    tally: &Tally,
    failed_in: Option<ProcessorState>,
    failure: Option<String>,
) -> ProcessReport {
    ProcessReport {
        entity: entity.to_string(),
        success: failed_in.is_none(),
        state: if failed_in.is_none() {
            ProcessorState::Done
        } else {
            ProcessorState::Failed
        },
        failed_in,
        output_log,
        rows_loaded: tally.rows_loaded,
        bad_records: tally.bad_records,
        ledger_seq: tally.ledger_seq,
        failure,
    }
}

fn write_bad_line(bad_file: &mut Option<File>, path: &Path, raw: &[u8]) -> Result<()> {
    let file = match bad_file.take() {
        Some(file) => file,
        None => OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?,
    };
    let file = bad_file.insert(file);

    file.write_all(raw)
        .and_then(|()| file.write_all(b"\n"))
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunPaths;
    use crate::scanner::scan_text;
    use extract_loader_core::entity::{ColumnLayout, ColumnRange, ColumnSpec, FieldKind};
    use extract_loader_core::schedule::SchedulePolicy;
    use extract_loader_core::store::{ExtractDateRecord, LoaderStore, RunAudit, TransformExecutor};
    use extract_loader_core::TransformStep;
    use extract_loader_store_sqlite::SqliteLoaderStore;
    use std::fs;
    use time::macros::date;
    use ulid::Ulid;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn descriptor(transforms: Vec<TransformStep>) -> EntityDescriptor {
        let layout = match ColumnLayout::new(vec![
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
        ]) {
            Ok(value) => value,
            Err(err) => panic!("invalid fixture layout: {err}"),
        };
        EntityDescriptor {
            code: "ACCT".to_string(),
            drop_file: "ACCT".to_string(),
            staging_table: "stg_account".to_string(),
            processor: ProcessorKind::Table,
            layout,
            extract_date: ColumnRange { start: 1, end: 8 },
            transforms,
        }
    }

    fn step(operation: &str) -> TransformStep {
        TransformStep {
            operation: operation.to_string(),
            params: BTreeMap::new(),
        }
    }

    fn fixture_context(lines: &[&str]) -> RunContext {
        let root = std::env::temp_dir().join(format!("extract-loader-proc-{}", Ulid::new()));
        let work_dir = root.join("work");
        must(fs::create_dir_all(&work_dir).map_err(anyhow::Error::from));
        let mut content = lines.join("\n");
        content.push('\n');
        must(fs::write(work_dir.join("ACCT.dat"), content).map_err(anyhow::Error::from));

        RunContext::build(
            Ulid::new(),
            date!(2026 - 02 - 07),
            &SchedulePolicy::default(),
            &[],
            RunPaths {
                drop_dir: root.join("drop"),
                work_dir: work_dir.clone(),
                backup_dir: root.join("backup"),
                run_log: work_dir.join("run.log"),
            },
            "batch01",
        )
    }

    fn sqlite_store() -> SqliteLoaderStore {
        let mut store = must(SqliteLoaderStore::open(Path::new(":memory:")));
        must(store.migrate());
        must(store.register_operation(
            "create_account",
            "CREATE TABLE IF NOT EXISTS account (acct_no TEXT PRIMARY KEY, balance INTEGER, as_of TEXT)",
        ));
        must(store.register_operation(
            "merge_account",
            "INSERT OR REPLACE INTO account(acct_no, balance, as_of)
             SELECT acct_no, balance, :extract_date FROM stg_account",
        ));
        store
    }

    fn read(path: &Path) -> String {
        must(fs::read_to_string(path).map_err(anyhow::Error::from))
    }

    const GOOD_LINES: [&str; 5] = [
        "20260207ACC0000001000012345",
        "20260207ACC0000002000000007",
        "20260207ACC0000003000000100",
        "20260207ACC0000004000000000",
        "20260207ACC0000005000099999",
    ];

    #[test]
    fn clean_file_runs_every_state_and_records_ledger_row() {
        let ctx = fixture_context(&GOOD_LINES);
        let mut store = sqlite_store();
        let processor = TableEntityProcessor::new(
            descriptor(vec![step("create_account"), step("merge_account")]),
            2,
        );

        let report = processor.process(&ctx, date!(2026 - 02 - 07), &mut store);

        assert!(report.success, "{:?}", report.failure);
        assert_eq!(report.state, ProcessorState::Done);
        assert_eq!(report.rows_loaded, 5);
        assert_eq!(report.bad_records, 0);
        assert!(report.ledger_seq.is_some());
        assert_eq!(
            must(store.latest_extract_date("ACCT")),
            Some(date!(2026 - 02 - 07))
        );
        assert_eq!(must(store.staging_row_count("stg_account")), 5);

        let narrative = read(&report.output_log);
        assert!(narrative.contains("5 rows staged in 3 batches"));
        assert!(narrative.contains("step 2 of 2 changed 5 rows"));
        assert!(narrative.contains("ScanOutput: output log clean"));
        assert!(scan_text(&narrative).is_empty(), "{narrative}");
        assert!(!ctx.work_file("ACCT.bad").exists());
    }

    #[test]
    fn bad_records_stop_before_transforms() {
        let ctx = fixture_context(&[GOOD_LINES[0], "20261399ACC0000002000000007", "short"]);
        let mut store = sqlite_store();
        let processor = TableEntityProcessor::new(descriptor(vec![step("create_account")]), 1_000);

        let report = processor.process(&ctx, date!(2026 - 02 - 07), &mut store);

        assert!(!report.success);
        assert_eq!(report.failed_in, Some(ProcessorState::ValidateBadRecords));
        assert_eq!(report.failure_stage(), FailureStage::BadRecords);
        assert_eq!(report.bad_records, 2);
        assert_eq!(must(store.latest_extract_date("ACCT")), None);

        let bad = read(&ctx.work_file("ACCT.bad"));
        assert_eq!(bad, "20261399ACC0000002000000007\nshort\n");
        let load_log = read(&ctx.work_file("loadACCT.log"));
        assert_eq!(load_log.matches("WARNING: record").count(), 2);
        assert!(read(&report.output_log).contains("ERROR: ValidateBadRecords: 2 bad records"));
    }

    #[test]
    fn transform_failure_is_reported_without_ledger_row() {
        let ctx = fixture_context(&GOOD_LINES);
        let mut store = sqlite_store();
        let processor = TableEntityProcessor::new(descriptor(vec![step("merge_account")]), 1_000);

        // account table was never created
        let report = processor.process(&ctx, date!(2026 - 02 - 07), &mut store);

        assert!(!report.success);
        assert_eq!(report.failure_stage(), FailureStage::TransformSql);
        assert_eq!(report.rows_loaded, 5);
        assert_eq!(must(store.latest_extract_date("ACCT")), None);
    }

    #[derive(Default)]
    struct RecordingStore {
        staged: usize,
        calls: Vec<(String, TransformParams)>,
        appended: Vec<ExtractDateInput>,
        /// File and text appended by every transform, as a database spool would.
        spool: Option<(PathBuf, String)>,
    }

    impl LoaderStore for RecordingStore {
        fn truncate_staging(&mut self, _descriptor: &EntityDescriptor) -> Result<()> {
            self.staged = 0;
            Ok(())
        }

        fn insert_staging_batch(
            &mut self,
            _descriptor: &EntityDescriptor,
            records: &[DecodedRecord],
        ) -> Result<usize> {
            self.staged += records.len();
            Ok(records.len())
        }

        fn latest_extract_date(&self, _entity_code: &str) -> Result<Option<Date>> {
            Ok(None)
        }

        fn append_extract_date(&mut self, input: &ExtractDateInput) -> Result<ExtractDateRecord> {
            self.appended.push(input.clone());
            Ok(ExtractDateRecord {
                ledger_seq: 1,
                entity_code: input.entity_code.clone(),
                extract_date: input.extract_date,
                loaded_at: "2026-02-07T06:00:00Z".to_string(),
                host: input.host.clone(),
                row_count: input.row_count,
            })
        }

        fn record_holiday_skip(&mut self, _run_date: Date, _holiday: Date, _host: &str) -> Result<()> {
            Ok(())
        }

        fn record_run_outcome(&mut self, _audit: &RunAudit<'_>) -> Result<()> {
            Ok(())
        }
    }

    impl TransformExecutor for RecordingStore {
        fn run_transform(&mut self, operation: &str, params: &TransformParams) -> Result<usize> {
            self.calls.push((operation.to_string(), params.clone()));
            if let Some((path, text)) = &self.spool {
                let mut file = OpenOptions::new().append(true).open(path)?;
                file.write_all(text.as_bytes())?;
            }
            Ok(self.staged)
        }
    }

    #[test]
    fn transforms_receive_run_parameters_in_order() {
        let ctx = fixture_context(&GOOD_LINES[..2]);
        let mut store = RecordingStore::default();
        let mut merge = step("merge_account");
        merge.params.insert("region".to_string(), "EU".to_string());
        merge
            .params
            .insert("entity".to_string(), "overridden".to_string());
        let processor =
            TableEntityProcessor::new(descriptor(vec![step("create_account"), merge]), 1_000);

        let report = processor.process(&ctx, date!(2026 - 02 - 06), &mut store);

        assert!(report.success);
        assert_eq!(
            store
                .calls
                .iter()
                .map(|(operation, _)| operation.as_str())
                .collect::<Vec<_>>(),
            vec!["create_account", "merge_account"]
        );
        let params = &store.calls[1].1;
        assert_eq!(params.get("entity").map(String::as_str), Some("ACCT"));
        assert_eq!(params.get("extract_date").map(String::as_str), Some("2026-02-06"));
        assert_eq!(params.get("run_date").map(String::as_str), Some("2026-02-07"));
        assert_eq!(params.get("staging_table").map(String::as_str), Some("stg_account"));
        assert_eq!(params.get("region").map(String::as_str), Some("EU"));
        assert_eq!(store.appended.len(), 1);
        assert_eq!(store.appended[0].row_count, 2);
        assert_eq!(store.appended[0].host, "batch01");
    }

    #[test]
    fn keyword_in_spooled_output_stops_before_ledger_row() {
        let ctx = fixture_context(&GOOD_LINES);
        let mut store = RecordingStore {
            spool: Some((
                ctx.work_file("ACCT.out"),
                "SQL warning: err in merge\n".to_string(),
            )),
            ..RecordingStore::default()
        };
        let processor = TableEntityProcessor::new(descriptor(vec![step("merge_account")]), 1_000);

        let report = processor.process(&ctx, date!(2026 - 02 - 07), &mut store);

        assert!(!report.success);
        assert_eq!(report.failed_in, Some(ProcessorState::ScanOutput));
        assert_eq!(report.failure_stage(), FailureStage::ErrorScan);
        assert_eq!(report.ledger_seq, None);
        assert!(store.appended.is_empty());
        let reason = report.failure.unwrap_or_default();
        assert!(reason.contains("1 lines with failure keywords in ACCT.out"), "{reason}");

        let narrative = read(&report.output_log);
        assert!(narrative.contains("StageLoad started"));
        assert!(narrative.contains("SQL warning: err in merge"));
        assert!(!narrative.contains("RecordAudit"));

        // a quiet rerun for the same date goes through
        store.spool = None;
        let rerun = processor.process(&ctx, date!(2026 - 02 - 07), &mut store);
        assert!(rerun.success, "{:?}", rerun.failure);
        assert_eq!(store.appended.len(), 1);
        assert!(!read(&rerun.output_log).contains("err in merge"));
    }

    #[test]
    fn registry_skips_pending_descriptors() {
        let active = descriptor(Vec::new());
        let mut pending = descriptor(Vec::new());
        pending.code = "PEND".to_string();
        pending.processor = ProcessorKind::Pending;

        let registry = ProcessorRegistry::from_descriptors(&[active, pending], 100);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("ACCT"));
        assert!(registry.get("PEND").is_none());
    }
}
