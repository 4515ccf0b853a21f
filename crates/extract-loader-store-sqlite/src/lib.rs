#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use extract_loader_core::entity::{ensure_identifier, EntityDescriptor};
use extract_loader_core::store::{
    ExtractDateInput, ExtractDateRecord, HolidayCalendar, LoaderStore, RunAudit,
    TransformExecutor, TransformParams,
};
use extract_loader_core::{
    format_iso_date, format_rfc3339, now_utc, parse_iso_date, DecodedRecord, FieldValue,
    RunOutcome,
};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{debug, info};

const LOADER_MIGRATION_VERSION: i64 = 1;

const SCHEMA_LOADER_V1: &str = r"
CREATE TABLE IF NOT EXISTS extract_date_ledger (
  ledger_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  entity_code TEXT NOT NULL,
  extract_date TEXT NOT NULL,
  loaded_at TEXT NOT NULL,
  host TEXT NOT NULL,
  row_count INTEGER NOT NULL CHECK (row_count >= 0)
);

CREATE TRIGGER IF NOT EXISTS trg_extract_date_ledger_no_update
BEFORE UPDATE ON extract_date_ledger
BEGIN
  SELECT RAISE(FAIL, 'extract_date_ledger is append-only');
END;

CREATE TRIGGER IF NOT EXISTS trg_extract_date_ledger_no_delete
BEFORE DELETE ON extract_date_ledger
BEGIN
  SELECT RAISE(FAIL, 'extract_date_ledger is append-only');
END;

CREATE INDEX IF NOT EXISTS idx_extract_date_ledger_entity_date
  ON extract_date_ledger(entity_code, extract_date);

CREATE TABLE IF NOT EXISTS holiday_calendar (
  holiday_date TEXT PRIMARY KEY,
  description TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS holiday_audit (
  audit_seq INTEGER PRIMARY KEY AUTOINCREMENT,
  run_date TEXT NOT NULL,
  holiday_date TEXT NOT NULL,
  host TEXT NOT NULL,
  recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS run_audit (
  run_id TEXT PRIMARY KEY,
  run_date TEXT NOT NULL,
  host TEXT NOT NULL,
  status TEXT NOT NULL CHECK (
    status IN ('success', 'skipped_holiday', 'skipped_no_run_day', 'failed')
  ),
  failure_stage TEXT,
  failure_entity TEXT,
  detail TEXT NOT NULL,
  started_at TEXT NOT NULL,
  finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_run_audit_run_date
  ON run_audit(run_date, finished_at);
";

/// SQLite-backed ledger, holiday calendar, staging area and transform runner.
pub struct SqliteLoaderStore {
    conn: Connection,
    operations: BTreeMap<String, String>,
}

/// Latest ledger state for one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSummary {
    pub entity_code: String,
    #[serde(with = "extract_loader_core::iso_date")]
    pub latest_extract_date: Date,
    pub loads: u64,
    pub last_loaded_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunAuditRow {
    pub run_id: String,
    #[serde(with = "extract_loader_core::iso_date")]
    pub run_date: Date,
    pub host: String,
    pub status: String,
    pub failure_stage: Option<String>,
    pub failure_entity: Option<String>,
    pub detail: String,
    pub started_at: String,
    pub finished_at: String,
}

impl SqliteLoaderStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self {
            conn,
            operations: BTreeMap::new(),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_LOADER_V1)
            .context("failed to apply loader schema")?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![LOADER_MIGRATION_VERSION, timestamp()?],
            )
            .context("failed to register loader schema migration")?;

        Ok(())
    }

    /// Makes `sql` available to [`TransformExecutor::run_transform`] as `name`.
    pub fn register_operation(&mut self, name: &str, sql: &str) -> Result<()> {
        ensure_identifier("operation name", name).map_err(|err| anyhow!(err.to_string()))?;
        if sql.trim().is_empty() {
            return Err(anyhow!("operation {name} has empty SQL"));
        }
        self.operations.insert(name.to_string(), sql.to_string());
        Ok(())
    }

    pub fn register_operations(&mut self, operations: &BTreeMap<String, String>) -> Result<()> {
        for (name, sql) in operations {
            self.register_operation(name, sql)?;
        }
        Ok(())
    }

    /// Inserts holiday rows that are not yet present; returns how many were new.
    pub fn seed_holidays(&mut self, holidays: &[(Date, Option<String>)]) -> Result<usize> {
        let now = timestamp()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to start holiday transaction")?;

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO holiday_calendar(holiday_date, description, created_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            for (date, description) in holidays {
                inserted += stmt
                    .execute(params![format_iso_date(*date), description, now])
                    .context("failed to insert holiday")?;
            }
        }

        tx.commit().context("failed to commit holiday transaction")?;
        Ok(inserted)
    }

    /// Returns `false` when the date was already a holiday.
    pub fn add_holiday(&mut self, date: Date, description: Option<&str>) -> Result<bool> {
        let inserted = self.seed_holidays(&[(date, description.map(str::to_string))])?;
        Ok(inserted > 0)
    }

    pub fn list_holidays(&self) -> Result<Vec<(Date, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT holiday_date, description FROM holiday_calendar ORDER BY holiday_date ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_date_column(row, 0)?, row.get::<_, Option<String>>(1)?))
        })?;
        collect_rows(rows)
    }

    pub fn list_ledger_summary(&self) -> Result<Vec<LedgerSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_code, MAX(extract_date), COUNT(*), MAX(loaded_at)
             FROM extract_date_ledger
             GROUP BY entity_code
             ORDER BY entity_code ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LedgerSummary {
                entity_code: row.get(0)?,
                latest_extract_date: parse_date_column(row, 1)?,
                loads: parse_count_column(row, 2)?,
                last_loaded_at: row.get(3)?,
            })
        })?;
        collect_rows(rows)
    }

    pub fn list_extract_dates(&self, entity_code: &str) -> Result<Vec<ExtractDateRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT ledger_seq, entity_code, extract_date, loaded_at, host, row_count
             FROM extract_date_ledger
             WHERE entity_code = ?1
             ORDER BY ledger_seq ASC",
        )?;
        let rows = stmt.query_map(params![entity_code], parse_ledger_row)?;
        collect_rows(rows)
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunAuditRow>> {
        let limit = i64::try_from(limit).context("run limit out of range")?;
        let mut stmt = self.conn.prepare(
            "SELECT run_id, run_date, host, status, failure_stage, failure_entity,
                    detail, started_at, finished_at
             FROM run_audit
             ORDER BY finished_at DESC, run_id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(RunAuditRow {
                run_id: row.get(0)?,
                run_date: parse_date_column(row, 1)?,
                host: row.get(2)?,
                status: row.get(3)?,
                failure_stage: row.get(4)?,
                failure_entity: row.get(5)?,
                detail: row.get(6)?,
                started_at: row.get(7)?,
                finished_at: row.get(8)?,
            })
        })?;
        collect_rows(rows)
    }

    pub fn holiday_skip_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM holiday_audit", [], |row| row.get(0))
            .context("failed to count holiday audit rows")?;
        u64::try_from(count).context("negative holiday audit count")
    }

    pub fn staging_row_count(&self, staging_table: &str) -> Result<u64> {
        ensure_identifier("staging_table", staging_table).map_err(|err| anyhow!(err.to_string()))?;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{staging_table}\""), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("failed to count rows in {staging_table}"))?;
        u64::try_from(count).context("negative staging row count")
    }

    fn ensure_staging_table(&self, descriptor: &EntityDescriptor) -> Result<()> {
        let table = &descriptor.staging_table;
        let columns = descriptor
            .layout
            .columns()
            .iter()
            .map(|column| format!("\"{}\" {}", column.name, column.kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");

        self.conn
            .execute_batch(&format!("CREATE TABLE IF NOT EXISTS \"{table}\" ({columns});"))
            .with_context(|| format!("failed to create staging table {table}"))?;

        let names = descriptor
            .layout
            .columns()
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>();
        ensure_table_has_columns(&self.conn, table, &names)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl LoaderStore for SqliteLoaderStore {
    fn truncate_staging(&mut self, descriptor: &EntityDescriptor) -> Result<()> {
        self.ensure_staging_table(descriptor)?;
        let removed = self
            .conn
            .execute(&format!("DELETE FROM \"{}\"", descriptor.staging_table), [])
            .with_context(|| format!("failed to truncate {}", descriptor.staging_table))?;
        debug!(
            entity = %descriptor.code,
            table = %descriptor.staging_table,
            removed,
            "staging table truncated"
        );
        Ok(())
    }

    fn insert_staging_batch(
        &mut self,
        descriptor: &EntityDescriptor,
        records: &[DecodedRecord],
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let columns = descriptor.layout.columns();
        let names = columns
            .iter()
            .map(|column| format!("\"{}\"", column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO \"{}\" ({names}) VALUES ({placeholders})",
            descriptor.staging_table
        );

        let tx = self
            .conn
            .transaction()
            .context("failed to start staging batch transaction")?;

        {
            let mut stmt = tx
                .prepare(&sql)
                .with_context(|| format!("failed to prepare insert into {}", descriptor.staging_table))?;
            for record in records {
                if record.len() != columns.len() {
                    return Err(anyhow!(
                        "record has {} fields, layout for {} has {}",
                        record.len(),
                        descriptor.code,
                        columns.len()
                    ));
                }
                let values = record.values().map(to_sql_value).collect::<Vec<_>>();
                stmt.execute(rusqlite::params_from_iter(values.iter()))
                    .with_context(|| format!("failed to insert into {}", descriptor.staging_table))?;
            }
        }

        tx.commit()
            .context("failed to commit staging batch transaction")?;
        Ok(records.len())
    }

    fn latest_extract_date(&self, entity_code: &str) -> Result<Option<Date>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT MAX(extract_date) FROM extract_date_ledger WHERE entity_code = ?1",
                params![entity_code],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to read latest extract date for {entity_code}"))?;

        raw.map(|value| parse_iso_date(&value).map_err(|err| anyhow!(err.to_string())))
            .transpose()
    }

    fn append_extract_date(&mut self, input: &ExtractDateInput) -> Result<ExtractDateRecord> {
        ensure_identifier("entity code", &input.entity_code)
            .map_err(|err| anyhow!(err.to_string()))?;
        let loaded_at = timestamp()?;
        let row_count = i64::try_from(input.row_count).context("row_count out of range")?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start ledger transaction")?;

        tx.execute(
            "INSERT INTO extract_date_ledger(entity_code, extract_date, loaded_at, host, row_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                input.entity_code,
                format_iso_date(input.extract_date),
                loaded_at,
                input.host,
                row_count,
            ],
        )
        .context("failed to append extract date")?;

        let ledger_seq = tx.last_insert_rowid();
        tx.commit().context("failed to commit ledger transaction")?;

        Ok(ExtractDateRecord {
            ledger_seq,
            entity_code: input.entity_code.clone(),
            extract_date: input.extract_date,
            loaded_at,
            host: input.host.clone(),
            row_count: input.row_count,
        })
    }

    fn record_holiday_skip(&mut self, run_date: Date, holiday: Date, host: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO holiday_audit(run_date, holiday_date, host, recorded_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    format_iso_date(run_date),
                    format_iso_date(holiday),
                    host,
                    timestamp()?,
                ],
            )
            .context("failed to record holiday skip")?;
        Ok(())
    }

    fn record_run_outcome(&mut self, audit: &RunAudit<'_>) -> Result<()> {
        let failure = audit.outcome.failure();
        let started_at = format_rfc3339(audit.started_at).map_err(|err| anyhow!(err.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO run_audit(
                    run_id, run_date, host, status, failure_stage, failure_entity,
                    detail, started_at, finished_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    audit.run_id.to_string(),
                    format_iso_date(audit.run_date),
                    audit.host,
                    audit.outcome.status(),
                    failure.map(|value| value.stage.as_str()),
                    failure.and_then(|value| value.entity.clone()),
                    outcome_detail(audit.outcome),
                    started_at,
                    timestamp()?,
                ],
            )
            .context("failed to record run outcome")?;

        info!(
            run_id = %audit.run_id,
            status = audit.outcome.status(),
            "run outcome recorded"
        );
        Ok(())
    }
}

impl TransformExecutor for SqliteLoaderStore {
    fn run_transform(&mut self, operation: &str, params: &TransformParams) -> Result<usize> {
        let sql = self
            .operations
            .get(operation)
            .ok_or_else(|| anyhow!("unknown transform operation: {operation}"))?;

        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("failed to prepare operation {operation}"))?;

        let names = (1..=stmt.parameter_count())
            .map(|index| stmt.parameter_name(index).map(str::to_string))
            .collect::<Vec<_>>();

        for (offset, name) in names.iter().enumerate() {
            let index = offset + 1;
            let name = name.as_deref().ok_or_else(|| {
                anyhow!("operation {operation} uses a positional parameter at index {index}")
            })?;
            let key = name.trim_start_matches([':', '@', '$']);
            let value = params
                .get(key)
                .ok_or_else(|| anyhow!("operation {operation} needs parameter {key}"))?;
            stmt.raw_bind_parameter(index, value)
                .with_context(|| format!("failed to bind {key} for {operation}"))?;
        }

        let changed = stmt
            .raw_execute()
            .with_context(|| format!("operation {operation} failed"))?;
        debug!(operation, changed, "transform executed");
        Ok(changed)
    }
}

impl HolidayCalendar for SqliteLoaderStore {
    fn holiday_for(&self, date: Date) -> Result<Option<Date>> {
        let Some(previous) = date.previous_day() else {
            return Ok(None);
        };

        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM holiday_calendar WHERE holiday_date = ?1 LIMIT 1",
                params![format_iso_date(previous)],
                |_| Ok(()),
            )
            .optional()
            .context("failed to query holiday_calendar")?
            .is_some();

        Ok(found.then_some(previous))
    }
}

fn outcome_detail(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Failed(failure) => failure.reason.clone(),
        other => other.to_string(),
    }
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => Value::Text(text.clone()),
        FieldValue::Integer(number) => Value::Integer(*number),
        FieldValue::Date(date) => Value::Text(format_iso_date(*date)),
    }
}

fn timestamp() -> Result<String> {
    format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))
}

fn parse_ledger_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExtractDateRecord> {
    Ok(ExtractDateRecord {
        ledger_seq: row.get(0)?,
        entity_code: row.get(1)?,
        extract_date: parse_date_column(row, 2)?,
        loaded_at: row.get(3)?,
        host: row.get(4)?,
        row_count: parse_count_column(row, 5)?,
    })
}

fn parse_date_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Date> {
    let raw: String = row.get(index)?;
    parse_iso_date(&raw).map_err(|err| invalid_column(index, rusqlite::types::Type::Text, err.to_string()))
}

fn parse_count_column(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(index)?;
    u64::try_from(raw).map_err(|_| {
        invalid_column(
            index,
            rusqlite::types::Type::Integer,
            format!("invalid count: {raw}"),
        )
    })
}

fn invalid_column(index: usize, kind: rusqlite::types::Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        kind,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn ensure_table_has_columns(conn: &Connection, table_name: &str, columns: &[&str]) -> Result<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info(\"{table_name}\")"))
        .with_context(|| format!("failed to inspect table_info for {table_name}"))?;
    let mut rows = stmt.query([])?;

    let mut available = Vec::new();
    while let Some(row) = rows.next()? {
        available.push(row.get::<_, String>(1)?.to_ascii_lowercase());
    }

    for required in columns {
        if !available.contains(&required.to_ascii_lowercase()) {
            return Err(anyhow!(
                "staging table {table_name} is missing column {required}; drop it to rebuild from the layout"
            ));
        }
    }

    Ok(())
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
