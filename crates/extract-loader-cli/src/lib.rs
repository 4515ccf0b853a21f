//! Command surface for the daily extract load.
//!
//! - [`run_cli`] executes a parsed [`Cli`] and returns the process exit code.
//! - [`init_logging`] installs the `tracing` subscriber once per process.
//!
//! Startup failures (configuration, database, a malformed run date) come back
//! as `Err` and map to exit code 2 in `main`. Run outcomes map to 0 or 1.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use extract_loader_core::store::{ExtractDateInput, LoaderStore};
use extract_loader_core::{format_slash_date, parse_run_date, today, LoaderConfig};
use extract_loader_pipeline::{resolve_host, Pipeline, PipelineSettings, ProcessorRegistry};
use extract_loader_store_sqlite::SqliteLoaderStore;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod notify;

pub use notify::{notifier_from_config, LogNotifier, WebhookNotifier};

#[derive(Debug, Parser)]
#[command(name = "extract-loader")]
#[command(about = "Loads the daily fixed-width extracts into the warehouse")]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Run date as MM/DD/YYYY; defaults to today.
    run_date: Option<String>,

    #[arg(long, global = true, default_value = "./extract_loader.yaml")]
    config: PathBuf,

    /// Overrides `paths.database` from the configuration.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Latest recorded extract date per entity.
    Ledger(LedgerArgs),
    /// Records a first extract date for an entity.
    SeedLedger(SeedLedgerArgs),
    AddHoliday(AddHolidayArgs),
    /// Most recent run outcomes.
    Runs(RunsArgs),
}

#[derive(Debug, Args)]
pub struct LedgerArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct SeedLedgerArgs {
    #[arg(long)]
    entity: String,
    #[arg(long)]
    extract_date: String,
}

#[derive(Debug, Args)]
pub struct AddHolidayArgs {
    #[arg(long)]
    date: String,
    #[arg(long)]
    description: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    #[arg(long, default_value_t = 10)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

/// Installs a stderr `tracing` subscriber filtered by `RUST_LOG` (default
/// `info`). Later calls are ignored.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Executes the parsed command line.
///
/// # Errors
/// Returns an error when the configuration cannot be loaded, the database
/// cannot be opened or migrated, an argument is malformed, or an admin
/// command fails.
pub fn run_cli(cli: Cli) -> Result<u8> {
    let config = LoaderConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.paths.database_path());
    let mut store = open_store(&db_path, &config)?;

    match cli.command {
        None => run_daily(cli.run_date.as_deref(), &config, &mut store),
        Some(Command::Ledger(args)) => {
            print_ledger(&store, args.json)?;
            Ok(0)
        }
        Some(Command::SeedLedger(args)) => {
            seed_ledger(&args, &config, &mut store)?;
            Ok(0)
        }
        Some(Command::AddHoliday(args)) => {
            let date = parse_run_date(&args.date)?;
            if store.add_holiday(date, args.description.as_deref())? {
                println!("holiday {} added", format_slash_date(date));
            } else {
                println!("holiday {} already present", format_slash_date(date));
            }
            Ok(0)
        }
        Some(Command::Runs(args)) => {
            print_runs(&store, &args)?;
            Ok(0)
        }
    }
}

fn open_store(path: &Path, config: &LoaderConfig) -> Result<SqliteLoaderStore> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut store = SqliteLoaderStore::open(path)?;
    store.migrate()?;
    store.register_operations(&config.operations)?;
    let seeded = store.seed_holidays(&config.holiday_dates()?)?;
    if seeded > 0 {
        info!(seeded, "holiday calendar seeded from configuration");
    }
    Ok(store)
}

fn run_daily(
    run_date: Option<&str>,
    config: &LoaderConfig,
    store: &mut SqliteLoaderStore,
) -> Result<u8> {
    let run_date = match run_date {
        Some(value) => parse_run_date(value)?,
        None => today(),
    };
    let descriptors = config.descriptors()?;
    let registry = ProcessorRegistry::from_descriptors(&descriptors, config.load.batch_size);
    let settings = PipelineSettings::from_config(config);
    let notifier = notifier_from_config(&config.notify, &settings.host);

    let pipeline = Pipeline::new(&settings, &descriptors, &registry, notifier.as_ref());
    match pipeline.run(run_date, store) {
        Ok(outcome) => {
            println!(
                "run_date={} status={} detail={outcome}",
                format_slash_date(run_date),
                outcome.status()
            );
            Ok(outcome.exit_code())
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "run aborted");
            eprintln!("run aborted: {err:#}");
            Ok(1)
        }
    }
}

fn seed_ledger(
    args: &SeedLedgerArgs,
    config: &LoaderConfig,
    store: &mut SqliteLoaderStore,
) -> Result<()> {
    if !config.entities.iter().any(|entity| entity.code == args.entity) {
        return Err(anyhow!("entity {} is not configured", args.entity));
    }

    let extract_date = parse_run_date(&args.extract_date)?;
    let record = store.append_extract_date(&ExtractDateInput {
        entity_code: args.entity.clone(),
        extract_date,
        host: resolve_host(config.load.host.as_deref()),
        row_count: 0,
    })?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn print_ledger(store: &SqliteLoaderStore, json: bool) -> Result<()> {
    let summary = store.list_ledger_summary()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for row in summary {
        println!(
            "{} latest={} loads={} last_loaded_at={}",
            row.entity_code,
            format_slash_date(row.latest_extract_date),
            row.loads,
            row.last_loaded_at
        );
    }
    Ok(())
}

fn print_runs(store: &SqliteLoaderStore, args: &RunsArgs) -> Result<()> {
    let runs = store.recent_runs(args.limit)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    for run in runs {
        println!(
            "run_id={} run_date={} status={} detail={}",
            run.run_id,
            format_slash_date(run.run_date),
            run.status,
            run.detail
        );
    }
    Ok(())
}
