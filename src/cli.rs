//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvInstrumentAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::rest_quote_adapter::RestQuoteAdapter;
use crate::domain::config_validation::{
    validate_store_config, validate_sync_config, validate_upstream_config,
};
use crate::domain::error::SyncError;
use crate::domain::instrument::parse_markets;
use crate::domain::instrument_sync::{merge_instruments, sync_instruments};
use crate::domain::rate_limiter::{FixedIntervalLimiter, DEFAULT_MIN_INTERVAL};
use crate::domain::sync::{
    sync_universe, RunStatus, SyncConfig, SyncResponse, SyncSummary, DEFAULT_COMMIT_EVERY,
    DEFAULT_SAFETY_BUFFER_DAYS, DEFAULT_TARGET_DAYS,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;

#[derive(Parser, Debug)]
#[command(name = "quotesync", about = "Incremental daily price synchronizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synchronize daily prices for every stored instrument
    Sync {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Refresh the instrument master from the upstream listing
    SyncInstruments {
        #[arg(short, long)]
        config: PathBuf,
        /// Market code; repeatable. Defaults to [sync] markets
        #[arg(long = "market")]
        markets: Vec<String>,
    },
    /// Load instruments from a code,name,market CSV file
    ImportInstruments {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List the instrument universe
    ListInstruments {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the stored checkpoint and data range for one instrument
    Checkpoint {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Sync { config } => run_sync(&config),
        Command::SyncInstruments { config, markets } => run_sync_instruments(&config, &markets),
        Command::ImportInstruments { config, file } => run_import_instruments(&config, &file),
        Command::ListInstruments { config } => run_list_instruments(&config),
        Command::Checkpoint { config, code } => run_checkpoint(&config, &code),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SyncError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Install the stderr subscriber. `RUST_LOG` wins over `[log] filter`.
pub fn init_tracing(config: &dyn ConfigPort) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        config
            .get_string("log", "filter")
            .and_then(|f| EnvFilter::try_new(f.trim()).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    });

    // A second install (tests, embedding) is not an error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn fail(e: SyncError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

fn positive_u32(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: u32,
) -> Result<u32, SyncError> {
    let value = config.get_int(section, key, i64::from(default));
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| SyncError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason: format!("{key} must be a positive integer, got {value}"),
        })
}

pub fn build_sync_config(config: &dyn ConfigPort) -> Result<SyncConfig, SyncError> {
    let target_days = positive_u32(config, "sync", "target_days", DEFAULT_TARGET_DAYS)?;
    let commit_every = positive_u32(config, "sync", "commit_every", DEFAULT_COMMIT_EVERY as u32)?;

    let buffer = config.get_int(
        "sync",
        "safety_buffer_days",
        i64::from(DEFAULT_SAFETY_BUFFER_DAYS),
    );
    let safety_buffer_days = u32::try_from(buffer).map_err(|_| SyncError::ConfigInvalid {
        section: "sync".into(),
        key: "safety_buffer_days".into(),
        reason: format!("safety_buffer_days must not be negative, got {buffer}"),
    })?;

    Ok(SyncConfig {
        target_days,
        safety_buffer_days,
        commit_every: commit_every as usize,
    })
}

pub fn min_interval(config: &dyn ConfigPort) -> Duration {
    let default_ms = DEFAULT_MIN_INTERVAL.as_millis() as i64;
    let ms = config.get_int("upstream", "min_interval_ms", default_ms);
    Duration::from_millis(u64::try_from(ms).unwrap_or(default_ms as u64))
}

/// Markets from the command line, else from `[sync] markets`.
pub fn resolve_markets(
    flags: &[String],
    config: &dyn ConfigPort,
) -> Result<Vec<String>, SyncError> {
    let (source, key) = if flags.is_empty() {
        match config.get_string("sync", "markets") {
            Some(list) => (list, "markets"),
            None => {
                return Err(SyncError::ConfigMissing {
                    section: "sync".into(),
                    key: "markets".into(),
                })
            }
        }
    } else {
        (flags.join(","), "--market")
    };

    parse_markets(&source).map_err(|e| SyncError::ConfigInvalid {
        section: "sync".into(),
        key: key.into(),
        reason: e.to_string(),
    })
}

/// Open one store session for the configured backend.
pub fn open_session(config: &dyn ConfigPort) -> Result<Box<dyn StorePort>, SyncError> {
    let backend = config
        .get_string("store", "backend")
        .map(|b| b.trim().to_lowercase())
        .unwrap_or_else(|| "sqlite".to_string());

    match backend.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;

            let adapter = SqliteAdapter::from_config(config)?;
            adapter.initialize_schema()?;
            Ok(Box::new(adapter.session()?))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            use crate::adapters::postgres_adapter::PostgresAdapter;

            let adapter = PostgresAdapter::from_config(config)?;
            Ok(Box::new(adapter.session()?))
        }
        other => Err(SyncError::ConfigInvalid {
            section: "store".into(),
            key: "backend".into(),
            reason: format!("backend '{other}' is not available in this build"),
        }),
    }
}

fn run_sync(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => {
            print_response(&failure_response());
            return code;
        }
    };
    init_tracing(&config);

    match sync_from_config(&config) {
        Ok(summary) => {
            print_response(&summary.response());
            match &summary.aborted {
                Some(e) => e.into(),
                None => ExitCode::SUCCESS,
            }
        }
        Err(e) => {
            error!(error = %e, "sync could not start");
            print_response(&failure_response());
            fail(e)
        }
    }
}

fn sync_from_config(config: &dyn ConfigPort) -> Result<SyncSummary, SyncError> {
    validate_upstream_config(config)?;
    validate_sync_config(config)?;
    validate_store_config(config)?;
    let sync_config = build_sync_config(config)?;

    let quote = RestQuoteAdapter::from_config(config)?;
    let mut limiter = FixedIntervalLimiter::new(min_interval(config));
    let mut store = open_session(config)?;
    // Held for the run; library callers embedding sync_universe may set it.
    let stop = AtomicBool::new(false);
    let today = chrono::Local::now().date_naive();

    Ok(sync_universe(
        &quote,
        &mut limiter,
        store.as_mut(),
        &sync_config,
        today,
        &stop,
    ))
}

fn failure_response() -> SyncResponse {
    SyncResponse {
        status: RunStatus::Failure,
        processed: 0,
    }
}

fn print_response(response: &SyncResponse) {
    match serde_json::to_string(response) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: cannot encode response: {e}"),
    }
}

fn run_sync_instruments(config_path: &PathBuf, market_flags: &[String]) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_tracing(&config);

    let setup = validate_upstream_config(&config)
        .and_then(|()| validate_store_config(&config))
        .and_then(|()| resolve_markets(market_flags, &config));
    let markets = match setup {
        Ok(m) => m,
        Err(e) => return fail(e),
    };

    let quote = match RestQuoteAdapter::from_config(&config) {
        Ok(q) => q,
        Err(e) => return fail(e),
    };
    let mut store = match open_session(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let mut limiter = FixedIntervalLimiter::new(min_interval(&config));

    let mut first_error: Option<SyncError> = None;
    for market in &markets {
        match sync_instruments(&quote, &mut limiter, store.as_mut(), market) {
            Ok(count) => println!("{market}: {count} instruments"),
            Err(e) => {
                error!(market = %market, error = %e, "instrument sync failed");
                eprintln!("error: {market}: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => (&e).into(),
        None => ExitCode::SUCCESS,
    }
}

fn run_import_instruments(config_path: &PathBuf, file: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_tracing(&config);

    if let Err(e) = validate_store_config(&config) {
        return fail(e);
    }

    let instruments = match CsvInstrumentAdapter::new(file).load() {
        Ok(list) => list,
        Err(e) => return fail(e),
    };
    if instruments.is_empty() {
        warn!(file = %file.display(), "no instruments in file");
        println!("0 instruments imported");
        return ExitCode::SUCCESS;
    }

    let mut store = match open_session(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    match merge_instruments(store.as_mut(), &instruments) {
        Ok(()) => {
            info!(instruments = instruments.len(), "instrument file imported");
            println!("{} instruments imported", instruments.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_list_instruments(config_path: &PathBuf) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_tracing(&config);

    let listed = validate_store_config(&config)
        .and_then(|()| open_session(&config))
        .and_then(|store| store.list_instruments());
    match listed {
        Ok(instruments) => {
            for i in &instruments {
                println!("{}\t{}\t{}", i.code, i.name, i.market);
            }
            eprintln!("{} instruments", instruments.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_checkpoint(config_path: &PathBuf, code: &str) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_tracing(&config);

    let store = match validate_store_config(&config).and_then(|()| open_session(&config)) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    match store.get_latest(code) {
        Ok(Some(p)) => println!(
            "{code}: latest {} open {} high {} low {} close {} volume {} amount {}",
            p.date, p.open, p.high, p.low, p.close, p.volume, p.amount
        ),
        Ok(None) => {
            eprintln!("{code}: no data found");
            return ExitCode::SUCCESS;
        }
        Err(e) => return fail(e),
    }

    match store.get_data_range(code) {
        Ok(Some((first, last, count))) => {
            println!("{code}: {count} records, {first} to {last}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}
