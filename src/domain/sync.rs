//! Universe synchronization.
//!
//! Instruments are processed strictly one after another by a single worker:
//! load checkpoint, walk upstream pages, stage the batch, and commit every
//! `commit_every` instruments plus once at the end. Runs are assumed to be
//! serialized by whoever triggers them; nothing here takes a lock.

use crate::domain::checkpoint::load_checkpoint;
use crate::domain::error::SyncError;
use crate::domain::fetcher::{fetch_history, FetchRequest};
use crate::domain::rate_limiter::RateLimiter;
use crate::domain::writer::BatchWriter;
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::StorePort;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

pub const DEFAULT_TARGET_DAYS: u32 = 1095;
pub const DEFAULT_SAFETY_BUFFER_DAYS: u32 = 10;
pub const DEFAULT_COMMIT_EVERY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub target_days: u32,
    pub safety_buffer_days: u32,
    pub commit_every: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target_days: DEFAULT_TARGET_DAYS,
            safety_buffer_days: DEFAULT_SAFETY_BUFFER_DAYS,
            commit_every: DEFAULT_COMMIT_EVERY,
        }
    }
}

impl SyncConfig {
    /// Oldest date of interest: today - target_days - safety_buffer_days.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today - Duration::days(i64::from(self.target_days) + i64::from(self.safety_buffer_days))
    }

    /// Per-instrument record cap that ends a walk regardless of upstream signalling.
    pub fn max_records(&self) -> usize {
        self.target_days as usize * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failure,
}

#[derive(Debug)]
pub struct InstrumentError {
    pub code: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub processed: usize,
    pub committed: usize,
    pub errors: Vec<InstrumentError>,
    /// The error that ended the run early, if any.
    pub aborted: Option<SyncError>,
    pub cancelled: bool,
}

/// What the triggering interface reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResponse {
    pub status: RunStatus,
    pub processed: usize,
}

impl SyncSummary {
    pub fn status(&self) -> RunStatus {
        if self.aborted.is_some() {
            RunStatus::Failure
        } else if self.errors.is_empty() && !self.cancelled {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }

    /// `processed` counts durable instruments once the run has aborted.
    pub fn response(&self) -> SyncResponse {
        let processed = if self.aborted.is_some() {
            self.committed
        } else {
            self.processed
        };
        SyncResponse {
            status: self.status(),
            processed,
        }
    }
}

/// Synchronize every instrument the store knows about.
///
/// `stop` is checked after each instrument completes; setting it ends the run
/// after a final commit. A failed commit aborts the run and `committed` holds
/// the instruments made durable before it.
pub fn sync_universe(
    quote: &dyn QuotePort,
    limiter: &mut dyn RateLimiter,
    store: &mut dyn StorePort,
    config: &SyncConfig,
    today: NaiveDate,
    stop: &AtomicBool,
) -> SyncSummary {
    let mut summary = SyncSummary::default();

    let instruments = match store.list_instruments() {
        Ok(list) => list,
        Err(e) => {
            error!(error = %e, "failed to list instruments");
            summary.aborted = Some(e);
            return summary;
        }
    };

    let total = instruments.len();
    let cutoff = config.cutoff(today);
    let commit_every = config.commit_every.max(1);
    let mut writer = BatchWriter::new();
    info!(instruments = total, cutoff = %cutoff, "starting daily price sync");

    for instrument in &instruments {
        let code = instrument.code.as_str();
        info!(code = %code, "[{}/{}] processing", summary.processed + 1, total);

        let load = load_checkpoint(&*store, code);
        if let Some(e) = load.error {
            summary.errors.push(InstrumentError {
                code: code.to_string(),
                error: e,
            });
        }

        let outcome = fetch_history(
            quote,
            limiter,
            FetchRequest {
                code,
                cutoff,
                checkpoint: load.checkpoint.as_ref(),
                as_of: today,
                max_records: config.max_records(),
            },
        );

        info!(
            code = %code,
            records = outcome.points.len(),
            pages = outcome.pages,
            stop = ?outcome.stop,
            "fetch finished"
        );
        if let Some(e) = outcome.error {
            warn!(code = %code, error = %e, "fetch aborted, keeping records already received");
            summary.errors.push(InstrumentError {
                code: code.to_string(),
                error: e,
            });
        }

        writer.stage(code, outcome.points);
        summary.processed += 1;

        if summary.processed % commit_every == 0 {
            if let Err(e) = writer.flush(store) {
                error!(error = %e, processed = summary.processed, "commit failed, aborting run");
                summary.committed = writer.committed_instruments();
                summary.aborted = Some(e);
                return summary;
            }
        }

        if stop.load(Ordering::SeqCst) {
            info!(processed = summary.processed, "stop requested");
            summary.cancelled = true;
            break;
        }
    }

    if let Err(e) = writer.flush(store) {
        error!(error = %e, "final commit failed");
        summary.aborted = Some(e);
    }
    summary.committed = writer.committed_instruments();

    info!(
        processed = summary.processed,
        committed = summary.committed,
        errors = summary.errors.len(),
        "daily price sync finished"
    );
    summary
}
