//! Paginated history fetch for one instrument.
//!
//! [`PageWalker`] is a lazy iterator over canonical records, newest first. It
//! requests a page only when the previous one has been drained, and stops on
//! convergence, on passing the cutoff date, when upstream has no continuation,
//! at the safety cap, or on the first upstream error.

use crate::domain::convergence::{classify, Convergence};
use crate::domain::error::SyncError;
use crate::domain::normalize::normalize_record;
use crate::domain::price_point::PricePoint;
use crate::domain::quote::SyncCursor;
use crate::domain::rate_limiter::RateLimiter;
use crate::ports::quote_port::QuotePort;
use chrono::NaiveDate;
use std::collections::VecDeque;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    CutoffReached,
    EndOfData,
    SafetyCap,
    UpstreamError,
}

/// Parameters of one instrument's fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub code: &'a str,
    pub cutoff: NaiveDate,
    pub checkpoint: Option<&'a PricePoint>,
    pub as_of: NaiveDate,
    pub max_records: usize,
}

pub struct PageWalker<'a> {
    quote: &'a dyn QuotePort,
    limiter: &'a mut dyn RateLimiter,
    request: FetchRequest<'a>,
    cursor: SyncCursor,
    buffer: VecDeque<PricePoint>,
    received: usize,
    produced: usize,
    pages: usize,
    stop: Option<StopReason>,
}

impl<'a> PageWalker<'a> {
    pub fn new(
        quote: &'a dyn QuotePort,
        limiter: &'a mut dyn RateLimiter,
        request: FetchRequest<'a>,
    ) -> Self {
        Self {
            quote,
            limiter,
            request,
            cursor: SyncCursor::start(),
            buffer: VecDeque::new(),
            received: 0,
            produced: 0,
            pages: 0,
            stop: None,
        }
    }

    /// Why the walk ended, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn fetch_next_page(&mut self) -> Result<(), SyncError> {
        let code = self.request.code;
        self.limiter.wait();
        let page = self
            .quote
            .fetch_page(code, &self.cursor, self.request.as_of)?;
        self.pages += 1;

        if page.records.is_empty() {
            debug!(code = %code, page = self.pages, "empty page");
            self.stop = Some(StopReason::EndOfData);
            return Ok(());
        }
        self.received += page.records.len();

        let mut passed_cutoff = false;
        for raw in &page.records {
            let Some(record) = normalize_record(code, raw) else {
                warn!(code = %code, date = %raw.date, "skipping record with unparseable date");
                continue;
            };
            if !record.malformed.is_empty() {
                warn!(
                    code = %code,
                    date = %record.point.date,
                    fields = ?record.malformed,
                    "malformed fields defaulted to zero"
                );
            }

            let point = record.point;
            match classify(&point, self.request.checkpoint) {
                Convergence::Converged => {
                    debug!(code = %code, date = %point.date, "converged with checkpoint");
                    self.stop = Some(StopReason::Converged);
                    break;
                }
                Convergence::Changed => {
                    debug!(code = %code, date = %point.date, "checkpoint record changed upstream");
                }
                Convergence::New | Convergence::Backfill => {}
            }

            if point.date < self.request.cutoff {
                passed_cutoff = true;
            }
            self.buffer.push_back(point);
            self.produced += 1;
        }

        debug!(
            code = %code,
            page = self.pages,
            records = page.records.len(),
            received = self.received,
            produced = self.produced,
            "page processed"
        );

        if self.stop.is_some() {
            return Ok(());
        }
        if passed_cutoff {
            self.stop = Some(StopReason::CutoffReached);
        } else if page.next.is_exhausted() {
            self.stop = Some(StopReason::EndOfData);
        } else if self.received > self.request.max_records {
            warn!(
                code = %code,
                received = self.received,
                produced = self.produced,
                "safety cap reached"
            );
            self.stop = Some(StopReason::SafetyCap);
        } else {
            self.cursor = page.next;
        }
        Ok(())
    }
}

impl Iterator for PageWalker<'_> {
    type Item = Result<PricePoint, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(point) = self.buffer.pop_front() {
                return Some(Ok(point));
            }
            if self.stop.is_some() {
                return None;
            }
            if let Err(e) = self.fetch_next_page() {
                self.stop = Some(StopReason::UpstreamError);
                return Some(Err(e));
            }
        }
    }
}

/// Drained result of a [`PageWalker`].
#[derive(Debug)]
pub struct FetchOutcome {
    pub points: Vec<PricePoint>,
    pub error: Option<SyncError>,
    pub stop: StopReason,
    pub pages: usize,
}

/// Run a walk to completion. Records emitted before an upstream error are kept.
pub fn fetch_history(
    quote: &dyn QuotePort,
    limiter: &mut dyn RateLimiter,
    request: FetchRequest<'_>,
) -> FetchOutcome {
    let mut walker = PageWalker::new(quote, limiter, request);
    let mut points = Vec::new();
    let mut error = None;

    for item in walker.by_ref() {
        match item {
            Ok(point) => points.push(point),
            Err(e) => error = Some(e),
        }
    }

    FetchOutcome {
        points,
        error,
        stop: walker.stop_reason().unwrap_or(StopReason::EndOfData),
        pages: walker.pages_fetched(),
    }
}
