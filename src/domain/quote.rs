//! Upstream page shapes, as delivered before normalization.

use crate::domain::instrument::Instrument;

/// One daily record exactly as the upstream API formats it.
///
/// Numeric fields are locale-formatted strings such as `"+71,000"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub date: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub amount: String,
}

/// Pagination state handed back by upstream. Only meaningful for one instrument's fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCursor {
    pub token: String,
    pub has_more: bool,
}

impl SyncCursor {
    /// Cursor for the first request of a walk.
    pub fn start() -> Self {
        Self::default()
    }

    pub fn new(token: impl Into<String>, has_more: bool) -> Self {
        Self {
            token: token.into(),
            has_more,
        }
    }

    /// True when upstream signalled there is nothing further to request.
    pub fn is_exhausted(&self) -> bool {
        !self.has_more || self.token.is_empty()
    }
}

/// One page of daily records, newest first.
#[derive(Debug, Clone, Default)]
pub struct QuotePage {
    pub records: Vec<RawRecord>,
    pub next: SyncCursor,
}

/// One page of the upstream instrument list.
#[derive(Debug, Clone, Default)]
pub struct InstrumentPage {
    pub instruments: Vec<Instrument>,
    pub next: SyncCursor,
}
