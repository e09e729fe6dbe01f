#![allow(dead_code)]

use chrono::NaiveDate;
use quotesync::domain::error::SyncError;
use quotesync::domain::instrument::Instrument;
pub use quotesync::domain::price_point::PricePoint;
use quotesync::domain::quote::{InstrumentPage, QuotePage, RawRecord, SyncCursor};
use quotesync::domain::rate_limiter::RateLimiter;
use quotesync::ports::quote_port::QuotePort;
use quotesync::ports::store_port::StorePort;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Upstream fake: scripted pages per instrument code and per market.
///
/// Once a script runs dry every further request returns an empty page.
pub struct MockQuotePort {
    pages: RefCell<HashMap<String, VecDeque<Result<QuotePage, String>>>>,
    listings: RefCell<HashMap<String, VecDeque<Result<InstrumentPage, String>>>>,
    calls: RefCell<HashMap<String, usize>>,
    cursors: RefCell<Vec<(String, SyncCursor)>>,
}

impl MockQuotePort {
    pub fn new() -> Self {
        Self {
            pages: RefCell::new(HashMap::new()),
            listings: RefCell::new(HashMap::new()),
            calls: RefCell::new(HashMap::new()),
            cursors: RefCell::new(Vec::new()),
        }
    }

    pub fn with_page(self, code: &str, page: QuotePage) -> Self {
        self.pages
            .borrow_mut()
            .entry(code.to_string())
            .or_default()
            .push_back(Ok(page));
        self
    }

    pub fn with_error(self, code: &str, reason: &str) -> Self {
        self.pages
            .borrow_mut()
            .entry(code.to_string())
            .or_default()
            .push_back(Err(reason.to_string()));
        self
    }

    pub fn with_listing(self, market: &str, page: InstrumentPage) -> Self {
        self.listings
            .borrow_mut()
            .entry(market.to_string())
            .or_default()
            .push_back(Ok(page));
        self
    }

    pub fn with_listing_error(self, market: &str, reason: &str) -> Self {
        self.listings
            .borrow_mut()
            .entry(market.to_string())
            .or_default()
            .push_back(Err(reason.to_string()));
        self
    }

    /// Re-arm the script for `code`, e.g. between two runs.
    pub fn push_page(&self, code: &str, page: QuotePage) {
        self.pages
            .borrow_mut()
            .entry(code.to_string())
            .or_default()
            .push_back(Ok(page));
    }

    pub fn calls(&self, key: &str) -> usize {
        self.calls.borrow().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.borrow().values().sum()
    }

    pub fn cursors_for(&self, key: &str) -> Vec<SyncCursor> {
        self.cursors
            .borrow()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn record_call(&self, key: &str, cursor: &SyncCursor) {
        *self.calls.borrow_mut().entry(key.to_string()).or_insert(0) += 1;
        self.cursors
            .borrow_mut()
            .push((key.to_string(), cursor.clone()));
    }
}

impl QuotePort for MockQuotePort {
    fn fetch_page(
        &self,
        code: &str,
        cursor: &SyncCursor,
        _as_of: NaiveDate,
    ) -> Result<QuotePage, SyncError> {
        self.record_call(code, cursor);
        let next = self
            .pages
            .borrow_mut()
            .get_mut(code)
            .and_then(|q| q.pop_front());
        match next {
            Some(Ok(page)) => Ok(page),
            Some(Err(reason)) => Err(SyncError::UpstreamUnavailable {
                code: code.to_string(),
                reason,
            }),
            None => Ok(QuotePage::default()),
        }
    }

    fn fetch_instrument_page(
        &self,
        market: &str,
        cursor: &SyncCursor,
    ) -> Result<InstrumentPage, SyncError> {
        self.record_call(market, cursor);
        let next = self
            .listings
            .borrow_mut()
            .get_mut(market)
            .and_then(|q| q.pop_front());
        match next {
            Some(Ok(page)) => Ok(page),
            Some(Err(reason)) => Err(SyncError::UpstreamUnavailable {
                code: market.to_string(),
                reason,
            }),
            None => Ok(InstrumentPage::default()),
        }
    }
}

/// Limiter that never sleeps and counts its calls.
#[derive(Default)]
pub struct CountingLimiter {
    pub waits: usize,
}

impl RateLimiter for CountingLimiter {
    fn wait(&mut self) {
        self.waits += 1;
    }
}

/// In-memory store session with a pending write set and fault injection.
#[derive(Default)]
pub struct MemoryStore {
    pub instruments: BTreeMap<String, Instrument>,
    pub committed: BTreeMap<(String, NaiveDate), PricePoint>,
    pending_points: BTreeMap<(String, NaiveDate), PricePoint>,
    pending_instruments: BTreeMap<String, Instrument>,
    pub commits: usize,
    pub rollbacks: usize,
    /// 1-based index of the commit call that fails.
    pub fail_commit_at: Option<usize>,
    commit_calls: usize,
    pub failing_latest: HashSet<String>,
    pub fail_list: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instruments(codes: &[&str]) -> Self {
        let mut store = Self::new();
        for code in codes {
            store
                .instruments
                .insert(code.to_string(), Instrument::new(*code, "", "0"));
        }
        store
    }

    pub fn with_committed(mut self, point: PricePoint) -> Self {
        self.committed
            .insert((point.code.clone(), point.date), point);
        self
    }

    pub fn committed_for(&self, code: &str) -> Vec<PricePoint> {
        self.committed
            .values()
            .filter(|p| p.code == code)
            .cloned()
            .collect()
    }

    pub fn committed_codes(&self) -> HashSet<String> {
        self.committed.keys().map(|(c, _)| c.clone()).collect()
    }
}

impl StorePort for MemoryStore {
    fn list_instruments(&self) -> Result<Vec<Instrument>, SyncError> {
        if self.fail_list {
            return Err(SyncError::DatabaseQuery {
                reason: "no such table: instrument".into(),
            });
        }
        Ok(self.instruments.values().cloned().collect())
    }

    fn get_latest(&self, code: &str) -> Result<Option<PricePoint>, SyncError> {
        if self.failing_latest.contains(code) {
            return Err(SyncError::DatabaseQuery {
                reason: "disk I/O error".into(),
            });
        }
        Ok(self
            .committed
            .values()
            .chain(self.pending_points.values())
            .filter(|p| p.code == code)
            .max_by_key(|p| p.date)
            .cloned())
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError> {
        let dates: Vec<NaiveDate> = self
            .committed
            .values()
            .filter(|p| p.code == code)
            .map(|p| p.date)
            .collect();
        match (dates.iter().min(), dates.iter().max()) {
            (Some(min), Some(max)) => Ok(Some((*min, *max, dates.len()))),
            _ => Ok(None),
        }
    }

    fn upsert_batch(&mut self, code: &str, points: &[PricePoint]) -> Result<(), SyncError> {
        for p in points {
            self.pending_points
                .insert((code.to_string(), p.date), p.clone());
        }
        Ok(())
    }

    fn upsert_instruments(&mut self, instruments: &[Instrument]) -> Result<(), SyncError> {
        for i in instruments {
            self.pending_instruments.insert(i.code.clone(), i.clone());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SyncError> {
        self.commit_calls += 1;
        if self.fail_commit_at == Some(self.commit_calls) {
            return Err(SyncError::StoreWrite {
                reason: "database is locked".into(),
            });
        }
        self.committed.append(&mut self.pending_points);
        self.instruments.append(&mut self.pending_instruments);
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SyncError> {
        self.pending_points.clear();
        self.pending_instruments.clear();
        self.rollbacks += 1;
        Ok(())
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
}

/// Raw record with every OHLC field set to `price`, formatted the way upstream sends it.
pub fn raw(date: &str, price: &str) -> RawRecord {
    RawRecord {
        date: date.into(),
        open: price.into(),
        high: price.into(),
        low: price.into(),
        close: price.into(),
        volume: "1,000".into(),
        amount: "70".into(),
    }
}

pub fn page(records: Vec<RawRecord>, next: Option<&str>) -> QuotePage {
    QuotePage {
        records,
        next: match next {
            Some(token) => SyncCursor::new(token, true),
            None => SyncCursor::start(),
        },
    }
}

pub fn point(code: &str, d: &str, price: i64) -> PricePoint {
    PricePoint {
        code: code.to_string(),
        date: date(d),
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 1000,
        amount: 70,
    }
}

pub fn listing(instruments: Vec<Instrument>, next: Option<&str>) -> InstrumentPage {
    InstrumentPage {
        instruments,
        next: match next {
            Some(token) => SyncCursor::new(token, true),
            None => SyncCursor::start(),
        },
    }
}
