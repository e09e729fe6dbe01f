//! Instrument-master sync: populate the universe from the upstream listing.

use crate::domain::error::SyncError;
use crate::domain::instrument::Instrument;
use crate::domain::quote::SyncCursor;
use crate::domain::rate_limiter::RateLimiter;
use crate::ports::quote_port::QuotePort;
use crate::ports::store_port::StorePort;
use tracing::{debug, error, info, warn};

/// Upper bound on listing pages per market.
pub const MAX_INSTRUMENT_PAGES: usize = 1000;

/// Walk the listing for `market`, keep the entries that belong to it, and
/// merge them into the store in a single commit. Upstream failures abort
/// before anything is written.
pub fn sync_instruments(
    quote: &dyn QuotePort,
    limiter: &mut dyn RateLimiter,
    store: &mut dyn StorePort,
    market: &str,
) -> Result<usize, SyncError> {
    let mut cursor = SyncCursor::start();
    let mut collected: Vec<Instrument> = Vec::new();

    for page_no in 1..=MAX_INSTRUMENT_PAGES {
        limiter.wait();
        let page = quote.fetch_instrument_page(market, &cursor)?;
        let received = page.instruments.len();
        collected.extend(page.instruments.into_iter().filter(|i| i.market == market));
        debug!(market = %market, page = page_no, received, kept = collected.len(), "listing page");

        if page.next.is_exhausted() {
            break;
        }
        if page_no == MAX_INSTRUMENT_PAGES {
            warn!(market = %market, "listing page cap reached");
        }
        cursor = page.next;
    }

    if collected.is_empty() {
        warn!(market = %market, "upstream listing returned no instruments");
        return Ok(0);
    }

    merge_instruments(store, &collected)?;
    info!(market = %market, instruments = collected.len(), "instrument master merged");
    Ok(collected.len())
}

/// Upsert `instruments` keyed by code and commit. A failed merge is rolled back.
pub fn merge_instruments(
    store: &mut dyn StorePort,
    instruments: &[Instrument],
) -> Result<(), SyncError> {
    let written = store
        .upsert_instruments(instruments)
        .and_then(|()| store.commit());
    if let Err(e) = written {
        if let Err(rollback_err) = store.rollback() {
            error!(error = %rollback_err, "rollback after failed instrument merge also failed");
        }
        return Err(match e {
            SyncError::StoreWrite { .. } => e,
            other => SyncError::StoreWrite {
                reason: other.to_string(),
            },
        });
    }
    Ok(())
}
