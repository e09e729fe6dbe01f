//! Upstream quote API port.

use crate::domain::error::SyncError;
use crate::domain::quote::{InstrumentPage, QuotePage, SyncCursor};
use chrono::NaiveDate;

pub trait QuotePort {
    /// One page of daily records for `code`, newest first, as of `as_of`.
    fn fetch_page(
        &self,
        code: &str,
        cursor: &SyncCursor,
        as_of: NaiveDate,
    ) -> Result<QuotePage, SyncError>;

    /// One page of the instrument list for `market`.
    fn fetch_instrument_page(
        &self,
        market: &str,
        cursor: &SyncCursor,
    ) -> Result<InstrumentPage, SyncError>;
}
