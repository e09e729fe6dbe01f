//! Store session port.
//!
//! One session spans a sync run. Writes accumulate in an open transaction
//! until `commit` or `rollback`.

use crate::domain::error::SyncError;
use crate::domain::instrument::Instrument;
use crate::domain::price_point::PricePoint;
use chrono::NaiveDate;

pub trait StorePort {
    /// Instruments in code order.
    fn list_instruments(&self) -> Result<Vec<Instrument>, SyncError>;

    /// The record with the greatest date for `code`, if any.
    fn get_latest(&self, code: &str) -> Result<Option<PricePoint>, SyncError>;

    /// First date, last date and row count stored for `code`.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError>;

    /// Merge `points` keyed by `(code, date)`: insert if absent, overwrite OHLCV if present.
    fn upsert_batch(&mut self, code: &str, points: &[PricePoint]) -> Result<(), SyncError>;

    /// Merge instruments keyed by code.
    fn upsert_instruments(&mut self, instruments: &[Instrument]) -> Result<(), SyncError>;

    fn commit(&mut self) -> Result<(), SyncError>;

    fn rollback(&mut self) -> Result<(), SyncError>;
}
