//! SQLite store adapter.
//!
//! [`SqliteAdapter`] owns the connection pool; [`SqliteSession`] checks out
//! one connection for the duration of a run and implements [`StorePort`].

use crate::domain::error::SyncError;
use crate::domain::instrument::Instrument;
use crate::domain::price_point::PricePoint;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use tracing::warn;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn pool_err(e: r2d2::Error) -> SyncError {
    SyncError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> SyncError {
    SyncError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(text: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            text.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn row_to_point(row: &Row<'_>) -> rusqlite::Result<PricePoint> {
    Ok(PricePoint {
        code: row.get(0)?,
        date: parse_date(row.get(1)?)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get(6)?,
        amount: row.get(7)?,
    })
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SyncError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SyncError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SyncError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_err)?;

        Ok(Self { pool })
    }

    /// Create the embedded tables if they do not exist yet.
    pub fn initialize_schema(&self) -> Result<(), SyncError> {
        let conn = self.pool.get().map_err(pool_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS instrument (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                market TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS daily_price (
                code TEXT NOT NULL,
                trade_date TEXT NOT NULL,
                open INTEGER NOT NULL,
                high INTEGER NOT NULL,
                low INTEGER NOT NULL,
                close INTEGER NOT NULL,
                volume INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                PRIMARY KEY (code, trade_date)
            );
            CREATE INDEX IF NOT EXISTS idx_daily_price_date ON daily_price(trade_date);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    /// Check out a connection for one run.
    pub fn session(&self) -> Result<SqliteSession, SyncError> {
        let conn = self.pool.get().map_err(pool_err)?;
        Ok(SqliteSession {
            conn,
            in_transaction: false,
        })
    }
}

/// A pooled connection plus the state of its open transaction. Dropping the
/// session with uncommitted writes rolls them back.
pub struct SqliteSession {
    conn: PooledConnection<SqliteConnectionManager>,
    in_transaction: bool,
}

impl SqliteSession {
    fn begin(&mut self) -> Result<(), SyncError> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN").map_err(query_err)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Every stored record for `code`, newest first.
    pub fn price_history(&self, code: &str) -> Result<Vec<PricePoint>, SyncError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT code, trade_date, open, high, low, close, volume, amount
                 FROM daily_price WHERE code = ?1 ORDER BY trade_date DESC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![code], row_to_point)
            .map_err(query_err)?;

        let mut points = Vec::new();
        for row in rows {
            points.push(row.map_err(query_err)?);
        }
        Ok(points)
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback on session drop failed");
            }
        }
    }
}

impl StorePort for SqliteSession {
    fn list_instruments(&self) -> Result<Vec<Instrument>, SyncError> {
        let mut stmt = self
            .conn
            .prepare("SELECT code, name, market FROM instrument ORDER BY code")
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(Instrument {
                    code: row.get(0)?,
                    name: row.get(1)?,
                    market: row.get(2)?,
                })
            })
            .map_err(query_err)?;

        let mut instruments = Vec::new();
        for row in rows {
            instruments.push(row.map_err(query_err)?);
        }
        Ok(instruments)
    }

    fn get_latest(&self, code: &str) -> Result<Option<PricePoint>, SyncError> {
        self.conn
            .query_row(
                "SELECT code, trade_date, open, high, low, close, volume, amount
                 FROM daily_price WHERE code = ?1
                 ORDER BY trade_date DESC LIMIT 1",
                params![code],
                row_to_point,
            )
            .optional()
            .map_err(query_err)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError> {
        let result: (Option<String>, Option<String>, i64) = self
            .conn
            .query_row(
                "SELECT MIN(trade_date), MAX(trade_date), COUNT(*) \
                 FROM daily_price WHERE code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => Ok(Some((
                parse_date(min).map_err(query_err)?,
                parse_date(max).map_err(query_err)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }

    fn upsert_batch(&mut self, code: &str, points: &[PricePoint]) -> Result<(), SyncError> {
        self.begin()?;
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO daily_price (code, trade_date, open, high, low, close, volume, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (code, trade_date) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    amount = excluded.amount",
            )
            .map_err(query_err)?;

        for point in points {
            stmt.execute(params![
                code,
                point.date.format(DATE_FORMAT).to_string(),
                point.open,
                point.high,
                point.low,
                point.close,
                point.volume,
                point.amount
            ])
            .map_err(query_err)?;
        }
        Ok(())
    }

    fn upsert_instruments(&mut self, instruments: &[Instrument]) -> Result<(), SyncError> {
        self.begin()?;
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO instrument (code, name, market) VALUES (?1, ?2, ?3)
                 ON CONFLICT (code) DO UPDATE SET name = excluded.name, market = excluded.market",
            )
            .map_err(query_err)?;

        for instrument in instruments {
            stmt.execute(params![instrument.code, instrument.name, instrument.market])
                .map_err(query_err)?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SyncError> {
        if self.in_transaction {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|e| SyncError::StoreWrite {
                    reason: e.to_string(),
                })?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), SyncError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("ROLLBACK").map_err(query_err)?;
        }
        Ok(())
    }
}
