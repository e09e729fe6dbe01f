//! PostgreSQL store adapter.
//!
//! Tables `instrument` and `daily_price` are expected to exist already.

use crate::domain::error::SyncError;
use crate::domain::instrument::Instrument;
use crate::domain::price_point::PricePoint;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;
use chrono::NaiveDate;
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use std::cell::RefCell;
use tracing::warn;

type Manager = PostgresConnectionManager<NoTls>;

fn query_err(e: postgres::Error) -> SyncError {
    SyncError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn row_to_point(row: &Row) -> PricePoint {
    PricePoint {
        code: row.get(0),
        date: row.get(1),
        open: row.get(2),
        high: row.get(3),
        low: row.get(4),
        close: row.get(5),
        volume: row.get(6),
        amount: row.get(7),
    }
}

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SyncError> {
        // Try [postgres] connection_string first, fall back to [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| SyncError::ConfigMissing {
                section: "database".into(),
                key: "conninfo".into(),
            })?;

        let pg_config: postgres::Config =
            connection_string
                .parse()
                .map_err(|e: postgres::Error| SyncError::ConfigInvalid {
                    section: "postgres".into(),
                    key: "connection_string".into(),
                    reason: e.to_string(),
                })?;

        let pool = Pool::builder()
            .max_size(config.get_int("postgres", "pool_size", 2).max(1) as u32)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(|e| SyncError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn session(&self) -> Result<PostgresSession, SyncError> {
        let conn = self.pool.get().map_err(|e| SyncError::Database {
            reason: e.to_string(),
        })?;
        Ok(PostgresSession {
            conn: RefCell::new(conn),
            in_transaction: false,
        })
    }
}

pub struct PostgresSession {
    conn: RefCell<PooledConnection<Manager>>,
    in_transaction: bool,
}

impl PostgresSession {
    fn begin(&mut self) -> Result<(), SyncError> {
        if !self.in_transaction {
            self.conn.get_mut().batch_execute("BEGIN").map_err(query_err)?;
            self.in_transaction = true;
        }
        Ok(())
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Err(e) = self.conn.get_mut().batch_execute("ROLLBACK") {
                warn!(error = %e, "rollback on session drop failed");
            }
        }
    }
}

impl StorePort for PostgresSession {
    fn list_instruments(&self) -> Result<Vec<Instrument>, SyncError> {
        let rows = self
            .conn
            .borrow_mut()
            .query("SELECT code, name, market FROM instrument ORDER BY code", &[])
            .map_err(query_err)?;

        Ok(rows
            .into_iter()
            .map(|row| Instrument {
                code: row.get(0),
                name: row.get(1),
                market: row.get(2),
            })
            .collect())
    }

    fn get_latest(&self, code: &str) -> Result<Option<PricePoint>, SyncError> {
        let row = self
            .conn
            .borrow_mut()
            .query_opt(
                "SELECT code, trade_date, open, high, low, close, volume, amount \
                 FROM daily_price WHERE code = $1 \
                 ORDER BY trade_date DESC LIMIT 1",
                &[&code],
            )
            .map_err(query_err)?;

        Ok(row.as_ref().map(row_to_point))
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SyncError> {
        let row = self
            .conn
            .borrow_mut()
            .query_one(
                "SELECT MIN(trade_date), MAX(trade_date), COUNT(*) \
                 FROM daily_price WHERE code = $1",
                &[&code],
            )
            .map_err(query_err)?;

        let min: Option<NaiveDate> = row.get(0);
        let max: Option<NaiveDate> = row.get(1);
        let count: i64 = row.get(2);

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((min, max, count as usize))),
            _ => Ok(None),
        }
    }

    fn upsert_batch(&mut self, code: &str, points: &[PricePoint]) -> Result<(), SyncError> {
        self.begin()?;
        let conn = self.conn.get_mut();
        let stmt = conn
            .prepare(
                "INSERT INTO daily_price \
                    (code, trade_date, open, high, low, close, volume, amount) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (code, trade_date) DO UPDATE SET \
                    open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low, \
                    close = EXCLUDED.close, volume = EXCLUDED.volume, amount = EXCLUDED.amount",
            )
            .map_err(query_err)?;

        for point in points {
            let params: &[&(dyn ToSql + Sync)] = &[
                &code,
                &point.date,
                &point.open,
                &point.high,
                &point.low,
                &point.close,
                &point.volume,
                &point.amount,
            ];
            conn.execute(&stmt, params).map_err(query_err)?;
        }
        Ok(())
    }

    fn upsert_instruments(&mut self, instruments: &[Instrument]) -> Result<(), SyncError> {
        self.begin()?;
        let conn = self.conn.get_mut();
        let stmt = conn
            .prepare(
                "INSERT INTO instrument (code, name, market) VALUES ($1, $2, $3) \
                 ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name, market = EXCLUDED.market",
            )
            .map_err(query_err)?;

        for instrument in instruments {
            conn.execute(&stmt, &[&instrument.code, &instrument.name, &instrument.market])
                .map_err(query_err)?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SyncError> {
        if self.in_transaction {
            self.conn
                .get_mut()
                .batch_execute("COMMIT")
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
            self.conn
                .get_mut()
                .batch_execute("ROLLBACK")
                .map_err(query_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
    }

    #[test]
    fn from_config_missing_connection_string() {
        let config = EmptyConfig;
        let result = PostgresAdapter::from_config(&config);
        match result {
            Err(SyncError::ConfigMissing { section, key }) => {
                assert_eq!(section, "database");
                assert_eq!(key, "conninfo");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
