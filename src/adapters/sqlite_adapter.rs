//! SQLite store for historical bars and the fill ledger.

use crate::domain::bar::{BarInterval, PriceBar, TimeRange};
use crate::domain::error::DcabotError;
use crate::domain::trade::{Side, TradeEvent, TransitionReason};
use crate::ports::config_port::ConfigPort;
use crate::ports::fill_ledger_port::{open_tail, FillLedgerPort};
use crate::ports::market_data_port::MarketDataPort;
use chrono::DateTime;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, DcabotError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| DcabotError::config_missing("sqlite", "path"))?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| DcabotError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, DcabotError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| DcabotError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn connection(
        &self,
    ) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, DcabotError> {
        self.pool.get().map_err(|e: r2d2::Error| DcabotError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), DcabotError> {
        let conn = self.connection()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ohlcv (
                symbol TEXT NOT NULL,
                interval TEXT NOT NULL,
                ts INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, interval, ts)
            );
            CREATE TABLE IF NOT EXISTS fills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                price REAL NOT NULL,
                reason TEXT NOT NULL,
                order_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_fills_symbol ON fills(symbol);",
        )
        .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    pub fn insert_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        bars: &[PriceBar],
    ) -> Result<(), DcabotError> {
        let mut conn = self.connection()?;

        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlcv (symbol, interval, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    symbol,
                    interval.label(),
                    bar.timestamp.timestamp(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Recorded fills for `symbol`, oldest first.
    pub fn fills_for(&self, symbol: &str) -> Result<Vec<TradeEvent>, DcabotError> {
        let conn = self.connection()?;

        let query = "SELECT ts, symbol, side, quantity, price, reason, order_id
                     FROM fills WHERE symbol = ?1 ORDER BY id ASC";

        let mut stmt = conn
            .prepare(query)
            .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(params![symbol], |row| {
                let ts: i64 = row.get(0)?;
                let side: String = row.get(2)?;
                let reason: String = row.get(5)?;
                Ok((
                    ts,
                    row.get::<_, String>(1)?,
                    side,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    reason,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut events = Vec::new();
        for row in rows {
            let (ts, symbol, side, quantity, price, reason, order_id) =
                row.map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                    reason: e.to_string(),
                })?;
            events.push(TradeEvent {
                timestamp: DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                    DcabotError::Database {
                        reason: format!("fill timestamp {ts} out of range"),
                    }
                })?,
                symbol,
                side: parse_side(&side)?,
                quantity,
                price,
                reason: parse_reason(&reason)?,
                order_id,
            });
        }

        Ok(events)
    }
}

fn parse_side(value: &str) -> Result<Side, DcabotError> {
    match value {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(DcabotError::Database {
            reason: format!("unknown side '{other}' in fills"),
        }),
    }
}

fn parse_reason(value: &str) -> Result<TransitionReason, DcabotError> {
    [
        TransitionReason::Entry,
        TransitionReason::ScaleIn,
        TransitionReason::TrailingExit,
        TransitionReason::SignalExit,
        TransitionReason::ForcedExit,
    ]
    .into_iter()
    .find(|r| r.as_str() == value)
    .ok_or_else(|| DcabotError::Database {
        reason: format!("unknown reason '{value}' in fills"),
    })
}

impl MarketDataPort for SqliteAdapter {
    fn historical_bars(
        &self,
        symbol: &str,
        interval: BarInterval,
        range: &TimeRange,
    ) -> Result<Vec<PriceBar>, DcabotError> {
        let conn = self.connection()?;

        let query = "SELECT ts, open, high, low, close, volume
                     FROM ohlcv
                     WHERE symbol = ?1 AND interval = ?2 AND ts >= ?3 AND ts <= ?4
                     ORDER BY ts ASC";

        let mut stmt = conn
            .prepare(query)
            .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(
                params![
                    symbol,
                    interval.label(),
                    range.start.timestamp(),
                    range.end.timestamp()
                ],
                |row| {
                    let ts: i64 = row.get(0)?;
                    let timestamp = DateTime::from_timestamp(ts, 0).ok_or(
                        rusqlite::Error::IntegralValueOutOfRange(0, ts),
                    )?;
                    Ok(PriceBar {
                        timestamp,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(
                row.map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
                    reason: e.to_string(),
                })?,
            );
        }

        Ok(bars)
    }
}

impl FillLedgerPort for SqliteAdapter {
    fn record_fill(&self, event: &TradeEvent) -> Result<(), DcabotError> {
        let conn = self.connection()?;

        conn.execute(
            "INSERT INTO fills (ts, symbol, side, quantity, price, reason, order_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.timestamp.timestamp(),
                event.symbol,
                event.side.to_string(),
                event.quantity,
                event.price,
                event.reason.as_str(),
                event.order_id
            ],
        )
        .map_err(|e: rusqlite::Error| DcabotError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    fn fills_since_last_exit(&self, symbol: &str) -> Result<Vec<TradeEvent>, DcabotError> {
        Ok(open_tail(self.fills_for(symbol)?))
    }
}
