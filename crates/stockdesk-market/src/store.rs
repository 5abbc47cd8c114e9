use chrono::Utc;
use rusqlite::{Connection, OpenFlags, Row};
use stockdesk_models::market_schema::{MarketRow, MARKET_TABLE_DDL};

use crate::error::MarketError;

const SELECT_COLUMNS: &str = "SELECT key, ticker, value_json, source, fetched_at, expires_at \
                              FROM market_entries";

/// SQLite accessor for market snapshots.
///
/// The database is filled by an external collector (quotes, daily history,
/// headlines per ticker). stockdesk opens it read-only; the writable
/// constructors exist for collectors and tests.
pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    /// Open a read-only connection to an existing snapshot database.
    pub fn open(path: &str) -> Result<Self, MarketError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open (or create) a writable database and ensure the schema exists.
    pub fn open_writable(path: &str) -> Result<Self, MarketError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(MARKET_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// In-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, MarketError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MARKET_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get a single entry by key. Returns None if missing or expired.
    pub fn get(&self, key: &str) -> Result<Option<MarketRow>, MarketError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE key = ?1 AND expires_at > ?2"
        ))?;

        match stmt.query_row(rusqlite::params![key, now], map_row) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MarketError::Sqlite(e)),
        }
    }

    /// All live entries for a ticker.
    pub fn get_by_ticker(&self, ticker: &str) -> Result<Vec<MarketRow>, MarketError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE ticker = ?1 AND expires_at > ?2 ORDER BY key"
        ))?;

        let rows = stmt
            .query_map(rusqlite::params![ticker, now], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct tickers with at least one live entry.
    pub fn tickers(&self) -> Result<Vec<String>, MarketError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT ticker FROM market_entries WHERE expires_at > ?1 ORDER BY ticker",
        )?;
        let tickers = stmt
            .query_map(rusqlite::params![now], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }

    pub fn insert(&self, row: &MarketRow) -> Result<(), MarketError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO market_entries \
             (key, ticker, value_json, source, fetched_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                row.key,
                row.ticker,
                row.value_json,
                row.source,
                row.fetched_at,
                row.expires_at,
            ],
        )?;
        Ok(())
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<MarketRow> {
    Ok(MarketRow {
        key: row.get(0)?,
        ticker: row.get(1)?,
        value_json: row.get(2)?,
        source: row.get(3)?,
        fetched_at: row.get(4)?,
        expires_at: row.get(5)?,
    })
}
