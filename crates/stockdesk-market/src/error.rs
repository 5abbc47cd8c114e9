use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No market data for {0}")]
    Unavailable(String),

    #[error("Snapshot store not available: {0}")]
    Store(String),
}
