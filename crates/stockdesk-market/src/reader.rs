use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use stockdesk_models::market_schema::{key_patterns, MarketSnapshot, NewsItem, PriceBar, Quote};
use tracing::debug;

use crate::error::MarketError;
use crate::source::MarketDataSource;
use crate::store::SnapshotStore;

/// Read-through market reader: moka (hot) → SQLite snapshot store → None.
///
/// SQLite hits are promoted into the hot cache. Access to the connection is
/// serialized with a `Mutex` because `rusqlite::Connection` is not `Sync`.
pub struct MarketReader {
    hot: Cache<String, String>,
    store: Mutex<SnapshotStore>,
}

impl MarketReader {
    pub fn new(store: SnapshotStore, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            hot: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(memory_ttl)
                .build(),
            store: Mutex::new(store),
        }
    }

    /// Raw JSON for a key, checking the hot cache first.
    pub async fn get_json(&self, key: &str) -> Result<Option<String>, MarketError> {
        if let Some(json) = self.hot.get(key).await {
            return Ok(Some(json));
        }

        let row = {
            let store = self
                .store
                .lock()
                .map_err(|e| MarketError::Store(format!("snapshot mutex poisoned: {e}")))?;
            store.get(key)?
        };

        match row {
            Some(row) => {
                self.hot.insert(key.to_string(), row.value_json.clone()).await;
                Ok(Some(row.value_json))
            }
            None => Ok(None),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MarketError> {
        match self.get_json(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn tickers(&self) -> Result<Vec<String>, MarketError> {
        let store = self
            .store
            .lock()
            .map_err(|e| MarketError::Store(format!("snapshot mutex poisoned: {e}")))?;
        store.tickers()
    }

    pub fn hot_cache_size(&self) -> u64 {
        self.hot.entry_count()
    }
}

#[async_trait]
impl MarketDataSource for MarketReader {
    async fn snapshot(&self, ticker: &str) -> Result<MarketSnapshot, MarketError> {
        let quote: Option<Quote> = self.get(&key_patterns::quote(ticker)).await?;
        let price_history: Vec<PriceBar> = self
            .get(&key_patterns::history(ticker))
            .await?
            .unwrap_or_default();
        let news: Vec<NewsItem> = self
            .get(&key_patterns::news(ticker))
            .await?
            .unwrap_or_default();

        let snapshot = MarketSnapshot {
            ticker: ticker.to_string(),
            quote,
            price_history,
            news,
            fetched_at: Utc::now(),
        };

        if !snapshot.has_price_data() {
            return Err(MarketError::Unavailable(ticker.to_string()));
        }

        debug!(
            ticker,
            bars = snapshot.price_history.len(),
            news = snapshot.news.len(),
            "Loaded market snapshot"
        );
        Ok(snapshot)
    }
}
