use std::collections::HashMap;

use async_trait::async_trait;
use stockdesk_models::market_schema::MarketSnapshot;

use crate::error::MarketError;

/// Supplies per-ticker market facts to the agent pipeline. Mockable for testing.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the current snapshot for `ticker`.
    /// `MarketError::Unavailable` means the ticker has no usable price data.
    async fn snapshot(&self, ticker: &str) -> Result<MarketSnapshot, MarketError>;
}

/// In-memory source backed by prepared snapshots.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    snapshots: HashMap<String, MarketSnapshot>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, snapshot: MarketSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: MarketSnapshot) {
        self.snapshots.insert(snapshot.ticker.clone(), snapshot);
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn snapshot(&self, ticker: &str) -> Result<MarketSnapshot, MarketError> {
        self.snapshots
            .get(ticker)
            .filter(|s| s.has_price_data())
            .cloned()
            .ok_or_else(|| MarketError::Unavailable(ticker.to_string()))
    }
}
