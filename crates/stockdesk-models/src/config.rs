use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Top-level configuration for stockdesk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StockdeskConfig {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
}

/// Configuration for the market-data snapshot reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    /// Path to the SQLite snapshot database (written by the data collector, read here).
    pub sqlite_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    pub memory_max_capacity: u64,
    /// How long a read stays in memory, in seconds.
    pub memory_ttl_seconds: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/market_snapshots.db".to_string(),
            memory_max_capacity: 1_000,
            memory_ttl_seconds: 300,
        }
    }
}

/// Configuration for model calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Model for the per-ticker analyst roles.
    pub model: String,
    /// Model for the portfolio aggregation call. Falls back to `model`.
    pub aggregation_model: Option<String>,
    /// Timeout of a single generation call in seconds.
    pub call_timeout_seconds: u64,
    /// Ceiling on simultaneous generation calls across all tickers.
    pub max_concurrent_calls: usize,
    /// Extra attempts after a transport failure.
    pub agent_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            aggregation_model: None,
            call_timeout_seconds: 120,
            max_concurrent_calls: 2,
            agent_retries: 0,
            retry_backoff_ms: 1_000,
        }
    }
}

impl AgentsConfig {
    pub fn aggregation_model(&self) -> &str {
        self.aggregation_model.as_deref().unwrap_or(&self.model)
    }
}

/// Configuration for the portfolio fan-out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortfolioConfig {
    pub context_policy: ContextPolicy,
    pub failure_policy: FailurePolicy,
    /// Tickers processed at once. 1 runs them sequentially.
    pub max_concurrent_tickers: usize,
    /// Pause before each ticker after the first when running sequentially.
    pub ticker_delay_ms: u64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            context_policy: ContextPolicy::Full,
            failure_policy: FailurePolicy::Continue,
            max_concurrent_tickers: 1,
            ticker_delay_ms: 0,
        }
    }
}

/// How prior agent outputs are threaded into the next agent's context.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextPolicy {
    /// Every prior output, verbatim and in order.
    #[default]
    Full,
    /// Only the ticker facts; outputs are collected, never chained.
    Independent,
    /// Analysts see only the facts; Investment sees truncated digests of their outputs.
    Digest { max_chars: usize },
}

impl ContextPolicy {
    pub const DEFAULT_DIGEST_CHARS: usize = 500;

    pub fn label(&self) -> &'static str {
        match self {
            ContextPolicy::Full => "full",
            ContextPolicy::Independent => "independent",
            ContextPolicy::Digest { .. } => "digest",
        }
    }
}

impl FromStr for ContextPolicy {
    type Err = String;

    /// Accepts `full`, `independent`, `digest` or `digest:<max_chars>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split_once(':') {
            None => match lower.as_str() {
                "full" => Ok(ContextPolicy::Full),
                "independent" => Ok(ContextPolicy::Independent),
                "digest" => Ok(ContextPolicy::Digest {
                    max_chars: Self::DEFAULT_DIGEST_CHARS,
                }),
                other => Err(format!("unknown context policy: {other}")),
            },
            Some(("digest", n)) => n
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(|max_chars| ContextPolicy::Digest { max_chars })
                .ok_or_else(|| format!("invalid digest length: {n}")),
            Some((other, _)) => Err(format!("unknown context policy: {other}")),
        }
    }
}

/// What a failed non-terminal agent does to the rest of its ticker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the gap and keep going with the best available context.
    #[default]
    Continue,
    /// Stop the ticker at the first failed agent.
    AbortTicker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_stockdesk_config() {
        let config = StockdeskConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: StockdeskConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn aggregation_model_falls_back() {
        let mut agents = AgentsConfig::default();
        assert_eq!(agents.aggregation_model(), "claude-3-5-haiku-latest");
        agents.aggregation_model = Some("claude-sonnet-4-5-20250929".to_string());
        assert_eq!(agents.aggregation_model(), "claude-sonnet-4-5-20250929");
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[market]
sqlite_path = "/tmp/snapshots.db"

[agents]
model = "claude-3-5-haiku-latest"
max_concurrent_calls = 4
agent_retries = 2

[portfolio]
failure_policy = "abort_ticker"
max_concurrent_tickers = 3

[portfolio.context_policy]
kind = "digest"
max_chars = 800
"#;

        let config: StockdeskConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.market.sqlite_path, "/tmp/snapshots.db");
        assert_eq!(config.market.memory_ttl_seconds, 300);
        assert_eq!(config.agents.max_concurrent_calls, 4);
        assert_eq!(config.agents.agent_retries, 2);
        assert_eq!(config.portfolio.failure_policy, FailurePolicy::AbortTicker);
        assert_eq!(
            config.portfolio.context_policy,
            ContextPolicy::Digest { max_chars: 800 }
        );
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: StockdeskConfig = toml::from_str("").unwrap();
        assert_eq!(config, StockdeskConfig::default());
        assert_eq!(config.portfolio.max_concurrent_tickers, 1);
    }

    #[test]
    fn parse_context_policy() {
        assert_eq!("full".parse::<ContextPolicy>(), Ok(ContextPolicy::Full));
        assert_eq!(
            "Independent".parse::<ContextPolicy>(),
            Ok(ContextPolicy::Independent)
        );
        assert_eq!(
            "digest".parse::<ContextPolicy>(),
            Ok(ContextPolicy::Digest { max_chars: 500 })
        );
        assert_eq!(
            "digest:200".parse::<ContextPolicy>(),
            Ok(ContextPolicy::Digest { max_chars: 200 })
        );
        assert!("digest:0".parse::<ContextPolicy>().is_err());
        assert!("chained".parse::<ContextPolicy>().is_err());
    }
}
