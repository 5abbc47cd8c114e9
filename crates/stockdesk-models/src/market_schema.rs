use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The SQLite table the market-data collector writes and stockdesk reads.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS market_entries (
///     key         TEXT PRIMARY KEY,
///     ticker      TEXT NOT NULL,
///     value_json  TEXT NOT NULL,
///     source      TEXT NOT NULL,
///     fetched_at  TEXT NOT NULL,
///     expires_at  TEXT NOT NULL
/// );
/// ```
pub const MARKET_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS market_entries (
    key         TEXT PRIMARY KEY,
    ticker      TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    fetched_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_market_ticker ON market_entries(ticker);
CREATE INDEX IF NOT EXISTS idx_market_expires ON market_entries(expires_at);
";

/// Key conventions for `market_entries`.
///
/// - Latest quote: `quote:{ticker}`
/// - Daily price history: `history:{ticker}`
/// - Recent headlines: `news:{ticker}`
pub mod key_patterns {
    pub fn quote(ticker: &str) -> String {
        format!("quote:{ticker}")
    }

    pub fn history(ticker: &str) -> String {
        format!("history:{ticker}")
    }

    pub fn news(ticker: &str) -> String {
        format!("news:{ticker}")
    }
}

/// A raw row as read from SQLite.
#[derive(Debug, Clone)]
pub struct MarketRow {
    pub key: String,
    pub ticker: String,
    pub value_json: String,
    pub source: String,
    pub fetched_at: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub price: f64,
    #[serde(default)]
    pub change_percent: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Per-ticker facts handed to the agent pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub quote: Option<Quote>,
    pub price_history: Vec<PriceBar>,
    pub news: Vec<NewsItem>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Bars rendered into the facts block. Older bars are dropped.
    pub const HISTORY_ROWS: usize = 30;
    pub const NEWS_ITEMS: usize = 5;

    pub fn has_price_data(&self) -> bool {
        self.quote.is_some() || !self.price_history.is_empty()
    }

    /// Render the opaque facts block the agents analyze.
    pub fn to_context(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Analyze the stock {} using the following data:", self.ticker);
        let _ = writeln!(out, "Ticker: {}", self.ticker);
        let _ = writeln!(out, "Snapshot time: {}", self.fetched_at.to_rfc3339());

        out.push_str("\nReal-time data:\n");
        match &self.quote {
            Some(q) => {
                let _ = write!(out, "Price: {:.2}", q.price);
                if let Some(change) = q.change_percent {
                    let _ = write!(out, " | Change: {change:+.2}%");
                }
                if let Some(volume) = q.volume {
                    let _ = write!(out, " | Volume: {volume:.0}");
                }
                out.push('\n');
            }
            None => out.push_str("Data unavailable\n"),
        }

        out.push_str("\nHistorical data:\n");
        if self.price_history.is_empty() {
            out.push_str("Data unavailable\n");
        } else {
            let skip = self.price_history.len().saturating_sub(Self::HISTORY_ROWS);
            out.push_str("date | open | high | low | close | volume\n");
            for bar in self.price_history.iter().skip(skip) {
                let _ = writeln!(
                    out,
                    "{} | {:.2} | {:.2} | {:.2} | {:.2} | {:.0}",
                    bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
                );
            }
        }

        out.push_str("\nNews data:\n");
        if self.news.is_empty() {
            out.push_str("No recent news available\n");
        } else {
            for item in self.news.iter().take(Self::NEWS_ITEMS) {
                out.push_str("- ");
                if let Some(date) = &item.published_date {
                    let _ = write!(out, "[{date}] ");
                }
                out.push_str(&item.title);
                if let Some(source) = &item.source {
                    let _ = write!(out, " ({source})");
                }
                out.push('\n');
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> PriceBar {
        PriceBar {
            date: date.to_string(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000_000.0,
        }
    }

    #[test]
    fn key_patterns() {
        assert_eq!(key_patterns::quote("AAPL"), "quote:AAPL");
        assert_eq!(key_patterns::history("MSFT"), "history:MSFT");
        assert_eq!(key_patterns::news("TSLA"), "news:TSLA");
    }

    #[test]
    fn context_contains_all_sections() {
        let snapshot = MarketSnapshot {
            ticker: "AAPL".to_string(),
            quote: Some(Quote {
                price: 189.5,
                change_percent: Some(1.25),
                volume: Some(52_000_000.0),
            }),
            price_history: vec![bar("2026-10-14", 187.0), bar("2026-10-15", 189.5)],
            news: vec![NewsItem {
                title: "Apple unveils new chips".to_string(),
                published_date: Some("2026-10-15".to_string()),
                source: Some("Reuters".to_string()),
                url: None,
            }],
            fetched_at: Utc::now(),
        };

        let context = snapshot.to_context();
        assert!(context.contains("Ticker: AAPL"));
        assert!(context.contains("Price: 189.50 | Change: +1.25%"));
        assert!(context.contains("2026-10-15 | 188.50"));
        assert!(context.contains("- [2026-10-15] Apple unveils new chips (Reuters)"));
        assert!(snapshot.has_price_data());
    }

    #[test]
    fn missing_sections_are_marked() {
        let snapshot = MarketSnapshot {
            ticker: "XYZ".to_string(),
            quote: None,
            price_history: vec![],
            news: vec![],
            fetched_at: Utc::now(),
        };
        let context = snapshot.to_context();
        assert_eq!(context.matches("Data unavailable").count(), 2);
        assert!(context.contains("No recent news available"));
        assert!(!snapshot.has_price_data());
    }

    #[test]
    fn history_is_capped_to_recent_rows() {
        let bars: Vec<_> = (0..40)
            .map(|i| bar(&format!("day-{i:02}"), 100.0 + i as f64))
            .collect();
        let snapshot = MarketSnapshot {
            ticker: "AAPL".to_string(),
            quote: None,
            price_history: bars,
            news: vec![],
            fetched_at: Utc::now(),
        };
        let context = snapshot.to_context();
        assert!(!context.contains("day-09 "));
        assert!(context.contains("day-10 "));
        assert!(context.contains("day-39 "));
    }
}
