use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_result::AgentResult;
use crate::agent_spec::AgentRole;
use crate::config::ContextPolicy;

/// Why a ticker produced no usable recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickerFailure {
    /// The market-data collaborator had nothing for this ticker; no agent ran.
    MarketDataUnavailable { reason: String },
    /// The Investment agent failed or was never reached.
    InvestmentFailed { reason: String },
    /// A non-terminal agent failed under the abort-ticker policy.
    AgentAborted { role: AgentRole, reason: String },
    /// The ticker task panicked or was torn down.
    Crashed { reason: String },
}

impl std::fmt::Display for TickerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickerFailure::MarketDataUnavailable { reason } => {
                write!(f, "market data unavailable: {reason}")
            }
            TickerFailure::InvestmentFailed { reason } => {
                write!(f, "investment recommendation failed: {reason}")
            }
            TickerFailure::AgentAborted { role, reason } => {
                write!(f, "aborted after {role} failed: {reason}")
            }
            TickerFailure::Crashed { reason } => write!(f, "ticker task crashed: {reason}"),
        }
    }
}

/// Terminal state of a single-ticker pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", content = "failure", rename_all = "snake_case")]
pub enum TickerStatus {
    /// Every agent succeeded.
    Completed,
    /// At least one analyst failed, but Investment still produced output.
    PartiallyFailed,
    Failed(TickerFailure),
    /// Stopped by the caller before Investment finished.
    Cancelled,
}

impl TickerStatus {
    /// True when the run produced a final Investment recommendation.
    pub fn is_usable(&self) -> bool {
        matches!(self, TickerStatus::Completed | TickerStatus::PartiallyFailed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TickerStatus::Completed => "completed",
            TickerStatus::PartiallyFailed => "partially_failed",
            TickerStatus::Failed(_) => "failed",
            TickerStatus::Cancelled => "cancelled",
        }
    }
}

/// All agent results for one ticker, in pipeline order. Sealed once returned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickerRun {
    pub ticker: String,
    pub results: Vec<AgentResult>,
    pub status: TickerStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TickerRun {
    pub fn new(
        ticker: &str,
        results: Vec<AgentResult>,
        status: TickerStatus,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticker: ticker.to_string(),
            results,
            status,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// A run that failed before any agent was invoked.
    pub fn failed_early(ticker: &str, failure: TickerFailure, started_at: DateTime<Utc>) -> Self {
        Self::new(ticker, Vec::new(), TickerStatus::Failed(failure), started_at)
    }

    pub fn is_usable(&self) -> bool {
        self.status.is_usable()
    }

    pub fn result(&self, role: AgentRole) -> Option<&AgentResult> {
        self.results.iter().find(|r| r.role == role)
    }

    /// Normalized Investment text, if that agent succeeded.
    pub fn investment_output(&self) -> Option<&str> {
        self.result(AgentRole::Investment).and_then(|r| r.output())
    }

    pub fn failed_roles(&self) -> Vec<AgentRole> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.role)
            .collect()
    }
}

/// Why no aggregated recommendation was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationSkipped {
    NoUsableTickers,
    Cancelled,
}

impl std::fmt::Display for AggregationSkipped {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationSkipped::NoUsableTickers => {
                write!(f, "no ticker produced a usable recommendation")
            }
            AggregationSkipped::Cancelled => write!(f, "run was cancelled"),
        }
    }
}

/// Result of one portfolio invocation.
///
/// `tickers` holds exactly one run per requested ticker, in caller order.
/// `aggregated_recommendation` is derived only from usable runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub context_policy: ContextPolicy,
    pub tickers: Vec<TickerRun>,
    pub aggregated_recommendation: Option<AgentResult>,
    pub aggregation_skipped: Option<AggregationSkipped>,
}

impl PortfolioRun {
    /// Look up a ticker the way it was requested. Stored keys are trimmed
    /// and upper-cased, so `get(" aapl")` finds `AAPL`.
    pub fn get(&self, ticker: &str) -> Option<&TickerRun> {
        let wanted = ticker.trim();
        self.tickers
            .iter()
            .find(|t| t.ticker.eq_ignore_ascii_case(wanted))
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.tickers.iter().map(|t| t.ticker.as_str()).collect()
    }

    pub fn usable_count(&self) -> usize {
        self.tickers.iter().filter(|t| t.is_usable()).count()
    }

    /// `(ticker, investment text)` for every usable run, in caller order.
    pub fn aggregation_inputs(&self) -> Vec<(&str, &str)> {
        self.tickers
            .iter()
            .filter(|t| t.is_usable())
            .filter_map(|t| t.investment_output().map(|out| (t.ticker.as_str(), out)))
            .collect()
    }

    /// Aggregated strategy text, if aggregation ran and succeeded.
    pub fn strategy(&self) -> Option<&str> {
        self.aggregated_recommendation
            .as_ref()
            .and_then(|r| r.output())
    }
}
