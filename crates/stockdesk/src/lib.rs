//! stockdesk - multi-agent equity research desk
//!
//! Runs a fixed chain of analyst agents (stock, market, macro, news,
//! investment) per ticker over a market-data snapshot, then aggregates the
//! usable recommendations into one portfolio strategy.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use stockdesk::models::{ContextPolicy, StockdeskConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = StockdeskConfig::default();
//! let orchestrator = stockdesk::build_orchestrator(&config)?;
//! let run = stockdesk::analyze(
//!     &orchestrator,
//!     &["AAPL".to_string(), "MSFT".to_string()],
//!     ContextPolicy::Full,
//!     CancellationToken::new(),
//! )
//! .await;
//! println!("{} usable tickers", run.usable_count());
//! # Ok(())
//! # }
//! ```

pub mod artifacts;
pub mod report;

pub use stockdesk_agents as agents;
pub use stockdesk_market as market;
pub use stockdesk_models as models;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use stockdesk_agents::{
    default_agent_specs, ClaudeCliGenerator, GenerationService, ModelInvoker, PipelineOptions,
    PortfolioOrchestrator, TickerPipeline,
};
use stockdesk_market::{MarketDataSource, MarketReader, SnapshotStore};
use stockdesk_models::{ContextPolicy, PortfolioRun, StockdeskConfig};
use tokio_util::sync::CancellationToken;

/// Build an orchestrator backed by the SQLite snapshot store and the Claude CLI.
pub fn build_orchestrator(config: &StockdeskConfig) -> Result<PortfolioOrchestrator, anyhow::Error> {
    let store = SnapshotStore::open(&config.market.sqlite_path).with_context(|| {
        format!(
            "Failed to open market snapshot database: {}",
            config.market.sqlite_path
        )
    })?;
    let market = Arc::new(MarketReader::new(
        store,
        config.market.memory_max_capacity,
        Duration::from_secs(config.market.memory_ttl_seconds),
    ));

    let timeout = Duration::from_secs(config.agents.call_timeout_seconds);
    let analyst = Arc::new(ClaudeCliGenerator::new(config.agents.model.clone(), timeout));
    let aggregator = Arc::new(ClaudeCliGenerator::new(
        config.agents.aggregation_model(),
        timeout,
    ));

    Ok(build_orchestrator_with(config, market, analyst, aggregator))
}

/// Build an orchestrator from explicit collaborators. Both generation
/// services draw from one `max_concurrent_calls` ceiling.
pub fn build_orchestrator_with(
    config: &StockdeskConfig,
    market: Arc<dyn MarketDataSource>,
    analyst: Arc<dyn GenerationService>,
    aggregator: Arc<dyn GenerationService>,
) -> PortfolioOrchestrator {
    let invoker = ModelInvoker::new(analyst, config.agents.max_concurrent_calls);
    let aggregator = invoker.with_service(aggregator);
    let pipeline = TickerPipeline::new(
        invoker,
        default_agent_specs(),
        PipelineOptions::from_config(&config.agents, &config.portfolio),
    );
    PortfolioOrchestrator::new(market, Arc::new(pipeline), aggregator, config.portfolio.clone())
}

/// Analyze a ticker list using the given orchestrator.
pub async fn analyze(
    orchestrator: &PortfolioOrchestrator,
    tickers: &[String],
    policy: ContextPolicy,
    cancel: CancellationToken,
) -> PortfolioRun {
    orchestrator.run_with_cancel(tickers, policy, cancel).await
}

/// Process exit status for a finished run: failure only when no ticker
/// produced a usable recommendation.
pub fn exit_status(run: &PortfolioRun) -> ExitCode {
    if run.usable_count() == 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Read and parse a TOML config file.
pub fn load_config(path: &str) -> Result<StockdeskConfig, anyhow::Error> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))
}
