use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use stockdesk_market::MarketDataSource;
use stockdesk_models::{
    AgentRole, AggregationSkipped, ContextPolicy, PortfolioConfig, PortfolioRun,
    TickerFailure, TickerRun, TickerStatus,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::invoker::ModelInvoker;
use crate::pipeline::{run_agent, AgentStep, TickerPipeline};
use crate::prompts::task_line;

/// Trim, upper-case and de-duplicate tickers, keeping first-seen order.
pub fn normalize_tickers<S: AsRef<str>>(tickers: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tickers.len());
    for t in tickers {
        let symbol = t.as_ref().trim().to_ascii_uppercase();
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

/// Fans a ticker list out to independent pipelines and aggregates the
/// usable recommendations into one portfolio strategy.
pub struct PortfolioOrchestrator {
    market: Arc<dyn MarketDataSource>,
    pipeline: Arc<TickerPipeline>,
    aggregator: ModelInvoker,
    config: PortfolioConfig,
}

impl PortfolioOrchestrator {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        pipeline: Arc<TickerPipeline>,
        aggregator: ModelInvoker,
        config: PortfolioConfig,
    ) -> Self {
        Self {
            market,
            pipeline,
            aggregator,
            config,
        }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub async fn run<S: AsRef<str>>(&self, tickers: &[S], policy: ContextPolicy) -> PortfolioRun {
        self.run_with_cancel(tickers, policy, CancellationToken::new())
            .await
    }

    /// Run every ticker, then aggregate. Always returns a run with exactly one
    /// entry per distinct ticker, in caller order.
    pub async fn run_with_cancel<S: AsRef<str>>(
        &self,
        tickers: &[S],
        policy: ContextPolicy,
        cancel: CancellationToken,
    ) -> PortfolioRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let symbols = normalize_tickers(tickers);
        let max_tickers = self.config.max_concurrent_tickers.max(1);
        let delay = match (max_tickers, self.config.ticker_delay_ms) {
            (1, ms) if ms > 0 => Some(Duration::from_millis(ms)),
            _ => None,
        };
        info!(
            %run_id,
            tickers = symbols.len(),
            policy = policy.label(),
            max_concurrent_tickers = max_tickers,
            "Starting portfolio run"
        );

        let limiter = Arc::new(Semaphore::new(max_tickers));
        let mut handles = Vec::with_capacity(symbols.len());
        for (index, symbol) in symbols.iter().enumerate() {
            let market = Arc::clone(&self.market);
            let pipeline = Arc::clone(&self.pipeline);
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            let ticker = symbol.clone();
            let queued_at = Utc::now();

            let handle = tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                if let Some(delay) = delay.filter(|_| index > 0) {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                run_ticker(market.as_ref(), &pipeline, &ticker, policy, &cancel).await
            });
            handles.push((symbol.clone(), queued_at, handle));
        }

        let mut runs = Vec::with_capacity(handles.len());
        for (symbol, queued_at, handle) in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    error!(ticker = %symbol, error = %e, "Ticker task panicked");
                    runs.push(TickerRun::failed_early(
                        &symbol,
                        TickerFailure::Crashed {
                            reason: e.to_string(),
                        },
                        queued_at,
                    ));
                }
            }
        }

        let mut portfolio = PortfolioRun {
            run_id,
            started_at,
            finished_at: started_at,
            context_policy: policy,
            tickers: runs,
            aggregated_recommendation: None,
            aggregation_skipped: None,
        };

        if cancel.is_cancelled() {
            info!(%run_id, "Run cancelled; skipping aggregation");
            portfolio.aggregation_skipped = Some(AggregationSkipped::Cancelled);
        } else if portfolio.aggregation_inputs().is_empty() {
            warn!(%run_id, "No usable tickers; skipping aggregation");
            portfolio.aggregation_skipped = Some(AggregationSkipped::NoUsableTickers);
        } else {
            match self.aggregate(&portfolio, &cancel).await {
                AgentStep::Finished(result) => portfolio.aggregated_recommendation = Some(result),
                AgentStep::Interrupted(_) => {
                    info!(%run_id, "Run cancelled during aggregation retries");
                    portfolio.aggregation_skipped = Some(AggregationSkipped::Cancelled);
                }
            }
        }

        portfolio.finished_at = Utc::now();
        info!(
            %run_id,
            usable = portfolio.usable_count(),
            total = portfolio.tickers.len(),
            aggregated = portfolio.strategy().is_some(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Portfolio run complete"
        );
        portfolio
    }

    /// One aggregation call over every usable Investment output.
    async fn aggregate(&self, portfolio: &PortfolioRun, cancel: &CancellationToken) -> AgentStep {
        let inputs = portfolio.aggregation_inputs();
        let covered: Vec<&str> = inputs.iter().map(|(t, _)| *t).collect();
        let label = covered.join(",");
        let context = aggregation_context(&inputs);
        info!(tickers = %label, "Aggregating portfolio recommendations");

        let spec = self.pipeline.table().get(AgentRole::Aggregation);
        run_agent(
            &self.aggregator,
            self.pipeline.options(),
            spec,
            &label,
            &context,
            cancel,
        )
        .await
    }
}

async fn run_ticker(
    market: &dyn MarketDataSource,
    pipeline: &TickerPipeline,
    ticker: &str,
    policy: ContextPolicy,
    cancel: &CancellationToken,
) -> TickerRun {
    let started_at = Utc::now();
    if cancel.is_cancelled() {
        return TickerRun::new(ticker, Vec::new(), TickerStatus::Cancelled, started_at);
    }

    let snapshot = match market.snapshot(ticker).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(ticker, error = %e, "No market data; skipping agents");
            return TickerRun::failed_early(
                ticker,
                TickerFailure::MarketDataUnavailable {
                    reason: e.to_string(),
                },
                started_at,
            );
        }
    };

    pipeline
        .run(ticker, &snapshot.to_context(), policy, cancel)
        .await
}

/// Context for the aggregation role: one `## <TICKER> Analysis` block per
/// usable ticker, followed by the task line.
fn aggregation_context(inputs: &[(&str, &str)]) -> String {
    let tickers: Vec<&str> = inputs.iter().map(|(t, _)| *t).collect();
    let mut out = format!(
        "Portfolio of {} stocks: {}\n\n",
        tickers.len(),
        tickers.join(", ")
    );
    for (ticker, text) in inputs {
        out.push_str(&format!("## {ticker} Analysis\n\n{text}\n\n"));
    }
    out.push_str(&task_line(AgentRole::Aggregation, &tickers.join(", ")));
    out
}
