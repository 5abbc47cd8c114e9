use std::time::{Duration, Instant};

use chrono::Utc;
use stockdesk_models::{
    AgentResult, AgentRole, AgentSpec, AgentsConfig, ContextPolicy, FailurePolicy,
    PortfolioConfig, TickerFailure, TickerRun, TickerStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::{ContextEntry, ContextLog};
use crate::error::AgentError;
use crate::invoker::ModelInvoker;
use crate::normalizer::{conform, normalize};
use crate::prompts::AgentTable;

/// Per-ticker knobs for the agent chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub failure_policy: FailurePolicy,
    /// Extra attempts after a transport failure.
    pub agent_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Continue,
            agent_retries: 0,
            retry_backoff: Duration::from_millis(1_000),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(agents: &AgentsConfig, portfolio: &PortfolioConfig) -> Self {
        Self {
            failure_policy: portfolio.failure_policy,
            agent_retries: agents.agent_retries,
            retry_backoff: Duration::from_millis(agents.retry_backoff_ms),
        }
    }
}

/// Runs the five-role chain for one ticker.
///
/// Agents run strictly in order; each sees a context built from the ticker
/// facts and, depending on the policy, what earlier agents produced.
pub struct TickerPipeline {
    invoker: ModelInvoker,
    table: AgentTable,
    options: PipelineOptions,
}

impl TickerPipeline {
    pub fn new(invoker: ModelInvoker, table: AgentTable, options: PipelineOptions) -> Self {
        Self {
            invoker,
            table,
            options,
        }
    }

    pub fn table(&self) -> &AgentTable {
        &self.table
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every pipeline role for `ticker`. Never returns an error: failures
    /// are recorded in the run's results and status.
    pub async fn run(
        &self,
        ticker: &str,
        facts: &str,
        policy: ContextPolicy,
        cancel: &CancellationToken,
    ) -> TickerRun {
        let started_at = Utc::now();
        let start = Instant::now();
        info!(ticker, policy = policy.label(), "Starting ticker pipeline");

        let mut log = ContextLog::new();
        let mut results: Vec<AgentResult> = Vec::with_capacity(AgentRole::PIPELINE.len());

        for role in AgentRole::PIPELINE {
            if cancel.is_cancelled() {
                info!(ticker, next = role.name(), "Ticker cancelled");
                return TickerRun::new(ticker, results, TickerStatus::Cancelled, started_at);
            }

            let spec = self.table.get(role);
            let context = log.render(policy, role, ticker, facts);
            let result =
                match run_agent(&self.invoker, &self.options, spec, ticker, &context, cancel).await {
                    AgentStep::Finished(result) => result,
                    AgentStep::Interrupted(result) => {
                        info!(ticker, agent = role.name(), "Ticker cancelled during retries");
                        results.push(result);
                        return TickerRun::new(ticker, results, TickerStatus::Cancelled, started_at);
                    }
                };

            match result.output() {
                Some(text) => {
                    log = log.with(ContextEntry::Output {
                        role,
                        text: text.to_string(),
                    });
                    results.push(result);
                }
                None => {
                    let reason = result.failure_reason().unwrap_or_default().to_string();
                    results.push(result);

                    if role.is_terminal() {
                        warn!(ticker, %reason, "Investment agent failed; no recommendation");
                        return TickerRun::new(
                            ticker,
                            results,
                            TickerStatus::Failed(TickerFailure::InvestmentFailed { reason }),
                            started_at,
                        );
                    }

                    match self.options.failure_policy {
                        FailurePolicy::Continue => {
                            log = log.with(ContextEntry::Gap { role, reason });
                        }
                        FailurePolicy::AbortTicker => {
                            warn!(ticker, agent = role.name(), "Aborting ticker after agent failure");
                            return TickerRun::new(
                                ticker,
                                results,
                                TickerStatus::Failed(TickerFailure::AgentAborted { role, reason }),
                                started_at,
                            );
                        }
                    }
                }
            }
        }

        let status = if results.iter().all(AgentResult::is_success) {
            TickerStatus::Completed
        } else {
            TickerStatus::PartiallyFailed
        };
        info!(
            ticker,
            status = status.label(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Ticker pipeline complete"
        );
        TickerRun::new(ticker, results, status, started_at)
    }
}

/// How one agent step ended.
pub(crate) enum AgentStep {
    Finished(AgentResult),
    /// A transport failure whose retries were cut short by cancellation.
    Interrupted(AgentResult),
}

/// Invoke one agent, retrying transport failures, then normalize.
///
/// A call already in flight always completes; cancellation only stops
/// further retries.
pub(crate) async fn run_agent(
    invoker: &ModelInvoker,
    options: &PipelineOptions,
    spec: &AgentSpec,
    ticker: &str,
    context: &str,
    cancel: &CancellationToken,
) -> AgentStep {
    let start = Instant::now();
    let max_attempts = options.agent_retries.saturating_add(1);
    let mut attempts = 0;
    let mut interrupted = false;

    let outcome = loop {
        attempts += 1;
        match invoker.invoke(spec, context).await {
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                if cancel.is_cancelled() {
                    interrupted = true;
                    break Err((None, AgentError::from(e)));
                }
                warn!(
                    ticker,
                    agent = spec.role_name(),
                    attempt = attempts,
                    error = %e,
                    "Retrying agent after transport failure"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        interrupted = true;
                        break Err((None, AgentError::from(e)));
                    }
                    _ = tokio::time::sleep(options.retry_backoff) => {}
                }
            }
            Err(e) => break Err((None, AgentError::from(e))),
            Ok(raw) => {
                let checked = normalize(&raw)
                    .and_then(|text| conform(spec.expected_output_kind, &text).map(|()| text));
                break match checked {
                    Ok(text) => Ok((raw, text)),
                    Err(e) => Err((Some(raw), AgentError::from(e))),
                };
            }
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let result = match outcome {
        Ok((raw, text)) => {
            debug!(ticker, agent = spec.role_name(), attempts, elapsed_ms, "Agent succeeded");
            AgentResult::success(spec.role, ticker, raw, text, attempts, elapsed_ms)
        }
        Err((raw, e)) => {
            warn!(ticker, agent = spec.role_name(), attempts, error = %e, "Agent failed");
            AgentResult::failed(spec.role, ticker, raw, e.kind(), e.to_string(), attempts, elapsed_ms)
        }
    };
    if interrupted {
        AgentStep::Interrupted(result)
    } else {
        AgentStep::Finished(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stockdesk_models::AgentFailureKind;

    use super::*;
    use crate::prompts::default_agent_specs;
    use crate::test_support::{marker, sample_snapshot, Fault, ScriptedGenerator};

    fn pipeline(generator: Arc<ScriptedGenerator>, options: PipelineOptions) -> TickerPipeline {
        TickerPipeline::new(ModelInvoker::new(generator, 2), default_agent_specs(), options)
    }

    fn facts(ticker: &str) -> String {
        sample_snapshot(ticker, 190.0).to_context()
    }

    #[tokio::test]
    async fn all_agents_succeed_in_order() {
        let generator = Arc::new(ScriptedGenerator::default());
        let run = pipeline(generator.clone(), PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        assert_eq!(run.status, TickerStatus::Completed);
        let roles: Vec<_> = run.results.iter().map(|r| r.role).collect();
        assert_eq!(roles, AgentRole::PIPELINE.to_vec());
        assert!(run.investment_output().unwrap().contains("RECOMMENDATION: BUY"));
        assert_eq!(generator.call_count(), 5);
        assert!(run.results.iter().all(|r| r.ticker == "AAPL" && r.attempts == 1));
    }

    #[tokio::test]
    async fn full_policy_threads_prior_outputs() {
        let generator = Arc::new(ScriptedGenerator::default());
        pipeline(generator.clone(), PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        let investment = &generator.calls_for("AAPL", AgentRole::Investment)[0].context;
        let mut last = 0;
        for role in [AgentRole::Stock, AgentRole::Market, AgentRole::Macro, AgentRole::News] {
            let at = investment.find(&marker(role, "AAPL")).unwrap();
            assert!(at > last, "{role} out of order");
            last = at;
        }
    }

    #[tokio::test]
    async fn analyst_failure_continues_with_gap() {
        let generator = Arc::new(ScriptedGenerator::default().fail(
            "AAPL",
            AgentRole::Macro,
            Fault::Transport,
        ));
        let run = pipeline(generator.clone(), PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        assert_eq!(run.status, TickerStatus::PartiallyFailed);
        assert_eq!(run.failed_roles(), vec![AgentRole::Macro]);
        assert_eq!(run.results.len(), 5);

        let news = &generator.calls_for("AAPL", AgentRole::News)[0].context;
        assert!(news.contains("### MacroAgent output unavailable: transport failure"));
    }

    #[tokio::test]
    async fn investment_failure_fails_ticker() {
        let generator = Arc::new(ScriptedGenerator::default().fail(
            "AAPL",
            AgentRole::Investment,
            Fault::Empty,
        ));
        let run = pipeline(generator, PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        assert!(matches!(
            run.status,
            TickerStatus::Failed(TickerFailure::InvestmentFailed { .. })
        ));
        let investment = run.result(AgentRole::Investment).unwrap();
        assert!(matches!(
            &investment.status,
            stockdesk_models::AgentStatus::Failed { kind: AgentFailureKind::EmptyResponse, .. }
        ));
        assert!(!run.is_usable());
    }

    #[tokio::test]
    async fn unusable_output_keeps_raw_text() {
        let generator = Arc::new(ScriptedGenerator::default().fail(
            "AAPL",
            AgentRole::Stock,
            Fault::Unusable,
        ));
        let run = pipeline(generator, PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        let stock = run.result(AgentRole::Stock).unwrap();
        assert!(stock.raw_text.is_some());
        assert!(stock.normalized_text.is_none());
        assert!(matches!(
            &stock.status,
            stockdesk_models::AgentStatus::Failed { kind: AgentFailureKind::Unusable, .. }
        ));
    }

    #[tokio::test]
    async fn abort_policy_stops_at_first_failure() {
        let generator = Arc::new(ScriptedGenerator::default().fail(
            "AAPL",
            AgentRole::Market,
            Fault::Transport,
        ));
        let options = PipelineOptions {
            failure_policy: FailurePolicy::AbortTicker,
            ..PipelineOptions::default()
        };
        let run = pipeline(generator.clone(), options)
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        assert!(matches!(
            run.status,
            TickerStatus::Failed(TickerFailure::AgentAborted { role: AgentRole::Market, .. })
        ));
        assert_eq!(run.results.len(), 2);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_retried() {
        let generator = Arc::new(ScriptedGenerator::default().fail_times(
            "AAPL",
            AgentRole::Stock,
            Fault::Transport,
            2,
        ));
        let options = PipelineOptions {
            agent_retries: 2,
            retry_backoff: Duration::from_millis(50),
            ..PipelineOptions::default()
        };
        let run = pipeline(generator.clone(), options)
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        assert_eq!(run.status, TickerStatus::Completed);
        assert_eq!(run.result(AgentRole::Stock).unwrap().attempts, 3);
        assert_eq!(generator.calls_for("AAPL", AgentRole::Stock).len(), 3);
    }

    #[tokio::test]
    async fn empty_responses_are_not_retried() {
        let generator = Arc::new(ScriptedGenerator::default().fail_times(
            "AAPL",
            AgentRole::Stock,
            Fault::Empty,
            1,
        ));
        let options = PipelineOptions {
            agent_retries: 3,
            ..PipelineOptions::default()
        };
        let run = pipeline(generator.clone(), options)
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        assert_eq!(run.result(AgentRole::Stock).unwrap().attempts, 1);
        assert_eq!(run.status, TickerStatus::PartiallyFailed);
    }

    #[tokio::test]
    async fn cancellation_before_investment_cancels_ticker() {
        let cancel = CancellationToken::new();
        let generator = Arc::new(ScriptedGenerator::default().cancel_on(
            "AAPL",
            AgentRole::Macro,
            cancel.clone(),
        ));
        let run = pipeline(generator.clone(), PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &cancel)
            .await;

        assert_eq!(run.status, TickerStatus::Cancelled);
        assert!(run.result(AgentRole::Investment).is_none());
        assert!(generator.calls_for("AAPL", AgentRole::News).is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_retries_but_keeps_result() {
        let cancel = CancellationToken::new();
        let generator = Arc::new(
            ScriptedGenerator::default()
                .fail("AAPL", AgentRole::Stock, Fault::Transport)
                .cancel_on("AAPL", AgentRole::Stock, cancel.clone()),
        );
        let options = PipelineOptions {
            agent_retries: 5,
            ..PipelineOptions::default()
        };
        let run = pipeline(generator.clone(), options)
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &cancel)
            .await;

        assert_eq!(run.status, TickerStatus::Cancelled);
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.results[0].attempts, 1);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn abort_during_investment_retries_is_not_a_failure() {
        let cancel = CancellationToken::new();
        let generator = Arc::new(
            ScriptedGenerator::default()
                .fail("AAPL", AgentRole::Investment, Fault::Transport)
                .cancel_on("AAPL", AgentRole::Investment, cancel.clone()),
        );
        let options = PipelineOptions {
            agent_retries: 3,
            ..PipelineOptions::default()
        };
        let run = pipeline(generator.clone(), options)
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &cancel)
            .await;

        assert_eq!(run.status, TickerStatus::Cancelled);
        assert_eq!(run.results.len(), 5);
        assert!(!run.result(AgentRole::Investment).unwrap().is_success());
        assert_eq!(generator.calls_for("AAPL", AgentRole::Investment).len(), 1);
    }

    #[tokio::test]
    async fn abort_during_retries_beats_abort_ticker_policy() {
        let cancel = CancellationToken::new();
        let generator = Arc::new(
            ScriptedGenerator::default()
                .fail("AAPL", AgentRole::Market, Fault::Transport)
                .cancel_on("AAPL", AgentRole::Market, cancel.clone()),
        );
        let options = PipelineOptions {
            failure_policy: FailurePolicy::AbortTicker,
            agent_retries: 2,
            ..PipelineOptions::default()
        };
        let run = pipeline(generator, options)
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &cancel)
            .await;

        assert_eq!(run.status, TickerStatus::Cancelled);
        assert_eq!(run.results.len(), 2);
    }

    #[tokio::test]
    async fn investment_without_headers_is_unusable() {
        let generator = Arc::new(ScriptedGenerator::default().fail(
            "AAPL",
            AgentRole::Investment,
            Fault::Headerless,
        ));
        let run = pipeline(generator, PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &CancellationToken::new())
            .await;

        assert!(matches!(
            run.status,
            TickerStatus::Failed(TickerFailure::InvestmentFailed { .. })
        ));
        let investment = run.result(AgentRole::Investment).unwrap();
        assert!(investment.raw_text.as_deref().unwrap().contains("go long"));
        assert!(matches!(
            &investment.status,
            stockdesk_models::AgentStatus::Failed { kind: AgentFailureKind::Unusable, .. }
        ));
    }

    #[tokio::test]
    async fn precancelled_token_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let generator = Arc::new(ScriptedGenerator::default());
        let run = pipeline(generator.clone(), PipelineOptions::default())
            .run("AAPL", &facts("AAPL"), ContextPolicy::Full, &cancel)
            .await;

        assert_eq!(run.status, TickerStatus::Cancelled);
        assert!(run.results.is_empty());
        assert_eq!(generator.call_count(), 0);
    }
}
