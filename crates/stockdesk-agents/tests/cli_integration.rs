//! Integration tests that invoke the real Claude CLI.
//!
//! Ignored by default. They need the `claude` CLI on PATH and valid
//! Anthropic credentials. Run explicitly with:
//! ```bash
//! cargo test -p stockdesk-agents --test cli_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use stockdesk_agents::claude_cli::{check_cli_available, invoke_claude, ClaudeCliConfig};
use stockdesk_agents::test_support::sample_snapshot;
use stockdesk_agents::{
    default_agent_specs, normalize, ClaudeCliGenerator, ModelInvoker, PipelineOptions,
    TickerPipeline,
};
use stockdesk_models::{AgentRole, ContextPolicy, RecommendationSummary};
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(check_cli_available().await, "claude CLI not found on PATH");
}

/// Plain-text output must survive normalization. Catches CLI format changes
/// (new wrapping, JSON envelopes) before they reach a real run.
#[tokio::test]
#[ignore]
async fn cli_output_normalizes_to_prose() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let config = ClaudeCliConfig {
        timeout: Duration::from_secs(60),
        ..ClaudeCliConfig::default()
    };
    let raw = invoke_claude(
        "You are a test agent. Reply with one short markdown heading and one sentence.",
        "Describe the color of the sky.",
        &config,
    )
    .await
    .expect("claude CLI invocation failed");

    let text = normalize(&raw).expect("CLI output was not usable");
    assert!(text.chars().any(char::is_alphabetic));
}

#[tokio::test]
#[ignore]
async fn single_ticker_pipeline_against_cli() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let generator = ClaudeCliGenerator::new("claude-3-5-haiku-latest", Duration::from_secs(180));
    let invoker = ModelInvoker::new(Arc::new(generator), 1);
    let pipeline = TickerPipeline::new(invoker, default_agent_specs(), PipelineOptions::default());

    let facts = sample_snapshot("AAPL", 190.0).to_context();
    let run = pipeline
        .run("AAPL", &facts, ContextPolicy::Full, &CancellationToken::new())
        .await;

    assert_eq!(run.results.len(), 5);
    let investment = run
        .result(AgentRole::Investment)
        .and_then(|r| r.output())
        .expect("investment agent produced no recommendation");
    let summary = RecommendationSummary::parse(investment);
    println!("AAPL: {} ({})", summary.action.as_str(), summary.confidence.as_str());
}
