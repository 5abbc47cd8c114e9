use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use stockdesk::artifacts::ArtifactWriter;
use stockdesk_agents::claude_cli::check_cli_available;
use stockdesk_models::ContextPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stockdesk", about = "Multi-agent equity research desk")]
struct Cli {
    /// Comma-separated ticker symbols
    #[arg(short, long, value_delimiter = ',', required = true)]
    tickers: Vec<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config/stockdesk.toml")]
    config: String,

    /// Context policy: full, independent, digest or digest:<max_chars>
    #[arg(long)]
    policy: Option<ContextPolicy>,

    /// Tickers processed at once (1 = sequential)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory for per-agent files and the portfolio report
    #[arg(short, long, default_value = "outputs")]
    output_dir: String,

    /// Skip writing artifacts; only print the run JSON
    #[arg(long)]
    no_artifacts: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the run JSON (respects RUST_LOG)
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = stockdesk::load_config(&cli.config)?;
    if let Some(policy) = cli.policy {
        config.portfolio.context_policy = policy;
    }
    if let Some(n) = cli.concurrency {
        config.portfolio.max_concurrent_tickers = n.max(1);
    }

    let orchestrator =
        stockdesk::build_orchestrator(&config).context("Failed to build orchestrator")?;
    if !check_cli_available().await {
        bail!("claude CLI not found on PATH");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight agent calls");
            on_signal.cancel();
        }
    });

    let run = stockdesk::analyze(
        &orchestrator,
        &cli.tickers,
        config.portfolio.context_policy,
        cancel,
    )
    .await;

    let output = if cli.pretty {
        serde_json::to_string_pretty(&run)?
    } else {
        serde_json::to_string(&run)?
    };
    println!("{output}");

    if !cli.no_artifacts {
        let writer = ArtifactWriter::new(&cli.output_dir, Utc::now());
        if let Err(e) = writer.write_run(&run) {
            error!(dir = %cli.output_dir, error = %e, "Failed to write artifacts");
        }
    }

    info!(
        usable = run.usable_count(),
        total = run.tickers.len(),
        "Done"
    );
    Ok(stockdesk::exit_status(&run))
}
