use std::fmt::Write;

use stockdesk_models::{AgentRole, PortfolioRun, RecommendationSummary, TickerRun, TickerStatus};

/// Markdown report for a finished portfolio run: headline table, the
/// aggregated strategy and every failure.
pub fn render_portfolio_report(run: &PortfolioRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Portfolio Analysis Report\n");
    let _ = writeln!(out, "- Run: {}", run.run_id);
    let _ = writeln!(out, "- Started: {}", run.started_at.to_rfc3339());
    let _ = writeln!(out, "- Finished: {}", run.finished_at.to_rfc3339());
    let _ = writeln!(out, "- Context policy: {}", run.context_policy.label());
    let _ = writeln!(
        out,
        "- Tickers: {} ({} usable)\n",
        run.symbols().join(", "),
        run.usable_count()
    );

    out.push_str("## Recommendation Summary\n\n");
    out.push_str(
        "| Ticker | Action | Confidence | Price Target | Expected Return | Position Size |\n",
    );
    out.push_str("|---|---|---|---|---|---|\n");
    for (ticker, text) in run.aggregation_inputs() {
        let s = RecommendationSummary::parse(text);
        let _ = writeln!(
            out,
            "| {ticker} | {} | {} | {} | {} | {} |",
            s.action.as_str(),
            s.confidence.as_str(),
            s.price_target_text.as_deref().unwrap_or("-"),
            s.expected_return.as_deref().unwrap_or("-"),
            s.position_size.as_deref().unwrap_or("-"),
        );
    }

    out.push_str("\n## Portfolio Strategy\n\n");
    match (&run.aggregated_recommendation, run.aggregation_skipped) {
        (Some(result), _) => match result.output() {
            Some(text) => out.push_str(text),
            None => {
                let _ = write!(
                    out,
                    "_Aggregation failed: {}_",
                    result.failure_reason().unwrap_or("unknown error")
                );
            }
        },
        (None, Some(skipped)) => {
            let _ = write!(out, "_Aggregation skipped: {skipped}_");
        }
        (None, None) => out.push_str("_Aggregation did not run_"),
    }
    out.push('\n');

    let failures: Vec<String> = run.tickers.iter().filter_map(failure_line).collect();
    if !failures.is_empty() {
        out.push_str("\n## Failures\n\n");
        for line in failures {
            let _ = writeln!(out, "- {line}");
        }
    }
    out
}

/// One line per ticker that is not usable or lost an agent.
fn failure_line(run: &TickerRun) -> Option<String> {
    let failed_agents: Vec<String> = run
        .results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| {
            format!(
                "{} ({})",
                r.role_name(),
                r.failure_reason().unwrap_or_default()
            )
        })
        .collect();

    let headline = match &run.status {
        TickerStatus::Completed => return None,
        TickerStatus::PartiallyFailed => "partially failed".to_string(),
        TickerStatus::Failed(failure) => failure.to_string(),
        TickerStatus::Cancelled => "cancelled".to_string(),
    };
    if failed_agents.is_empty() {
        Some(format!("**{}**: {headline}", run.ticker))
    } else {
        Some(format!(
            "**{}**: {headline}; failed agents: {}",
            run.ticker,
            failed_agents.join(", ")
        ))
    }
}

/// All agent outputs for one ticker under role headings.
pub fn render_combined_analysis(run: &TickerRun) -> String {
    let mut out = format!("# {} Combined Analysis\n\nStatus: {}\n", run.ticker, run.status.label());
    for role in AgentRole::PIPELINE {
        let _ = write!(out, "\n## {}\n\n", role.title());
        match run.result(role) {
            Some(result) => match result.output() {
                Some(text) => out.push_str(text),
                None => {
                    let _ = write!(
                        out,
                        "_Unavailable: {}_",
                        result.failure_reason().unwrap_or_default()
                    );
                }
            },
            None => out.push_str("_Not run_"),
        }
        out.push('\n');
    }
    out
}
