use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use stockdesk_models::PortfolioRun;
use tracing::info;

use crate::report::{render_combined_analysis, render_portfolio_report};

/// Writes run outputs as timestamped files under one directory.
///
/// Layout: `<ts>_<TICKER>_<RoleName>.txt` per successful agent,
/// `<ts>_<TICKER>_combined_analysis.md` per ticker with results and
/// `<ts>_portfolio_report.md` once per run.
pub struct ArtifactWriter {
    dir: PathBuf,
    stamp: String,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>, at: DateTime<Utc>) -> Self {
        Self {
            dir: dir.into(),
            stamp: at.format("%Y%m%d_%H%M%S").to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_run(&self, run: &PortfolioRun) -> Result<Vec<PathBuf>, anyhow::Error> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output dir: {}", self.dir.display()))?;

        let mut written = Vec::new();
        for ticker in &run.tickers {
            for result in &ticker.results {
                if let Some(text) = result.output() {
                    let name = format!("{}_{}_{}.txt", self.stamp, ticker.ticker, result.role_name());
                    written.push(self.write(&name, text)?);
                }
            }
            if !ticker.results.is_empty() {
                let name = format!("{}_{}_combined_analysis.md", self.stamp, ticker.ticker);
                written.push(self.write(&name, &render_combined_analysis(ticker))?);
            }
        }

        let name = format!("{}_portfolio_report.md", self.stamp);
        written.push(self.write(&name, &render_portfolio_report(run))?);

        info!(dir = %self.dir.display(), files = written.len(), "Wrote run artifacts");
        Ok(written)
    }

    fn write(&self, name: &str, contents: &str) -> Result<PathBuf, anyhow::Error> {
        let path = self.dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}
