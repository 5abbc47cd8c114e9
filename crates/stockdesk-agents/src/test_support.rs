//! Scripted generation backend and market fixtures for pipeline tests.
//!
//! `ScriptedGenerator` answers like a well-behaved model: it reads the ticker
//! from the facts block, recognizes the role from the instruction text and
//! returns role-shaped markdown. Faults can be injected per `(ticker, role)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use stockdesk_market::StaticMarketData;
use stockdesk_models::market_schema::{MarketSnapshot, NewsItem, PriceBar, Quote};
use stockdesk_models::AgentRole;
use tokio_util::sync::CancellationToken;

use crate::error::InvokeError;
use crate::invoker::GenerationService;
use crate::prompts::system_prompt;

/// Ticker label used for the aggregation call.
pub const PORTFOLIO: &str = "PORTFOLIO";

/// Injected misbehavior for one `(ticker, role)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `Err(Transport)` from the backend.
    Transport,
    /// Whitespace-only text.
    Empty,
    /// Text with no prose in it.
    Unusable,
    /// Readable prose without the role's required headers.
    Headerless,
    /// Panic inside the backend call.
    Panic,
}

#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub ticker: String,
    pub role: Option<AgentRole>,
    pub instructions: String,
    pub context: String,
}

struct FaultPlan {
    fault: Fault,
    /// `None` fails every attempt.
    remaining: Option<u32>,
}

pub struct ScriptedGenerator {
    name: String,
    delay: Option<Duration>,
    faults: Mutex<HashMap<(String, AgentRole), FaultPlan>>,
    cancel_hooks: Mutex<HashMap<(String, AgentRole), CancellationToken>>,
    calls: Mutex<Vec<ScriptedCall>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new("scripted")
    }
}

impl ScriptedGenerator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: None,
            faults: Mutex::new(HashMap::new()),
            cancel_hooks: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Hold every call open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call for `(ticker, role)`.
    pub fn fail(self, ticker: &str, role: AgentRole, fault: Fault) -> Self {
        self.plan(ticker, role, fault, None)
    }

    /// Fail the first `times` calls for `(ticker, role)`, then answer normally.
    pub fn fail_times(self, ticker: &str, role: AgentRole, fault: Fault, times: u32) -> Self {
        self.plan(ticker, role, fault, Some(times))
    }

    /// Cancel `token` when `(ticker, role)` is called. The call itself still answers.
    pub fn cancel_on(self, ticker: &str, role: AgentRole, token: CancellationToken) -> Self {
        if let Ok(mut hooks) = self.cancel_hooks.lock() {
            hooks.insert((ticker.to_string(), role), token);
        }
        self
    }

    fn plan(self, ticker: &str, role: AgentRole, fault: Fault, remaining: Option<u32>) -> Self {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert((ticker.to_string(), role), FaultPlan { fault, remaining });
        }
        self
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Calls made for `(ticker, role)`, in arrival order.
    pub fn calls_for(&self, ticker: &str, role: AgentRole) -> Vec<ScriptedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.ticker == ticker && c.role == Some(role))
            .collect()
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn take_fault(&self, ticker: &str, role: AgentRole) -> Option<Fault> {
        let mut faults = self.faults.lock().ok()?;
        let key = (ticker.to_string(), role);
        let plan = faults.get_mut(&key)?;
        match plan.remaining {
            None => Some(plan.fault),
            Some(0) => None,
            Some(ref mut n) => {
                *n -= 1;
                Some(plan.fault)
            }
        }
    }

    fn fire_cancel_hook(&self, ticker: &str, role: AgentRole) {
        if let Ok(hooks) = self.cancel_hooks.lock() {
            if let Some(token) = hooks.get(&(ticker.to_string(), role)) {
                token.cancel();
            }
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, instructions: &str, context: &str) -> Result<String, InvokeError> {
        let role = detect_role(instructions);
        let ticker = detect_ticker(context, role);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ScriptedCall {
                ticker: ticker.clone(),
                role,
                instructions: instructions.to_string(),
                context: context.to_string(),
            });
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(role) = role else {
            return Ok(format!("## Response\n\nGeneral commentary from {}.", self.name));
        };
        self.fire_cancel_hook(&ticker, role);

        match self.take_fault(&ticker, role) {
            Some(Fault::Transport) => Err(InvokeError::Transport(format!(
                "scripted transport failure for {ticker}/{}",
                role.name()
            ))),
            Some(Fault::Empty) => Ok("  \n\t ".to_string()),
            Some(Fault::Unusable) => Ok("```json\n{\"content\": \"--- 0 ---\"}\n```".to_string()),
            Some(Fault::Headerless) => {
                Ok("I would go long here with strong conviction; target 250.".to_string())
            }
            Some(Fault::Panic) => panic!("scripted panic for {ticker}/{}", role.name()),
            None => Ok(canned_output(role, &ticker, context)),
        }
    }
}

fn detect_role(instructions: &str) -> Option<AgentRole> {
    AgentRole::ALL
        .into_iter()
        .find(|role| system_prompt(*role) == instructions)
}

fn detect_ticker(context: &str, role: Option<AgentRole>) -> String {
    if role == Some(AgentRole::Aggregation) {
        return PORTFOLIO.to_string();
    }
    context
        .lines()
        .find_map(|l| l.strip_prefix("Ticker: "))
        .map(|t| t.trim().to_string())
        .unwrap_or_default()
}

/// Tickers named by `## <TICKER> Analysis` blocks, in order.
pub fn analysis_blocks(context: &str) -> Vec<String> {
    context
        .lines()
        .filter_map(|l| l.strip_prefix("## "))
        .filter_map(|l| l.strip_suffix(" Analysis"))
        .map(str::to_string)
        .collect()
}

/// Marker line every analyst answer carries; lets tests trace threading.
pub fn marker(role: AgentRole, ticker: &str) -> String {
    format!("[{}:{ticker}]", role.name())
}

fn canned_output(role: AgentRole, ticker: &str, context: &str) -> String {
    match role {
        AgentRole::Investment => format!(
            "## RECOMMENDATION: BUY\n\
             ## PRICE TARGET: $210.50\n\
             ## EXPECTED 1-YEAR RETURN: 12%\n\
             ## CONFIDENCE: High\n\
             ## INVESTMENT THESIS:\n{ticker} shows durable earnings momentum. {}\n\
             ## SUPPORTING FACTORS:\n- Margin expansion\n\
             ## RISK FACTORS:\n- Valuation\n\
             ## POSITION SIZE: 5% of portfolio\n\
             ## VALUATION SUMMARY:\nFairly valued.\n\
             ## TECHNICAL OUTLOOK:\nUptrend intact.",
            marker(role, ticker)
        ),
        AgentRole::Aggregation => {
            let covered = analysis_blocks(context);
            let mut out = String::from("# Portfolio Strategy Report\n\n## Executive Summary\n");
            out.push_str(&format!("Covers {} stocks.\n\n## Individual Stock Recommendations\n", covered.len()));
            for t in covered {
                out.push_str(&format!("- {t}: BUY\n"));
            }
            out
        }
        _ => format!(
            "## {}\n\n{} for {ticker}: steady fundamentals. {}",
            role.title(),
            role.name(),
            marker(role, ticker)
        ),
    }
}

/// A snapshot with a quote, a short history and one headline.
pub fn sample_snapshot(ticker: &str, price: f64) -> MarketSnapshot {
    let price_history = (0..5)
        .map(|i| {
            let close = price - 5.0 + i as f64;
            PriceBar {
                date: format!("2024-06-{:02}", 10 + i),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect();
    MarketSnapshot {
        ticker: ticker.to_string(),
        quote: Some(Quote {
            price,
            change_percent: Some(0.8),
            volume: Some(52_000_000.0),
        }),
        price_history,
        news: vec![NewsItem {
            title: format!("{ticker} beats estimates"),
            published_date: Some("2024-06-14".to_string()),
            source: Some("Wire".to_string()),
            url: None,
        }],
        fetched_at: Utc::now(),
    }
}

/// A static market with a sample snapshot for each ticker.
pub fn market_with(tickers: &[&str]) -> StaticMarketData {
    tickers
        .iter()
        .enumerate()
        .fold(StaticMarketData::new(), |market, (i, t)| {
            market.with_snapshot(sample_snapshot(t, 100.0 + 10.0 * i as f64))
        })
}
