pub mod agent_result;
pub mod agent_spec;
pub mod config;
pub mod market_schema;
pub mod recommendation;
pub mod run;

pub use agent_result::{AgentFailureKind, AgentResult, AgentStatus};
pub use agent_spec::{AgentRole, AgentSpec, OutputKind};
pub use config::{
    AgentsConfig, ContextPolicy, FailurePolicy, MarketConfig, PortfolioConfig, StockdeskConfig,
};
pub use market_schema::{MarketRow, MarketSnapshot, NewsItem, PriceBar, Quote};
pub use recommendation::{Conviction, RecommendationAction, RecommendationSummary};
pub use run::{AggregationSkipped, PortfolioRun, TickerFailure, TickerRun, TickerStatus};
