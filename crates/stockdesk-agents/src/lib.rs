pub mod claude_cli;
pub mod context;
pub mod error;
pub mod invoker;
pub mod normalizer;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;

pub mod test_support;

pub use claude_cli::{ClaudeCliConfig, ClaudeCliGenerator};
pub use context::{ContextEntry, ContextLog};
pub use error::{AgentError, InvokeError, NormalizeError};
pub use invoker::{GenerationService, ModelInvoker};
pub use normalizer::normalize;
pub use orchestrator::{normalize_tickers, PortfolioOrchestrator};
pub use pipeline::{PipelineOptions, TickerPipeline};
pub use prompts::{default_agent_specs, AgentTable};
