use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use stockdesk_models::AgentSpec;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::InvokeError;

/// A text-generation backend: instructions plus context in, free-form text out.
/// Mockable for testing.
#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, instructions: &str, context: &str) -> Result<String, InvokeError>;
}

/// Performs exactly one generation call per `invoke`, throttled by a shared
/// concurrency ceiling. Calls over the ceiling wait for a permit.
#[derive(Clone)]
pub struct ModelInvoker {
    service: Arc<dyn GenerationService>,
    limiter: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ModelInvoker {
    pub fn new(service: Arc<dyn GenerationService>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            service,
            limiter: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// An invoker for a different backend that draws from the same ceiling.
    pub fn with_service(&self, service: Arc<dyn GenerationService>) -> Self {
        Self {
            service,
            limiter: Arc::clone(&self.limiter),
            max_concurrent: self.max_concurrent,
        }
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub async fn invoke(&self, spec: &AgentSpec, context: &str) -> Result<String, InvokeError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| InvokeError::Transport("invoker limiter closed".to_string()))?;

        let start = Instant::now();
        debug!(
            role = spec.role_name(),
            service = self.service.name(),
            context_len = context.len(),
            "Invoking model"
        );

        let result = match self.service.generate(&spec.instruction_text, context).await {
            Ok(text) if text.trim().is_empty() => Err(InvokeError::EmptyResponse),
            other => other,
        };

        if let Err(e) = &result {
            warn!(
                role = spec.role_name(),
                error = %e,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Model call failed"
            );
        }
        result
    }
}
