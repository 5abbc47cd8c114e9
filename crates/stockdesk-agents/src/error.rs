use stockdesk_models::AgentFailureKind;
use thiserror::Error;

/// Failure of a single generation call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("generation service returned no usable text")]
    EmptyResponse,
}

impl InvokeError {
    pub fn kind(&self) -> AgentFailureKind {
        match self {
            InvokeError::Transport(_) => AgentFailureKind::Transport,
            InvokeError::EmptyResponse => AgentFailureKind::EmptyResponse,
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvokeError::Transport(_))
    }
}

/// The call succeeded but its text cannot be used downstream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("unusable output: {0}")]
    Unusable(String),
}

/// Why one agent step produced no usable text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl AgentError {
    pub fn kind(&self) -> AgentFailureKind {
        match self {
            AgentError::Invoke(e) => e.kind(),
            AgentError::Normalize(_) => AgentFailureKind::Unusable,
        }
    }
}
