use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent_spec::AgentRole;

/// Which failure axis an agent call failed on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentFailureKind {
    /// Network, auth, timeout or process failure talking to the generation service.
    Transport,
    /// The service answered but produced no text.
    EmptyResponse,
    /// Text came back but did not survive normalization.
    Unusable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Failed {
        kind: AgentFailureKind,
        reason: String,
    },
}

/// Outcome of one agent invocation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub role: AgentRole,
    pub ticker: String,
    /// Text as returned by the service; absent when the call itself failed.
    pub raw_text: Option<String>,
    pub normalized_text: Option<String>,
    pub status: AgentStatus,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

impl AgentResult {
    pub fn success(
        role: AgentRole,
        ticker: &str,
        raw_text: String,
        normalized_text: String,
        attempts: u32,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            role,
            ticker: ticker.to_string(),
            raw_text: Some(raw_text),
            normalized_text: Some(normalized_text),
            status: AgentStatus::Success,
            timestamp: Utc::now(),
            attempts,
            elapsed_ms,
        }
    }

    pub fn failed(
        role: AgentRole,
        ticker: &str,
        raw_text: Option<String>,
        kind: AgentFailureKind,
        reason: String,
        attempts: u32,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            role,
            ticker: ticker.to_string(),
            raw_text,
            normalized_text: None,
            status: AgentStatus::Failed { kind, reason },
            timestamp: Utc::now(),
            attempts,
            elapsed_ms,
        }
    }

    pub fn role_name(&self) -> &'static str {
        self.role.name()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, AgentStatus::Success)
    }

    /// Normalized text, only for successful results.
    pub fn output(&self) -> Option<&str> {
        match self.status {
            AgentStatus::Success => self.normalized_text.as_deref(),
            AgentStatus::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            AgentStatus::Success => None,
            AgentStatus::Failed { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_exposes_output() {
        let result = AgentResult::success(
            AgentRole::Stock,
            "AAPL",
            "```\nPrice up\n```".to_string(),
            "Price up".to_string(),
            1,
            120,
        );
        assert!(result.is_success());
        assert_eq!(result.output(), Some("Price up"));
        assert_eq!(result.failure_reason(), None);
        assert_eq!(result.role_name(), "StockAgent");
    }

    #[test]
    fn failure_hides_output() {
        let result = AgentResult::failed(
            AgentRole::Market,
            "AAPL",
            Some("   ".to_string()),
            AgentFailureKind::Unusable,
            "no alphabetic content".to_string(),
            1,
            80,
        );
        assert!(!result.is_success());
        assert_eq!(result.output(), None);
        assert_eq!(result.failure_reason(), Some("no alphabetic content"));
    }

    #[test]
    fn status_serializes_tagged() {
        let status = AgentStatus::Failed {
            kind: AgentFailureKind::Transport,
            reason: "timeout".to_string(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "transport");
    }
}
