use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed set of analyst roles. Identity of an agent is its role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Stock,
    Market,
    Macro,
    News,
    Investment,
    Aggregation,
}

impl AgentRole {
    /// Per-ticker pipeline order. Aggregation runs once per portfolio, outside this list.
    pub const PIPELINE: [AgentRole; 5] = [
        AgentRole::Stock,
        AgentRole::Market,
        AgentRole::Macro,
        AgentRole::News,
        AgentRole::Investment,
    ];

    pub const ALL: [AgentRole; 6] = [
        AgentRole::Stock,
        AgentRole::Market,
        AgentRole::Macro,
        AgentRole::News,
        AgentRole::Investment,
        AgentRole::Aggregation,
    ];

    /// Canonical role name, also used in artifact file names.
    pub fn name(self) -> &'static str {
        match self {
            AgentRole::Stock => "StockAgent",
            AgentRole::Market => "MarketAgent",
            AgentRole::Macro => "MacroAgent",
            AgentRole::News => "NewsAgent",
            AgentRole::Investment => "InvestmentAgent",
            AgentRole::Aggregation => "ReportAggregationAgent",
        }
    }

    /// Human-readable section title for combined analyses.
    pub fn title(self) -> &'static str {
        match self {
            AgentRole::Stock => "Stock Analysis",
            AgentRole::Market => "Market Analysis",
            AgentRole::Macro => "Macroeconomic Analysis",
            AgentRole::News => "News Analysis",
            AgentRole::Investment => "Investment Recommendation",
            AgentRole::Aggregation => "Portfolio Strategy",
        }
    }

    /// Whether a failure of this role ends the ticker.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentRole::Investment)
    }

    pub fn output_kind(self) -> OutputKind {
        match self {
            AgentRole::Investment => OutputKind::Recommendation,
            AgentRole::Aggregation => OutputKind::PortfolioReport,
            _ => OutputKind::Analysis,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of text a role is instructed to produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Free-form markdown sections.
    Analysis,
    /// Fixed-header recommendation block (`## RECOMMENDATION: ...`).
    Recommendation,
    /// Fixed-section portfolio report.
    PortfolioReport,
}

/// Immutable role configuration consumed by the model invoker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpec {
    pub role: AgentRole,
    /// System prompt sent with every call for this role.
    pub instruction_text: String,
    pub expected_output_kind: OutputKind,
}

impl AgentSpec {
    pub fn new(role: AgentRole, instruction_text: impl Into<String>) -> Self {
        Self {
            role,
            instruction_text: instruction_text.into(),
            expected_output_kind: role.output_kind(),
        }
    }

    pub fn role_name(&self) -> &'static str {
        self.role.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_order_ends_with_investment() {
        assert_eq!(AgentRole::PIPELINE.len(), 5);
        assert_eq!(AgentRole::PIPELINE[0], AgentRole::Stock);
        assert_eq!(AgentRole::PIPELINE[4], AgentRole::Investment);
        assert!(!AgentRole::PIPELINE.contains(&AgentRole::Aggregation));
    }

    #[test]
    fn only_investment_is_terminal() {
        let terminal: Vec<_> = AgentRole::ALL
            .iter()
            .filter(|r| r.is_terminal())
            .collect();
        assert_eq!(terminal, vec![&AgentRole::Investment]);
    }

    #[test]
    fn spec_takes_output_kind_from_role() {
        let spec = AgentSpec::new(AgentRole::Investment, "You are a portfolio manager.");
        assert_eq!(spec.expected_output_kind, OutputKind::Recommendation);
        assert_eq!(spec.role_name(), "InvestmentAgent");

        let spec = AgentSpec::new(AgentRole::News, "You read the news.");
        assert_eq!(spec.expected_output_kind, OutputKind::Analysis);
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&AgentRole::Aggregation).unwrap();
        assert_eq!(json, "\"aggregation\"");
    }
}
