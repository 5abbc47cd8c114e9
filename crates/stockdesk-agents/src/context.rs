use stockdesk_models::{AgentRole, ContextPolicy};

use crate::normalizer::summarize;
use crate::prompts::task_line;

/// One prior step as seen by later agents.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEntry {
    Output { role: AgentRole, text: String },
    Gap { role: AgentRole, reason: String },
}

impl ContextEntry {
    pub fn role(&self) -> AgentRole {
        match self {
            ContextEntry::Output { role, .. } | ContextEntry::Gap { role, .. } => *role,
        }
    }
}

/// Ordered, append-only record of prior agent steps for one ticker.
///
/// Each step receives the log by value and hands back an extended copy;
/// nothing is shared between tickers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextLog {
    entries: Vec<ContextEntry>,
}

impl ContextLog {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, entry: ContextEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Successful outputs in order.
    pub fn outputs(&self) -> impl Iterator<Item = (AgentRole, &str)> {
        self.entries.iter().filter_map(|e| match e {
            ContextEntry::Output { role, text } => Some((*role, text.as_str())),
            ContextEntry::Gap { .. } => None,
        })
    }

    /// Build the context string for `role` under `policy`.
    pub fn render(&self, policy: ContextPolicy, role: AgentRole, ticker: &str, facts: &str) -> String {
        let mut out = String::with_capacity(facts.len() + 256);
        out.push_str(facts.trim_end());
        out.push_str("\n\n");

        match policy {
            ContextPolicy::Full => self.render_entries(&mut out, None),
            ContextPolicy::Digest { max_chars } if role == AgentRole::Investment => {
                out.push_str("The research team has provided the following summarized insights:\n\n");
                self.render_entries(&mut out, Some(max_chars));
            }
            ContextPolicy::Independent | ContextPolicy::Digest { .. } => {}
        }

        out.push_str(&task_line(role, ticker));
        out
    }

    fn render_entries(&self, out: &mut String, max_chars: Option<usize>) {
        for entry in &self.entries {
            match entry {
                ContextEntry::Output { role, text } => {
                    out.push_str(&format!("### {} output\n", role.name()));
                    match max_chars {
                        Some(n) => out.push_str(&summarize(text, n)),
                        None => out.push_str(text),
                    }
                }
                ContextEntry::Gap { role, reason } => {
                    out.push_str(&format!("### {} output unavailable: {reason}", role.name()));
                }
            }
            out.push_str("\n\n");
        }
    }
}
