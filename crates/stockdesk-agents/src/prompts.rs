use std::sync::Arc;

use stockdesk_models::{AgentRole, AgentSpec};

/// Headers the Investment role must emit verbatim. Downstream summaries parse them.
pub const RECOMMENDATION_HEADERS: [&str; 10] = [
    "## RECOMMENDATION:",
    "## PRICE TARGET:",
    "## EXPECTED 1-YEAR RETURN:",
    "## CONFIDENCE:",
    "## INVESTMENT THESIS:",
    "## SUPPORTING FACTORS:",
    "## RISK FACTORS:",
    "## POSITION SIZE:",
    "## VALUATION SUMMARY:",
    "## TECHNICAL OUTLOOK:",
];

/// Sections the aggregation role must emit, in order.
pub const REPORT_SECTIONS: [&str; 7] = [
    "## Executive Summary",
    "## Market Overview",
    "## Portfolio Strategy",
    "## Individual Stock Analyses",
    "## Risk Management",
    "## Performance Expectations",
    "## Conclusion",
];

pub fn stock_system_prompt() -> String {
    "You are a senior equity analyst on a portfolio management team, responsible for \
     in-depth analysis of a single stock.\n\n\
     ## RESPONSIBILITIES\n\
     1. Analyze recent price movements, volume patterns and technical indicators\n\
     2. Evaluate historical performance and identify significant trend changes\n\
     3. Assess valuation relative to industry peers and historical ranges\n\
     4. Identify catalysts that could move the stock in the near term\n\n\
     Portfolio managers act directly on your analysis. Be precise and data-driven, and \
     state both opportunities and risks.\n\n\
     ## OUTPUT FORMAT\n\
     Markdown with `##` sections for price action, volume analysis, valuation and \
     technical outlook. Plain text only, no JSON, no code fences."
        .to_string()
}

pub fn market_system_prompt() -> String {
    "You are the head of market strategy on a portfolio management team, responsible for \
     analyzing broad market conditions.\n\n\
     ## RESPONSIBILITIES\n\
     1. Analyze major indices, sectors and overall market sentiment\n\
     2. Identify sector rotation and shifts in investment themes\n\
     3. Evaluate market-wide breadth, volatility and momentum\n\
     4. Explain how current market conditions affect the stock under review\n\n\
     ## OUTPUT FORMAT\n\
     Markdown with `##` sections for index performance, sector trends, market sentiment \
     and implications for the stock. Plain text only, no JSON, no code fences."
        .to_string()
}

pub fn macro_system_prompt() -> String {
    "You are the chief economist on a portfolio management team, connecting macroeconomic \
     conditions to individual investment opportunities.\n\n\
     ## RESPONSIBILITIES\n\
     1. Analyze GDP, inflation, employment and interest rates\n\
     2. Evaluate central bank policy and fiscal initiatives\n\
     3. Assess global trade dynamics and currency movements\n\
     4. Identify economic trends that affect the stock's sector and the stock itself\n\n\
     ## OUTPUT FORMAT\n\
     Markdown with `##` sections for economic conditions, monetary policy, fiscal policy \
     and direct implications for the stock. Plain text only, no JSON, no code fences."
        .to_string()
}

pub fn news_system_prompt() -> String {
    "You are the director of financial intelligence on a portfolio management team, \
     responsible for news analysis and sentiment.\n\n\
     ## RESPONSIBILITIES\n\
     1. Analyze recent company news and press releases\n\
     2. Evaluate analyst reports, earnings calls and management guidance\n\
     3. Assess sentiment from media coverage\n\
     4. Identify news-driven catalysts and separate signal from noise\n\n\
     ## OUTPUT FORMAT\n\
     Markdown with `##` sections for recent headlines, analyst sentiment, upcoming \
     catalysts and implications for the investment thesis. Plain text only, no JSON, \
     no code fences."
        .to_string()
}

pub fn investment_system_prompt() -> String {
    format!(
        "You are a senior portfolio manager making the final recommendation for one stock.\n\n\
         ## RESPONSIBILITIES\n\
         1. Synthesize the research team's analyses (equity, market, macro, news)\n\
         2. Form a clear investment thesis with an expected return\n\
         3. Set a price target and risk parameters\n\
         4. Make an actionable BUY, SELL or HOLD call with a confidence level\n\n\
         Some analyses may be marked unavailable. Work with what is present and say which \
         inputs were missing.\n\n\
         ## OUTPUT FORMAT\n\
         ALWAYS use exactly these headers, in this order:\n\n\
         # Investment Recommendation: [TICKER]\n\
         {}\n\n\
         RECOMMENDATION is one of BUY, SELL, HOLD. CONFIDENCE is one of High, Medium, Low. \
         SUPPORTING FACTORS and RISK FACTORS are bullet lists of three items. POSITION SIZE \
         is Small, Medium or Large relative to the overall portfolio. Use precise, \
         quantitative language. Plain text only, no JSON, no code fences.",
        RECOMMENDATION_HEADERS.join("\n")
    )
}

pub fn aggregation_system_prompt() -> String {
    format!(
        "You are the chief investment officer combining per-stock recommendations into one \
         portfolio strategy.\n\n\
         ## RESPONSIBILITIES\n\
         1. Synthesize every individual recommendation you are given\n\
         2. Build a coherent allocation across the securities\n\
         3. Balance risk and return at the portfolio level\n\
         4. Communicate the strategy in clear, professional language\n\n\
         Only the stocks listed in the input are in scope. Do not invent recommendations \
         for stocks that are absent.\n\n\
         ## OUTPUT FORMAT\n\
         Start with `# Investment Report` and use exactly these sections:\n\
         {}\n\n\
         Under Individual Stock Analyses add one `### [TICKER]` subsection per stock. Give \
         specific allocation percentages, return ranges (conservative and optimistic) and \
         risk metrics. Plain text only, no JSON, no code fences.",
        REPORT_SECTIONS.join("\n")
    )
}

/// System prompt for a role.
pub fn system_prompt(role: AgentRole) -> String {
    match role {
        AgentRole::Stock => stock_system_prompt(),
        AgentRole::Market => market_system_prompt(),
        AgentRole::Macro => macro_system_prompt(),
        AgentRole::News => news_system_prompt(),
        AgentRole::Investment => investment_system_prompt(),
        AgentRole::Aggregation => aggregation_system_prompt(),
    }
}

/// Closing instruction appended to the context for each pipeline role.
pub fn task_line(role: AgentRole, ticker: &str) -> String {
    match role {
        AgentRole::Stock => {
            format!("Provide a detailed analysis of {ticker}'s current status and trends.")
        }
        AgentRole::Market => format!(
            "Provide an analysis of current market conditions and how they affect {ticker}."
        ),
        AgentRole::Macro => {
            format!("Provide a macroeconomic analysis and its impact on {ticker}.")
        }
        AgentRole::News => {
            format!("Analyze recent news and its potential impact on {ticker}.")
        }
        AgentRole::Investment => format!(
            "Based on the available analyses, provide an investment recommendation for {ticker}."
        ),
        AgentRole::Aggregation => format!(
            "Create a portfolio investment report covering {ticker} with actionable \
             recommendations for each stock."
        ),
    }
}

/// Process-wide role table. One spec per role, read-only once built.
#[derive(Debug, Clone)]
pub struct AgentTable {
    specs: Arc<[AgentSpec]>,
}

impl AgentTable {
    /// Build a table from a prompt source; every role gets exactly one spec.
    pub fn from_prompts(prompt: impl Fn(AgentRole) -> String) -> Self {
        let specs: Vec<AgentSpec> = AgentRole::ALL
            .iter()
            .map(|role| AgentSpec::new(*role, prompt(*role)))
            .collect();
        Self {
            specs: specs.into(),
        }
    }

    pub fn get(&self, role: AgentRole) -> &AgentSpec {
        let index = AgentRole::ALL
            .iter()
            .position(|r| *r == role)
            .unwrap_or_default();
        &self.specs[index]
    }

    pub fn specs(&self) -> &[AgentSpec] {
        &self.specs
    }
}

/// The built-in role table.
pub fn default_agent_specs() -> AgentTable {
    AgentTable::from_prompts(system_prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockdesk_models::OutputKind;

    #[test]
    fn table_has_one_spec_per_role() {
        let table = default_agent_specs();
        assert_eq!(table.specs().len(), AgentRole::ALL.len());
        for role in AgentRole::ALL {
            assert_eq!(table.get(role).role, role);
            assert!(!table.get(role).instruction_text.is_empty());
        }
    }

    #[test]
    fn investment_prompt_contains_all_headers() {
        let prompt = investment_system_prompt();
        for header in RECOMMENDATION_HEADERS {
            assert!(prompt.contains(header), "Missing {header}");
        }
        assert!(prompt.contains("BUY, SELL or HOLD"));
    }

    #[test]
    fn aggregation_prompt_contains_all_sections() {
        let prompt = aggregation_system_prompt();
        for section in REPORT_SECTIONS {
            assert!(prompt.contains(section), "Missing {section}");
        }
    }

    #[test]
    fn all_prompts_forbid_structured_wrappers() {
        for role in AgentRole::ALL {
            let prompt = system_prompt(role);
            assert!(prompt.contains("no JSON"), "{role} allows JSON");
            assert!(prompt.contains("OUTPUT FORMAT"), "{role} lacks format section");
        }
    }

    #[test]
    fn task_lines_name_the_ticker() {
        for role in AgentRole::PIPELINE {
            assert!(task_line(role, "MSFT").contains("MSFT"));
        }
    }

    #[test]
    fn custom_prompts_keep_output_kinds() {
        let table = AgentTable::from_prompts(|role| format!("test prompt for {role}"));
        let spec = table.get(AgentRole::Aggregation);
        assert_eq!(spec.instruction_text, "test prompt for ReportAggregationAgent");
        assert_eq!(spec.expected_output_kind, OutputKind::PortfolioReport);
    }
}
