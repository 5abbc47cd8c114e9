use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecommendationAction {
    Buy,
    Sell,
    #[default]
    Hold,
}

impl RecommendationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationAction::Buy => "BUY",
            RecommendationAction::Sell => "SELL",
            RecommendationAction::Hold => "HOLD",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Conviction {
    High,
    #[default]
    Medium,
    Low,
}

impl Conviction {
    pub fn as_str(self) -> &'static str {
        match self {
            Conviction::High => "High",
            Conviction::Medium => "Medium",
            Conviction::Low => "Low",
        }
    }
}

/// Headline fields pulled out of an Investment agent recommendation.
///
/// The Investment role is instructed to emit fixed headers
/// (`## RECOMMENDATION:`, `## PRICE TARGET:`, ...). Missing headers fall back
/// to HOLD / Medium confidence and `None` for free-text fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendationSummary {
    pub action: RecommendationAction,
    pub confidence: Conviction,
    /// Price target line as written.
    pub price_target_text: Option<String>,
    /// First number in the price target line.
    pub price_target: Option<Decimal>,
    pub expected_return: Option<String>,
    pub position_size: Option<String>,
}

impl RecommendationSummary {
    pub fn parse(text: &str) -> Self {
        let mut summary = Self::default();

        if let Some(line) = header_value(text, "RECOMMENDATION:").map(|l| l.to_ascii_uppercase()) {
            if line.contains("BUY") {
                summary.action = RecommendationAction::Buy;
            } else if line.contains("SELL") {
                summary.action = RecommendationAction::Sell;
            } else if line.contains("HOLD") {
                summary.action = RecommendationAction::Hold;
            }
        }

        if let Some(line) = header_value(text, "CONFIDENCE:").map(|l| l.to_ascii_uppercase()) {
            if line.contains("HIGH") {
                summary.confidence = Conviction::High;
            } else if line.contains("MEDIUM") {
                summary.confidence = Conviction::Medium;
            } else if line.contains("LOW") {
                summary.confidence = Conviction::Low;
            }
        }

        summary.expected_return = text
            .lines()
            .find(|l| l.contains("EXPECTED") && l.contains("RETURN") && l.contains(':'))
            .and_then(|l| l.split_once(':'))
            .map(|(_, rest)| rest.trim().to_string())
            .filter(|s| !s.is_empty());

        summary.price_target_text =
            header_value(text, "PRICE TARGET:").filter(|s| !s.is_empty());
        summary.price_target = summary
            .price_target_text
            .as_deref()
            .and_then(first_decimal);

        summary.position_size = header_value(text, "POSITION SIZE:").filter(|s| !s.is_empty());

        summary
    }
}

/// Rest of the line following `marker`, trimmed.
fn header_value(text: &str, marker: &str) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let line = rest.split('\n').next().unwrap_or_default();
    Some(line.trim().to_string())
}

/// First decimal number in `s`, ignoring currency symbols and thousands separators.
fn first_decimal(s: &str) -> Option<Decimal> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let mut number = String::new();
    let mut seen_dot = false;
    for ch in s[start..].chars() {
        match ch {
            '0'..='9' => number.push(ch),
            ',' => continue,
            '.' if !seen_dot => {
                seen_dot = true;
                number.push(ch);
            }
            _ => break,
        }
    }
    Decimal::from_str(number.trim_end_matches('.')).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "# Investment Recommendation: AAPL\n\n\
        ## RECOMMENDATION: BUY\n\n\
        ## PRICE TARGET: $1,215.50 - $1,240\n\n\
        ## EXPECTED 1-YEAR RETURN: 12-15%\n\n\
        ## CONFIDENCE: High\n\n\
        ## INVESTMENT THESIS:\nServices growth offsets hardware cyclicality.\n\n\
        ## POSITION SIZE: Medium relative to overall portfolio\n";

    #[test]
    fn parses_fixed_headers() {
        let summary = RecommendationSummary::parse(SAMPLE);
        assert_eq!(summary.action, RecommendationAction::Buy);
        assert_eq!(summary.confidence, Conviction::High);
        assert_eq!(summary.price_target, Some(dec!(1215.50)));
        assert_eq!(
            summary.price_target_text.as_deref(),
            Some("$1,215.50 - $1,240")
        );
        assert_eq!(summary.expected_return.as_deref(), Some("12-15%"));
        assert_eq!(
            summary.position_size.as_deref(),
            Some("Medium relative to overall portfolio")
        );
    }

    #[test]
    fn defaults_when_headers_missing() {
        let summary = RecommendationSummary::parse("The outlook is unclear.");
        assert_eq!(summary.action, RecommendationAction::Hold);
        assert_eq!(summary.confidence, Conviction::Medium);
        assert_eq!(summary.price_target, None);
        assert_eq!(summary.expected_return, None);
    }

    #[test]
    fn sell_with_low_confidence() {
        let text = "## RECOMMENDATION: SELL\n## CONFIDENCE: Low\n## PRICE TARGET: 88\n";
        let summary = RecommendationSummary::parse(text);
        assert_eq!(summary.action, RecommendationAction::Sell);
        assert_eq!(summary.confidence, Conviction::Low);
        assert_eq!(summary.price_target, Some(dec!(88)));
    }

    #[test]
    fn header_values_ignore_case() {
        let text = "## RECOMMENDATION: Sell\n## CONFIDENCE: HIGH\n";
        let summary = RecommendationSummary::parse(text);
        assert_eq!(summary.action, RecommendationAction::Sell);
        assert_eq!(summary.confidence, Conviction::High);

        let summary = RecommendationSummary::parse("## CONFIDENCE: low");
        assert_eq!(summary.confidence, Conviction::Low);
    }

    #[test]
    fn first_decimal_handles_trailing_dot() {
        assert_eq!(first_decimal("around 42."), Some(dec!(42)));
        assert_eq!(first_decimal("n/a"), None);
    }
}
