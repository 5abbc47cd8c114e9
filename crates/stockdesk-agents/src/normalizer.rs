use stockdesk_models::OutputKind;

use crate::error::NormalizeError;

/// Keys under which structured responses commonly carry the actual text.
const TEXT_KEYS: [&str; 5] = ["content", "text", "output", "response", "result"];

/// Upper bound on cleaning passes. Each pass either shrinks the text or
/// leaves it unchanged, so real inputs settle in two or three.
const MAX_PASSES: usize = 32;

/// Clean a raw model response into canonical markdown text.
///
/// Handles common wrappers around otherwise plain responses:
/// - Fenced blocks around the whole answer: ```` ```markdown\n...\n``` ````
/// - JSON string literals: `"## Outlook\n..."`
/// - JSON envelopes: `{"content": "..."}`
/// - Stray matching quotes or backticks around the text
///
/// Cleaning repeats until nothing changes, so `normalize` is idempotent.
pub fn normalize(raw: &str) -> Result<String, NormalizeError> {
    let mut text = clean_pass(raw);
    for _ in 0..MAX_PASSES {
        let next = clean_pass(&text);
        if next == text {
            break;
        }
        text = next;
    }

    if text.is_empty() {
        return Err(NormalizeError::Unusable(format!(
            "empty after cleaning (raw length={})",
            raw.len()
        )));
    }
    if !text.chars().any(char::is_alphabetic) {
        return Err(NormalizeError::Unusable(format!(
            "no alphabetic content (length={})",
            text.len()
        )));
    }

    Ok(text)
}

/// Check normalized text against the shape its role must produce.
///
/// A recommendation needs a `RECOMMENDATION:` line naming BUY, SELL or HOLD;
/// without it the headline fields downstream would be guesses.
pub fn conform(kind: OutputKind, text: &str) -> Result<(), NormalizeError> {
    if kind != OutputKind::Recommendation {
        return Ok(());
    }
    let has_action = text.lines().any(|line| {
        line.split_once("RECOMMENDATION:").is_some_and(|(_, rest)| {
            let rest = rest.to_ascii_uppercase();
            ["BUY", "SELL", "HOLD"].iter().any(|a| rest.contains(a))
        })
    });
    if has_action {
        Ok(())
    } else {
        Err(NormalizeError::Unusable(
            "recommendation is missing a RECOMMENDATION: BUY/SELL/HOLD line".to_string(),
        ))
    }
}

/// Truncate to at most `max_chars` characters, marking the cut.
pub fn summarize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn clean_pass(input: &str) -> String {
    let text = input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace(['\u{feff}', '\0'], "");
    let trimmed = text.trim();
    let unwrapped = unwrap_once(trimmed).unwrap_or_else(|| trimmed.to_string());
    tidy_markdown(&unwrapped)
}

fn unwrap_once(text: &str) -> Option<String> {
    unwrap_fence(text)
        .or_else(|| unwrap_json_string(text))
        .or_else(|| unwrap_json_envelope(text))
        .or_else(|| unwrap_quotes(text))
}

/// A single fenced block spanning the whole text.
fn unwrap_fence(text: &str) -> Option<String> {
    if !text.starts_with("```") || !text.ends_with("\n```") {
        return None;
    }
    let (opening, rest) = text.split_once('\n')?;
    let lang = opening.trim_start_matches('`').trim();
    if lang.contains(char::is_whitespace) {
        return None;
    }
    let body = &rest[..rest.len() - 3];
    if body.lines().any(|l| l.trim_start().starts_with("```")) {
        return None;
    }
    Some(body.to_string())
}

fn unwrap_json_string(text: &str) -> Option<String> {
    if text.len() < 2 || !text.starts_with('"') || !text.ends_with('"') {
        return None;
    }
    serde_json::from_str::<String>(text).ok()
}

fn unwrap_json_envelope(text: &str) -> Option<String> {
    if !text.starts_with('{') || !text.ends_with('}') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let object = value.as_object()?;
    TEXT_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

fn unwrap_quotes(text: &str) -> Option<String> {
    let first = text.chars().next()?;
    if !matches!(first, '"' | '\'' | '`') || text.len() < 2 || !text.ends_with(first) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    if inner.contains(first) {
        return None;
    }
    Some(inner.to_string())
}

/// Heading spacing, trailing whitespace, blank-line runs, outer trim.
fn tidy_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = fix_heading(line.trim_end());
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&line);
        out.push('\n');
    }

    out.trim().to_string()
}

/// `##RECOMMENDATION: BUY` -> `## RECOMMENDATION: BUY`.
fn fix_heading(line: &str) -> String {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let hashes = body.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return line.to_string();
    }
    match body[hashes..].chars().next() {
        Some(c) if c.is_uppercase() || c.is_ascii_digit() => {
            format!("{indent}{} {}", &body[..hashes], &body[hashes..])
        }
        _ => line.to_string(),
    }
}
