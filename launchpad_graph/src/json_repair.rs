//! Best-effort recovery of JSON from model output.
//!
//! Models wrap JSON in code fences, surround it with prose, leave trailing
//! commas or stop mid-object when they hit the token limit. Each pass here is
//! tried in order and the first that parses wins.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{GraphError, Result};

pub fn repair_json(text: &str) -> Option<Value> {
    let trimmed = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let candidate = outer_json(trimmed)?;
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }
    let cleaned = remove_trailing_commas(&normalize_quotes(candidate));
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }
    let closed = remove_trailing_commas(&close_brackets(&cleaned));
    serde_json::from_str(&closed).ok()
}

/// Parse model output into `T`, repairing it first when needed.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T> {
    let value = repair_json(text).ok_or_else(|| {
        GraphError::bad_request(format!("model output is not JSON: {}", preview(text)))
    })?;
    serde_json::from_value(value)
        .map_err(|err| GraphError::bad_request(format!("model output has the wrong shape: {err}")))
}

fn preview(text: &str) -> String {
    let mut out = text.chars().take(120).collect::<String>();
    if text.chars().count() > 120 {
        out.push_str("...");
    }
    out
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn outer_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']']);
    match end {
        Some(end) if end > start => Some(&text[start..=end]),
        _ => Some(&text[start..]),
    }
}

fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{201c}', '\u{201d}'], "\"")
}

fn remove_trailing_commas(text: &str) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in chars.iter().enumerate() {
        if in_string {
            out.push(*ch);
            if escaped {
                escaped = false;
            } else if *ch == '\\' {
                escaped = true;
            } else if *ch == '"' {
                in_string = false;
            }
            continue;
        }
        if *ch == '"' {
            in_string = true;
        }
        if *ch == ',' {
            let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']') | None) {
                continue;
            }
        }
        out.push(*ch);
    }
    out
}

fn close_brackets(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    let mut out = text.trim_end().to_string();
    if in_string {
        out.push('"');
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Report {
        score: u8,
        red_flags: Vec<String>,
    }

    #[test]
    fn strips_fences_and_prose() {
        let text = "Here you go:\n```json\n{\"score\": 3, \"red_flags\": []}\n```";
        assert_eq!(repair_json(text), Some(json!({ "score": 3, "red_flags": [] })));
        let prose = "Sure! {\"score\": 4, \"red_flags\": [\"a\"]} Hope this helps.";
        let report: Report = parse_structured(prose).unwrap();
        assert_eq!(report.score, 4);
    }

    #[test]
    fn drops_trailing_commas_outside_strings() {
        let text = r#"{"score": 2, "red_flags": ["late, again",],}"#;
        let report: Report = parse_structured(text).unwrap();
        assert_eq!(report.red_flags, vec!["late, again".to_string()]);
    }

    #[test]
    fn closes_truncated_output() {
        let text = r#"{"score": 1, "red_flags": ["no revenue", "solo found"#;
        let report: Report = parse_structured(text).unwrap();
        assert_eq!(report.red_flags.len(), 2);
    }

    #[test]
    fn reports_non_json_and_wrong_shapes() {
        assert!(parse_structured::<Report>("I cannot score this").is_err());
        let err = parse_structured::<Report>(r#"{"score": "high"}"#).unwrap_err();
        assert!(err.to_string().contains("wrong shape"));
    }
}
