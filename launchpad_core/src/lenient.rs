//! `deserialize_with` helpers for model output.
//!
//! Models return lists as one string, numbers as strings and objects where a
//! string was asked for. These helpers take whatever arrived and never fail
//! the surrounding record.

use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Strings, one per item. A single string is split into lines with list
/// markers stripped.
pub fn bullets<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(text_of).filter(|s| !s.is_empty()).collect(),
        Value::String(text) => text
            .lines()
            .map(|l| l.trim().trim_start_matches(['-', '*', '•']).trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

pub fn text_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(text_of(&Value::deserialize(d)?).unwrap_or_default())
}

/// `None` for null or anything that does not parse as `T`.
pub fn lenient<'de, D: Deserializer<'de>, T: DeserializeOwned>(d: D) -> Result<Option<T>, D::Error> {
    let value = Value::deserialize(d)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// Reads `4`, `4.4`, `"4"` or `"4/5"`; anything else is `None`.
pub fn number_of(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().split('/').next().and_then(|s| s.trim().parse::<f64>().ok()),
        _ => None,
    }?;
    raw.is_finite().then_some(raw)
}

/// Integer score clamped to `0..=5`; unreadable becomes `0`.
pub fn score_0_5<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(number_of(&value).map(|v| v.round().clamp(0.0, 5.0) as u8).unwrap_or(0))
}
