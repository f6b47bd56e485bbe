//! Deck draft tree produced and revised by the models.
//!
//! Model output is loose: bullets may arrive as one string, scores as
//! strings, chart data in odd shapes. Deserialization here absorbs that so a
//! usable draft is never rejected over a cosmetic field.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::lenient::{bullets, lenient, text_or_empty};
use crate::render::ChartSpec;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Minimalist,
    #[default]
    Professional,
    Creative,
    DarkModern,
}

impl Theme {
    pub const ALL: [Theme; 4] = [
        Theme::Minimalist,
        Theme::Professional,
        Theme::Creative,
        Theme::DarkModern,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Minimalist => "minimalist",
            Theme::Professional => "professional",
            Theme::Creative => "creative",
            Theme::DarkModern => "dark_modern",
        }
    }

    /// Unknown names fall back to the default theme.
    pub fn parse_lenient(value: &str) -> Self {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Theme::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .unwrap_or_default()
    }

    pub fn default_palette(self) -> Vec<String> {
        let colors: &[&str] = match self {
            Theme::Minimalist => &["#111111", "#6B7280", "#D1D5DB"],
            Theme::Professional => &["#1E3A8A", "#2563EB", "#93C5FD", "#F59E0B"],
            Theme::Creative => &["#F97316", "#EC4899", "#8B5CF6", "#10B981"],
            Theme::DarkModern => &["#38BDF8", "#A78BFA", "#F472B6", "#34D399"],
        };
        colors.iter().map(|c| c.to_string()).collect()
    }

    pub fn background(self) -> &'static str {
        match self {
            Theme::Creative => "#FFF7ED",
            Theme::DarkModern => "#0F172A",
            _ => "#FFFFFF",
        }
    }

    pub fn text_color(self) -> &'static str {
        match self {
            Theme::Minimalist => "#111111",
            Theme::DarkModern => "#F8FAFC",
            _ => "#1F2937",
        }
    }

    pub fn font(self) -> &'static str {
        match self {
            Theme::Minimalist => "Helvetica",
            Theme::Professional => "Calibri",
            Theme::Creative => "Montserrat",
            Theme::DarkModern => "Inter",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "bullets")]
    pub content: Vec<String>,
    #[serde(default, deserialize_with = "text_or_empty")]
    pub speaker_notes: String,
    #[serde(default, deserialize_with = "lenient")]
    pub image_prompt: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub visualization_data: Option<ChartSpec>,
    #[serde(default)]
    pub visualization_path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "theme")]
    pub theme: Theme,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Draft {
    pub fn is_usable(&self) -> bool {
        self.sections.iter().any(|s| !s.title.trim().is_empty() || !s.content.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    #[serde(default, deserialize_with = "text_or_empty")]
    pub critique: String,
    #[serde(default, deserialize_with = "score_0_100")]
    pub score: u32,
    #[serde(default, deserialize_with = "bullets")]
    pub recommendations: Vec<String>,
}

fn theme<'de, D: Deserializer<'de>>(d: D) -> Result<Theme, D::Error> {
    Ok(Value::deserialize(d)?
        .as_str()
        .map(Theme::parse_lenient)
        .unwrap_or_default())
}

fn score_0_100<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(d)?;
    let raw = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches("/100").trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|v| v.is_finite())
        .map(|v| v.round().clamp(0.0, 100.0) as u32)
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ChartKind;
    use serde_json::json;

    #[test]
    fn loose_model_output_is_absorbed() {
        let draft: Draft = serde_json::from_value(json!({
            "title": "FleetFix",
            "theme": "Dark Modern",
            "sections": [{
                "title": "Problem",
                "content": "- Trucks break down\n- Repairs take days",
                "speaker_notes": null,
                "image_prompt": null,
                "visualization_data": {"chart_type": "line", "title": "Downtime", "labels": ["Q1"], "values": [3]}
            }, {
                "title": "Ask",
                "content": ["$1.5M seed", 18],
                "visualization_data": "not a chart"
            }]
        }))
        .unwrap();
        assert_eq!(draft.theme, Theme::DarkModern);
        assert_eq!(draft.sections[0].content, vec!["Trucks break down", "Repairs take days"]);
        assert_eq!(draft.sections[0].visualization_data.as_ref().unwrap().kind, ChartKind::Line);
        assert_eq!(draft.sections[1].content, vec!["$1.5M seed", "18"]);
        assert!(draft.sections[1].visualization_data.is_none());
        assert!(draft.is_usable());
    }

    #[test]
    fn critique_scores_are_clamped() {
        let c: Critique = serde_json::from_value(json!({"critique": "ok", "score": "85/100"})).unwrap();
        assert_eq!(c.score, 85);
        let c: Critique = serde_json::from_value(json!({"score": 140.2, "recommendations": ["a"]})).unwrap();
        assert_eq!(c.score, 100);
        assert_eq!(c.recommendations, vec!["a"]);
        assert_eq!(Theme::parse_lenient("neon"), Theme::Professional);
    }
}
