//! Brand colors: explicit palettes and logo extraction.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::{Error, Result};

pub const MAX_PALETTE: usize = 5;

static HEX_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b").expect("valid regex"));

/// Normalise `#abc`, `abc`, `#AABBCC` to `#AABBCC`.
pub fn normalize_hex(value: &str) -> Option<String> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let full = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
        6 => hex.to_string(),
        _ => return None,
    };
    Some(format!("#{}", full.to_ascii_uppercase()))
}

/// Parse a palette supplied as a JSON array string, e.g. `["#112233", "#abc"]`.
pub fn parse_palette_json(text: &str) -> Result<Vec<String>> {
    let values: Vec<String> = serde_json::from_str(text)
        .map_err(|e| Error::InvalidInput(format!("color_palette must be a JSON array of hex strings: {e}")))?;
    validate_palette(&values)
}

pub fn validate_palette(values: &[String]) -> Result<Vec<String>> {
    values
        .iter()
        .map(|v| {
            normalize_hex(v).ok_or_else(|| Error::InvalidInput(format!("invalid hex color: {v}")))
        })
        .collect()
}

fn rgb(hex: &str) -> (u8, u8, u8) {
    let channel = |range: std::ops::Range<usize>| {
        hex.get(range)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .unwrap_or(0)
    };
    (channel(1..3), channel(3..5), channel(5..7))
}

/// Near-white and near-black carry no brand information.
fn is_neutral(hex: &str) -> bool {
    let (r, g, b) = rgb(hex);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    max < 24 || min > 235
}

pub trait PaletteExtractor: Send + Sync {
    fn extract(&self, logo: &Path) -> Result<Vec<String>>;
}

/// Reads fill and stroke colors out of SVG logos, most frequent first.
/// Raster logos yield an empty palette and the theme default applies.
pub struct SvgPaletteExtractor;

impl PaletteExtractor for SvgPaletteExtractor {
    fn extract(&self, logo: &Path) -> Result<Vec<String>> {
        let is_svg = logo
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
        if !is_svg {
            tracing::debug!(logo = %logo.display(), "raster logo; no palette extracted");
            return Ok(Vec::new());
        }
        let svg = std::fs::read_to_string(logo)?;
        Ok(palette_from_svg(&svg))
    }
}

pub fn palette_from_svg(svg: &str) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();
    for caps in HEX_COLOR.captures_iter(svg) {
        let Some(hex) = caps.get(0).and_then(|m| normalize_hex(m.as_str())) else {
            continue;
        };
        if is_neutral(&hex) {
            continue;
        }
        let count = counts.entry(hex.clone()).or_insert(0);
        if *count == 0 {
            order.push(hex);
        }
        *count += 1;
    }
    // Stable on first appearance for equal counts.
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.truncate(MAX_PALETTE);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_normalisation() {
        assert_eq!(normalize_hex("#abc").as_deref(), Some("#AABBCC"));
        assert_eq!(normalize_hex("1a2b3c").as_deref(), Some("#1A2B3C"));
        assert_eq!(normalize_hex("#12345"), None);
        assert_eq!(normalize_hex("blue"), None);
    }

    #[test]
    fn palette_json_is_validated() {
        assert_eq!(
            parse_palette_json(r##"["#112233", "#abc"]"##).unwrap(),
            vec!["#112233", "#AABBCC"]
        );
        assert!(parse_palette_json("#112233").is_err());
        assert!(parse_palette_json(r#"["red"]"#).is_err());
    }

    #[test]
    fn svg_palette_skips_neutrals_and_ranks_by_use() {
        let svg = r##"<svg><rect fill="#FFFFFF"/><path fill="#0057b8"/><path stroke="#ffd700"/>
            <circle fill="#0057B8"/><text fill="#000"/></svg>"##;
        assert_eq!(palette_from_svg(svg), vec!["#0057B8", "#FFD700"]);
    }

    #[test]
    fn raster_logos_yield_no_palette() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("logo.png");
        std::fs::write(&logo, b"\x89PNG").unwrap();
        assert!(SvgPaletteExtractor.extract(&logo).unwrap().is_empty());
        let svg = dir.path().join("logo.svg");
        std::fs::write(&svg, r##"<svg fill="#336699"/>"##).unwrap();
        assert_eq!(SvgPaletteExtractor.extract(&svg).unwrap(), vec!["#336699"]);
    }
}
