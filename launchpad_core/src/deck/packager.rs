//! Slide shape model and deck file packaging.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;

/// 16:9 slide in inches.
pub const SLIDE_WIDTH: f64 = 13.333;
pub const SLIDE_HEIGHT: f64 = 7.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideLayout {
    Title,
    Bullets,
    BulletsWithImage,
    BulletsWithChart,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Background {
        fill: String,
    },
    Text {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        text: String,
        font: String,
        size: f64,
        color: String,
        bold: bool,
    },
    Bullets {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        items: Vec<String>,
        font: String,
        size: f64,
        color: String,
    },
    Picture {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        path: String,
    },
    Bar {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        fill: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub index: usize,
    pub layout: SlideLayout,
    pub shapes: Vec<Shape>,
    pub notes: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlideDeck {
    pub title: String,
    pub theme: String,
    pub palette: Vec<String>,
    pub width: f64,
    pub height: f64,
    pub slides: Vec<Slide>,
}

/// Serializes a slide model to a deck file.
pub trait DeckPackager: Send + Sync {
    /// File extension (without the dot) of what [`package`](Self::package)
    /// writes.
    fn extension(&self) -> &'static str;

    fn package(&self, deck: &SlideDeck, path: &Path) -> Result<()>;
}

/// Writes the shape model itself as JSON, for inspection or for a renderer
/// other than PowerPoint.
pub struct ShapeModelPackager;

impl DeckPackager for ShapeModelPackager {
    fn extension(&self) -> &'static str {
        "deck.json"
    }

    fn package(&self, deck: &SlideDeck, path: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(deck)?;
        std::fs::write(path, body)?;
        Ok(())
    }
}
