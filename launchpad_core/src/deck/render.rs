//! Turns a final draft into a deck file.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use launchpad_graph::offload;

use super::model::{Draft, Section, Theme};
use super::packager::{Shape, Slide, SlideDeck, SlideLayout, SLIDE_HEIGHT, SLIDE_WIDTH};
use crate::services::Services;
use crate::tools::palette::validate_palette;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteSource {
    Explicit,
    Logo,
    ThemeDefault,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTheme {
    pub theme: Theme,
    pub palette: Vec<String>,
    pub source: PaletteSource,
    pub background: String,
    pub text_color: String,
    pub font: String,
}

#[derive(Clone, Debug, Default)]
pub struct ThemeInputs<'a> {
    pub color_palette: Option<&'a [String]>,
    pub logo_path: Option<&'a Path>,
    pub use_default_colors: bool,
}

/// Explicit palette, then logo colors, then the theme's own palette.
/// `use_default_colors` skips the first two.
pub fn resolve_theme(services: &Services, theme: Theme, inputs: &ThemeInputs<'_>) -> Result<ResolvedTheme> {
    let (palette, source) = if inputs.use_default_colors {
        (theme.default_palette(), PaletteSource::ThemeDefault)
    } else if let Some(explicit) = inputs.color_palette.filter(|p| !p.is_empty()) {
        (validate_palette(explicit)?, PaletteSource::Explicit)
    } else {
        let from_logo = match inputs.logo_path {
            Some(logo) => services.palette.extract(logo).unwrap_or_else(|err| {
                tracing::warn!(logo = %logo.display(), error = %err, "logo palette extraction failed");
                Vec::new()
            }),
            None => Vec::new(),
        };
        if from_logo.is_empty() {
            (theme.default_palette(), PaletteSource::ThemeDefault)
        } else {
            (from_logo, PaletteSource::Logo)
        }
    };
    Ok(ResolvedTheme {
        theme,
        palette,
        source,
        background: theme.background().to_string(),
        text_color: theme.text_color().to_string(),
        font: theme.font().to_string(),
    })
}

/// Fill in missing slide images and charts under `assets`. A failed image or
/// chart leaves the slide text-only.
pub async fn prepare_assets(services: &Services, draft: &mut Draft, theme: &ResolvedTheme, assets: &Path) -> Result<()> {
    tokio::fs::create_dir_all(assets).await?;
    for (idx, section) in draft.sections.iter_mut().enumerate() {
        let has_image = section.image_path.as_deref().is_some_and(|p| Path::new(p).exists());
        if !has_image {
            section.image_path = None;
            if let Some(prompt) = section.image_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
                let path = assets.join(format!("slide_{idx:02}.png"));
                match services.images.generate(prompt, &path).await {
                    Ok(written) => section.image_path = Some(written.display().to_string()),
                    Err(err) => tracing::warn!(slide = idx, error = %err, "slide image skipped"),
                }
            }
        }

        let has_chart = section.visualization_path.as_deref().is_some_and(|p| Path::new(p).exists());
        if !has_chart {
            section.visualization_path = None;
            if let Some(spec) = section.visualization_data.clone().filter(|s| s.is_renderable()) {
                let charts = services.charts.clone();
                let palette = theme.palette.clone();
                let path = assets.join(format!("chart_{idx:02}.svg"));
                match offload(move || charts.render(&spec, &palette, &path)).await? {
                    Ok(written) => section.visualization_path = Some(written.display().to_string()),
                    Err(err) => tracing::warn!(slide = idx, error = %err, "slide chart skipped"),
                }
            }
        }
    }
    Ok(())
}

fn text([x, y, w, h]: [f64; 4], value: &str, theme: &ResolvedTheme, size: f64, bold: bool) -> Shape {
    Shape::Text {
        x,
        y,
        w,
        h,
        text: value.to_string(),
        font: theme.font.clone(),
        size,
        color: theme.text_color.clone(),
        bold,
    }
}

fn accent(theme: &ResolvedTheme) -> String {
    theme.palette.first().cloned().unwrap_or_else(|| theme.text_color.clone())
}

fn title_slide(draft: &Draft, theme: &ResolvedTheme) -> Slide {
    Slide {
        index: 0,
        layout: SlideLayout::Title,
        shapes: vec![
            Shape::Background { fill: theme.background.clone() },
            Shape::Bar { x: 0.0, y: 4.6, w: SLIDE_WIDTH, h: 0.12, fill: accent(theme) },
            text([0.8, 2.6, SLIDE_WIDTH - 1.6, 1.6], &draft.title, theme, 44.0, true),
        ],
        notes: String::new(),
    }
}

fn section_slide(index: usize, section: &Section, theme: &ResolvedTheme) -> Slide {
    let media = section
        .visualization_path
        .as_ref()
        .map(|p| (SlideLayout::BulletsWithChart, p))
        .or_else(|| section.image_path.as_ref().map(|p| (SlideLayout::BulletsWithImage, p)));
    let body_w = if media.is_some() { 6.2 } else { SLIDE_WIDTH - 1.6 };
    let mut shapes = vec![
        Shape::Background { fill: theme.background.clone() },
        Shape::Bar { x: 0.0, y: 0.0, w: 0.18, h: SLIDE_HEIGHT, fill: accent(theme) },
        text([0.8, 0.5, SLIDE_WIDTH - 1.6, 1.0], &section.title, theme, 32.0, true),
        Shape::Bullets {
            x: 0.8,
            y: 1.7,
            w: body_w,
            h: SLIDE_HEIGHT - 2.4,
            items: section.content.clone(),
            font: theme.font.clone(),
            size: 20.0,
            color: theme.text_color.clone(),
        },
    ];
    let layout = match media {
        Some((layout, path)) => {
            shapes.push(Shape::Picture { x: 7.3, y: 1.7, w: 5.4, h: 4.6, path: path.clone() });
            layout
        }
        None => SlideLayout::Bullets,
    };
    Slide {
        index,
        layout,
        shapes,
        notes: section.speaker_notes.clone(),
    }
}

pub fn build_slide_deck(draft: &Draft, theme: &ResolvedTheme) -> SlideDeck {
    let mut slides = vec![title_slide(draft, theme)];
    slides.extend(
        draft
            .sections
            .iter()
            .enumerate()
            .map(|(idx, section)| section_slide(idx + 1, section, theme)),
    );
    SlideDeck {
        title: draft.title.clone(),
        theme: theme.theme.to_string(),
        palette: theme.palette.clone(),
        width: SLIDE_WIDTH,
        height: SLIDE_HEIGHT,
        slides,
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RenderedDeck {
    pub path: PathBuf,
    pub theme: ResolvedTheme,
    pub slides: usize,
    pub draft: Draft,
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn render_deck(services: &Services, mut draft: Draft, inputs: &ThemeInputs<'_>) -> Result<RenderedDeck> {
    if draft.sections.is_empty() {
        return Err(Error::InvalidInput("deck has no sections to render".to_string()));
    }
    let theme = resolve_theme(services, draft.theme, inputs)?;
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
    prepare_assets(services, &mut draft, &theme, &services.output_dir.join(format!("deck_assets_{stamp}")))
        .await?;

    let deck = build_slide_deck(&draft, &theme);
    let path = services
        .output_dir
        .join(format!("presentation_{stamp}.{}", services.packager.extension()));
    let packager = services.packager.clone();
    let out = path.clone();
    let slides = deck.slides.len();
    offload(move || packager.package(&deck, &out))
        .await
        .map_err(Error::from)??;
    tracing::info!(path = %path.display(), slides, palette = ?theme.source, "deck rendered");
    Ok(RenderedDeck { path, theme, slides, draft })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ChartKind, ChartSpec};
    use crate::test_support::{services_with, FakeImages, ScriptedLlm};
    use std::sync::Arc;

    fn draft() -> Draft {
        Draft {
            title: "FleetFix".to_string(),
            theme: Theme::DarkModern,
            sections: vec![
                Section {
                    title: "Problem".to_string(),
                    content: vec!["Downtime".to_string()],
                    image_prompt: Some("a van".to_string()),
                    ..Section::default()
                },
                Section {
                    title: "Market".to_string(),
                    content: vec!["$2B".to_string()],
                    visualization_data: Some(
                        ChartSpec::new(ChartKind::Pie, "Split").with_points(vec!["a".into()], vec![1.0]),
                    ),
                    ..Section::default()
                },
            ],
        }
    }

    fn inputs<'a>(palette: Option<&'a [String]>, logo: &'a Path, use_default_colors: bool) -> ThemeInputs<'a> {
        ThemeInputs {
            color_palette: palette,
            logo_path: Some(logo),
            use_default_colors,
        }
    }

    #[test]
    fn palette_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(ScriptedLlm::new(), dir.path());
        let logo = dir.path().join("logo.svg");
        std::fs::write(&logo, r##"<svg fill="#336699"/>"##).unwrap();
        let explicit = vec!["#abc".to_string()];

        let t = resolve_theme(&services, Theme::Creative, &inputs(Some(&explicit), &logo, false)).unwrap();
        assert_eq!((t.source, t.palette), (PaletteSource::Explicit, vec!["#AABBCC".to_string()]));
        let t = resolve_theme(&services, Theme::Creative, &inputs(None, &logo, false)).unwrap();
        assert_eq!((t.source, t.palette), (PaletteSource::Logo, vec!["#336699".to_string()]));
        let t = resolve_theme(&services, Theme::Creative, &inputs(Some(&explicit), &logo, true)).unwrap();
        assert_eq!(t.source, PaletteSource::ThemeDefault);
        assert_eq!(t.palette, Theme::Creative.default_palette());

        let bad = vec!["red".to_string()];
        assert!(resolve_theme(&services, Theme::Creative, &inputs(Some(&bad), &logo, false)).is_err());
    }

    #[tokio::test]
    async fn renders_assets_and_packages_the_deck() {
        let dir = tempfile::tempdir().unwrap();
        let mut services = services_with(ScriptedLlm::new(), dir.path());
        services.images = Arc::new(FakeImages);
        let rendered = render_deck(&services, draft(), &ThemeInputs::default()).await.unwrap();

        assert!(rendered.path.exists());
        let name = rendered.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("presentation_") && name.ends_with(".pptx"));
        assert_eq!(rendered.slides, 3);
        assert_eq!(rendered.theme.background, "#0F172A");
        let problem = &rendered.draft.sections[0];
        assert!(Path::new(problem.image_path.as_ref().unwrap()).exists());
        let market = &rendered.draft.sections[1];
        assert!(market.visualization_path.as_ref().unwrap().ends_with(".svg"));

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&rendered.path).unwrap()).unwrap();
        assert!(archive.by_name("ppt/slides/slide3.xml").is_ok());
        assert!(archive.by_name("ppt/media/image1.png").is_ok());
        assert!(archive.by_name("ppt/media/image2.svg").is_ok());

        let deck = build_slide_deck(&rendered.draft, &rendered.theme);
        assert_eq!(deck.slides[1].layout, SlideLayout::BulletsWithImage);
        assert_eq!(deck.slides[2].layout, SlideLayout::BulletsWithChart);
    }

    #[tokio::test]
    async fn missing_image_provider_keeps_text_slides() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(ScriptedLlm::new(), dir.path());
        let rendered = render_deck(&services, draft(), &ThemeInputs::default()).await.unwrap();
        assert!(rendered.draft.sections[0].image_path.is_none());
        assert!(render_deck(&services, Draft::default(), &ThemeInputs::default()).await.is_err());
    }
}
