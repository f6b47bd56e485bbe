//! Process-wide collaborators shared by every graph.
//!
//! One [`Services`] value is built at startup and cloned into each graph; all
//! clones share the same rate-limit gates, so provider spacing holds across
//! concurrent requests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use launchpad_graph::llm::LlmClient;
use launchpad_graph::ratelimit::RateLimiter;
use launchpad_graph::retry::ProviderService;

use crate::agents::Agents;
use crate::config::{ImageProviderKind, PlatformConfig, DEFAULT_PPT_MAX_ITERATIONS};
use crate::deck::packager::DeckPackager;
use crate::deck::pptx::PptxPackager;
use crate::render::{ChartRenderer, PdfRenderer, SvgCharts, TextPdf};
use crate::tools::{
    DisabledSearch, HttpPageFetcher, HttpScreenshot, ImageGenerator, NoImages, NoPageFetcher,
    NoScreenshot, OpenAiImages, PageFetcher, PaletteExtractor, ScreenshotProvider, SerpApiTrends,
    SerperSearch, SvgPaletteExtractor, TrendSource, WebSearch, WikipediaPageviews,
};
use crate::Result;

#[derive(Clone)]
pub struct Services {
    pub agents: Arc<Agents>,
    pub search: Arc<dyn WebSearch>,
    /// Tried in order; the first non-empty series wins.
    pub trends: Vec<Arc<dyn TrendSource>>,
    pub pages: Arc<dyn PageFetcher>,
    pub screenshots: Arc<dyn ScreenshotProvider>,
    pub images: Arc<dyn ImageGenerator>,
    pub palette: Arc<dyn PaletteExtractor>,
    pub charts: Arc<dyn ChartRenderer>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub packager: Arc<dyn DeckPackager>,
    pub output_dir: PathBuf,
    pub ppt_max_iterations: u32,
}

impl Services {
    /// Offline defaults: no search, trends, page fetching, screenshots or
    /// image generation until set explicitly.
    pub fn builder(agents: Arc<Agents>, output_dir: impl AsRef<Path>) -> ServicesBuilder {
        ServicesBuilder {
            services: Services {
                agents,
                search: Arc::new(DisabledSearch),
                trends: Vec::new(),
                pages: Arc::new(NoPageFetcher),
                screenshots: Arc::new(NoScreenshot),
                images: Arc::new(NoImages),
                palette: Arc::new(SvgPaletteExtractor),
                charts: Arc::new(SvgCharts),
                pdf: Arc::new(TextPdf),
                packager: Arc::new(PptxPackager),
                output_dir: output_dir.as_ref().to_path_buf(),
                ppt_max_iterations: DEFAULT_PPT_MAX_ITERATIONS,
            },
        }
    }

    /// Wire the live adapters described by `config`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn from_config(config: &PlatformConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.gates.clone()));
        let service = ProviderService::new(limiter, config.retry.clone());
        let agents = Agents::new(Arc::new(LlmClient::new()), service.clone(), config.llm.clone());

        let mut builder = Self::builder(Arc::new(agents), &config.output_dir)
            .pages(Arc::new(HttpPageFetcher::new()))
            .ppt_max_iterations(config.ppt_max_iterations);

        let search = &config.search;
        match &search.serper_api_key {
            Some(key) => builder = builder.search(Arc::new(SerperSearch::new(key.clone(), service.clone()))),
            None => tracing::warn!("SERPER_API_KEY not set; web search disabled"),
        }
        let mut trends: Vec<Arc<dyn TrendSource>> = Vec::new();
        if let Some(key) = &search.serpapi_api_key {
            trends.push(Arc::new(SerpApiTrends::new(
                key.clone(),
                search.trends_geo.clone(),
                service.clone(),
            )));
        }
        trends.push(Arc::new(WikipediaPageviews::new(search.wiki_lang.clone(), service.clone())));
        builder = builder.trends(trends);

        if let Some(endpoint) = &search.screenshot_endpoint {
            builder = builder.screenshots(Arc::new(HttpScreenshot::new(endpoint.clone())));
        }
        if let (ImageProviderKind::OpenAi, Some(key)) = (config.images.provider, &config.images.api_key) {
            builder = builder.images(Arc::new(OpenAiImages::new(key.clone(), service)));
        }

        std::fs::create_dir_all(&config.output_dir)?;
        Ok(builder.build())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.output_dir.join("data_output")
    }
}

pub struct ServicesBuilder {
    services: Services,
}

impl ServicesBuilder {
    pub fn search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.services.search = search;
        self
    }

    pub fn trends(mut self, trends: Vec<Arc<dyn TrendSource>>) -> Self {
        self.services.trends = trends;
        self
    }

    pub fn pages(mut self, pages: Arc<dyn PageFetcher>) -> Self {
        self.services.pages = pages;
        self
    }

    pub fn screenshots(mut self, screenshots: Arc<dyn ScreenshotProvider>) -> Self {
        self.services.screenshots = screenshots;
        self
    }

    pub fn images(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.services.images = images;
        self
    }

    pub fn palette(mut self, palette: Arc<dyn PaletteExtractor>) -> Self {
        self.services.palette = palette;
        self
    }

    pub fn charts(mut self, charts: Arc<dyn ChartRenderer>) -> Self {
        self.services.charts = charts;
        self
    }

    pub fn pdf(mut self, pdf: Arc<dyn PdfRenderer>) -> Self {
        self.services.pdf = pdf;
        self
    }

    pub fn packager(mut self, packager: Arc<dyn DeckPackager>) -> Self {
        self.services.packager = packager;
        self
    }

    pub fn ppt_max_iterations(mut self, max: u32) -> Self {
        self.services.ppt_max_iterations = max.max(1);
        self
    }

    pub fn build(self) -> Services {
        self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn live_wiring_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let vars: HashMap<&str, String> = [
            ("GEMINI_API_KEY", "g".to_string()),
            ("SERPAPI_API_KEY", "s".to_string()),
            ("LAUNCHPAD_OUTPUT_DIR", out.display().to_string()),
            ("PPT_MAX_ITERATIONS", "4".to_string()),
        ]
        .into_iter()
        .collect();
        let config = PlatformConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let services = Services::from_config(&config).unwrap();
        assert_eq!(services.trends.len(), 2);
        assert_eq!(services.trends[0].name(), "google_trends");
        assert_eq!(services.trends[1].name(), "wikipedia_pageviews");
        assert_eq!(services.ppt_max_iterations, 4);
        assert!(out.is_dir());
        assert_eq!(services.data_dir(), out.join("data_output"));
    }
}
