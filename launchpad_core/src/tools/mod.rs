//! Adapters for the outside world: web search, trend series, page fetching,
//! screenshots, image generation and logo colors.

pub mod images;
pub mod palette;
pub mod screenshot;
pub mod search;
pub mod tech_stack;
pub mod trends;

pub use images::{ImageGenerator, NoImages, OpenAiImages};
pub use palette::{PaletteExtractor, SvgPaletteExtractor};
pub use screenshot::{HttpScreenshot, NoScreenshot, Screenshot, ScreenshotProvider};
pub use search::{DisabledSearch, SearchHit, SerperSearch, WebSearch};
pub use tech_stack::{HttpPageFetcher, NoPageFetcher, PageFetcher, TechStackReport};
pub use trends::{SerpApiTrends, TrendSeries, TrendSource, WikipediaPageviews};
