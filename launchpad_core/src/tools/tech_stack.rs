//! Website technology detection.
//!
//! Hosted no-code builders are recognised from the URL alone. Otherwise the
//! landing page is fetched and matched against HTML signatures; the scan runs
//! on the blocking pool.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

use launchpad_graph::error::{GraphError, Result};
use launchpad_graph::node::offload;

pub const PAGE_TIMEOUT: Duration = Duration::from_secs(30);
/// Pages larger than this are truncated before scanning.
const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

const NO_CODE_HOSTS: &[(&str, &str)] = &[
    (".wixsite.com", "Wix"),
    (".webflow.io", "Webflow"),
    (".bubbleapps.io", "Bubble"),
    (".squarespace.com", "Squarespace"),
    (".myshopify.com", "Shopify"),
    (".carrd.co", "Carrd"),
    (".framer.website", "Framer"),
    (".framer.app", "Framer"),
    (".glideapp.io", "Glide"),
    (".softr.app", "Softr"),
    (".notion.site", "Notion"),
    (".wordpress.com", "WordPress.com"),
    (".godaddysites.com", "GoDaddy Website Builder"),
    (".weebly.com", "Weebly"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Category {
    NoCode,
    Framework,
    Service,
}

struct Signature {
    name: &'static str,
    category: Category,
    pattern: Regex,
}

static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    let table: &[(&'static str, Category, &str)] = &[
        ("Wix", Category::NoCode, r"static\.wixstatic\.com|X-Wix-"),
        ("Webflow", Category::NoCode, r"data-wf-page|webflow\.js"),
        ("Squarespace", Category::NoCode, r"static1\.squarespace\.com"),
        ("Shopify", Category::NoCode, r"cdn\.shopify\.com"),
        ("Bubble", Category::NoCode, r"bubble_page_load|/package/run_js/"),
        ("Framer", Category::NoCode, r"framerusercontent\.com|data-framer-"),
        ("WordPress", Category::NoCode, r"/wp-content/|/wp-includes/"),
        ("Next.js", Category::Framework, r"__NEXT_DATA__|/_next/static/"),
        ("Nuxt", Category::Framework, r"__NUXT__|/_nuxt/"),
        ("Gatsby", Category::Framework, r"___gatsby"),
        ("React", Category::Framework, r"data-reactroot|react-dom(\.production)?(\.min)?\.js"),
        ("Vue.js", Category::Framework, r"data-v-[0-9a-f]{8}|vue(\.runtime)?(\.min)?\.js"),
        ("Angular", Category::Framework, r#"ng-version="#),
        ("Svelte", Category::Framework, r"svelte-[a-z0-9]{6}|__sveltekit"),
        ("jQuery", Category::Framework, r"jquery(-[0-9.]+)?(\.min)?\.js"),
        ("Bootstrap", Category::Framework, r"bootstrap(\.bundle)?(\.min)?\.(css|js)"),
        ("Google Analytics", Category::Service, r"googletagmanager\.com|google-analytics\.com"),
        ("Stripe", Category::Service, r"js\.stripe\.com"),
        ("Intercom", Category::Service, r"widget\.intercom\.io"),
        ("HubSpot", Category::Service, r"js\.hs-scripts\.com|js\.hsforms\.net"),
        ("Hotjar", Category::Service, r"static\.hotjar\.com"),
        ("Cloudflare", Category::Service, r"cdnjs\.cloudflare\.com|/cdn-cgi/"),
    ];
    table
        .iter()
        .map(|(name, category, pattern)| Signature {
            name: *name,
            category: *category,
            pattern: Regex::new(&format!("(?i){pattern}")).expect("valid regex"),
        })
        .collect()
});

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStackReport {
    pub verdict: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_code_platform: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

impl TechStackReport {
    pub fn no_url() -> Self {
        Self {
            verdict: "No URL".to_string(),
            ..Self::default()
        }
    }
}

/// No-code builder implied by the host name, if any.
pub fn classify_url(url: &str) -> Option<&'static str> {
    let host = url_host(url)?;
    let dotted = format!(".{host}");
    NO_CODE_HOSTS
        .iter()
        .find(|(suffix, _)| dotted.ends_with(suffix))
        .map(|(_, platform)| *platform)
}

fn url_host(url: &str) -> Option<String> {
    let rest = url.trim().split_once("://").map(|(_, r)| r).unwrap_or(url.trim());
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.rsplit('@').next()?.split(':').next()?;
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// Technologies whose signatures appear in `html`, no-code builders first.
pub fn detect_html(html: &str) -> Vec<(String, bool)> {
    let mut found = SIGNATURES
        .iter()
        .filter(|sig| sig.pattern.is_match(html))
        .map(|sig| (sig.name.to_string(), sig.category == Category::NoCode))
        .collect::<Vec<_>>();
    found.sort_by_key(|(_, no_code)| !*no_code);
    found
}

fn report_from_html(url: &str, html: &str) -> TechStackReport {
    let detected = detect_html(html);
    let no_code = detected.iter().find(|(_, nc)| *nc).map(|(n, _)| n.clone());
    let technologies = detected.into_iter().map(|(name, _)| name).collect::<Vec<_>>();
    let verdict = match (&no_code, technologies.is_empty()) {
        (Some(platform), _) => format!("No-code platform: {platform}"),
        (None, true) => "Custom code (no known signatures)".to_string(),
        (None, false) => format!("Custom code: {}", technologies.join(", ")),
    };
    TechStackReport {
        verdict,
        url: Some(url.to_string()),
        no_code_platform: no_code,
        technologies,
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Offline stand-in: every fetch fails.
pub struct NoPageFetcher;

#[async_trait]
impl PageFetcher for NoPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        Err(GraphError::unavailable(format!("page fetching disabled for {url}")))
    }
}

#[derive(Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpPageFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(PAGE_TIMEOUT)
            .user_agent("Mozilla/5.0 (compatible; launchpad-techscan/0.1)")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GraphError::unavailable(format!("fetch {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GraphError::unavailable(format!("fetch {url}: HTTP {status}")));
        }
        let mut body = resp
            .text()
            .await
            .map_err(|e| GraphError::unavailable(format!("read {url}: {e}")))?;
        if body.len() > MAX_PAGE_BYTES {
            let mut cut = MAX_PAGE_BYTES;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Ok(body)
    }
}

/// Detect the stack behind `url`. A missing URL is not an error.
#[tracing::instrument(level = "debug", skip(fetcher))]
pub async fn detect_tech_stack(fetcher: &dyn PageFetcher, url: Option<&str>) -> Result<TechStackReport> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(TechStackReport::no_url());
    };
    let url = if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };
    if let Some(platform) = classify_url(&url) {
        return Ok(TechStackReport {
            verdict: format!("No-code platform: {platform}"),
            url: Some(url),
            no_code_platform: Some(platform.to_string()),
            technologies: vec![platform.to_string()],
        });
    }
    let html = fetcher.fetch(&url).await?;
    offload(move || report_from_html(&url, &html)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakePage;

    #[test]
    fn url_suffixes_identify_builders() {
        assert_eq!(classify_url("https://acme.wixsite.com/home"), Some("Wix"));
        assert_eq!(classify_url("acme.webflow.io"), Some("Webflow"));
        assert_eq!(classify_url("https://user@shop.myshopify.com:443/x"), Some("Shopify"));
        assert_eq!(classify_url("https://acme.com"), None);
        assert_eq!(classify_url("https://notwixsite.com"), None);
    }

    #[test]
    fn html_signatures_rank_no_code_first() {
        let html = r#"<script src="/_next/static/chunks/main.js"></script>
            <link href="https://cdn.shopify.com/s/files/theme.css">
            <script src="https://js.stripe.com/v3"></script>"#;
        let found = detect_html(html);
        assert_eq!(found[0], ("Shopify".to_string(), true));
        let report = report_from_html("https://acme.com", html);
        assert_eq!(report.verdict, "No-code platform: Shopify");
        assert!(report.technologies.contains(&"Next.js".to_string()));
        assert!(report.technologies.contains(&"Stripe".to_string()));
    }

    #[tokio::test]
    async fn detection_paths() {
        let page = FakePage("<div data-reactroot></div>".to_string());
        assert_eq!(detect_tech_stack(&page, None).await.unwrap().verdict, "No URL");
        assert_eq!(detect_tech_stack(&page, Some("  ")).await.unwrap(), TechStackReport::no_url());
        let wix = detect_tech_stack(&page, Some("https://a.wixsite.com")).await.unwrap();
        assert_eq!(wix.no_code_platform.as_deref(), Some("Wix"));
        let custom = detect_tech_stack(&page, Some("acme.io")).await.unwrap();
        assert_eq!(custom.verdict, "Custom code: React");
        assert_eq!(custom.url.as_deref(), Some("https://acme.io"));
        assert!(detect_tech_stack(&NoPageFetcher, Some("acme.io")).await.is_err());
    }
}
