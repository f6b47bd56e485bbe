//! Interest-over-time sources: Google Trends (via SerpApi) and Wikipedia
//! pageviews as the keyless fallback.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use launchpad_graph::error::{GraphError, ProviderError, Result};
use launchpad_graph::provider::Provider;
use launchpad_graph::retry::ProviderService;

pub const TRENDS_TIMEOUT: Duration = Duration::from_secs(30);
/// Points averaged at each end of the series for year-over-year growth.
pub const GROWTH_WINDOW: usize = 30;
const USER_AGENT: &str = "launchpad-research/0.1 (market research pipeline)";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub topic: String,
    pub source: String,
    pub points: Vec<TrendPoint>,
}

impl TrendSeries {
    /// Daily series ending today.
    pub fn from_values(topic: &str, source: &str, values: &[f64]) -> Self {
        let today = Utc::now().date_naive();
        let start = today - ChronoDuration::days(values.len() as i64);
        let points = values
            .iter()
            .enumerate()
            .map(|(idx, value)| TrendPoint {
                date: (start + ChronoDuration::days(idx as i64 + 1)).to_string(),
                value: *value,
            })
            .collect();
        Self {
            topic: topic.to_string(),
            source: source.to_string(),
            points,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn growth_pct(&self) -> f64 {
        yoy_growth_pct(&self.values())
    }
}

#[async_trait]
pub trait TrendSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn daily_series(&self, topic: &str) -> Result<TrendSeries>;
}

/// `(mean(last window) - mean(first window)) / mean(first window)` in percent.
/// Short series use half their length as the window; a zero baseline yields 0.
pub fn yoy_growth_pct(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let window = GROWTH_WINDOW.min(values.len() / 2).max(1);
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let first = mean(&values[..window]);
    let last = mean(&values[values.len() - window..]);
    if first.abs() < f64::EPSILON {
        return 0.0;
    }
    (last - first) / first * 100.0
}

/// Least-squares `(slope, intercept)` over the point index.
pub fn linear_trend(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.len() < 2 {
        return (0.0, values.first().copied().unwrap_or(0.0));
    }
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (idx, y) in values.iter().enumerate() {
        let dx = idx as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    let slope = if den == 0.0 { 0.0 } else { num / den };
    (slope, mean_y - slope * mean_x)
}

/// First source that returns a non-empty series.
pub async fn fetch_first(sources: &[Arc<dyn TrendSource>], topic: &str) -> Result<TrendSeries> {
    let mut last_err = None;
    for source in sources {
        match source.daily_series(topic).await {
            Ok(series) if !series.points.is_empty() => return Ok(series),
            Ok(_) => {
                tracing::warn!(source = source.name(), topic, "trend source returned no data");
            }
            Err(err) => {
                tracing::warn!(source = source.name(), topic, error = %err, "trend source failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| GraphError::unavailable(format!("no trend data for '{topic}'"))))
}

fn http_client() -> Client {
    Client::builder()
        .timeout(TRENDS_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    provider: Provider,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, &e))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(provider, status.as_u16(), &body).into());
    }
    resp.json()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, &e).into())
}

#[derive(Debug, Deserialize)]
struct PageviewsResponse {
    #[serde(default)]
    items: Vec<PageviewItem>,
}

#[derive(Debug, Deserialize)]
struct PageviewItem {
    timestamp: String,
    views: f64,
}

/// Daily article views over the last year from the Wikimedia REST API.
#[derive(Clone)]
pub struct WikipediaPageviews {
    client: Client,
    lang: String,
    service: ProviderService,
}

impl WikipediaPageviews {
    pub fn new(lang: impl Into<String>, service: ProviderService) -> Self {
        Self {
            client: http_client(),
            lang: lang.into(),
            service,
        }
    }

    fn url(&self, topic: &str, start: NaiveDate, end: NaiveDate) -> String {
        let article = topic.trim().replace(' ', "_");
        format!(
            "https://wikimedia.org/api/rest_v1/metrics/pageviews/per-article/{}.wikipedia/all-access/user/{}/daily/{}00/{}00",
            self.lang,
            urlencode(&article),
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
        )
    }
}

#[async_trait]
impl TrendSource for WikipediaPageviews {
    fn name(&self) -> &'static str {
        "wikipedia_pageviews"
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn daily_series(&self, topic: &str) -> Result<TrendSeries> {
        let end = Utc::now().date_naive() - ChronoDuration::days(1);
        let start = end - ChronoDuration::days(365);
        let url = self.url(topic, start, end);
        let parsed: PageviewsResponse = self
            .service
            .call(Provider::Wikipedia, |p| get_json(&self.client, p, &url, &[]))
            .await?;
        let points = parsed
            .items
            .into_iter()
            .map(|item| TrendPoint {
                date: pageview_date(&item.timestamp),
                value: item.views,
            })
            .collect();
        Ok(TrendSeries {
            topic: topic.to_string(),
            source: self.name().to_string(),
            points,
        })
    }
}

fn pageview_date(timestamp: &str) -> String {
    NaiveDate::parse_from_str(timestamp.get(..8).unwrap_or(timestamp), "%Y%m%d")
        .map(|d| d.to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

fn urlencode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' | b'~' | b'(' | b')' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[derive(Debug, Deserialize)]
struct SerpApiTrendsResponse {
    #[serde(default)]
    interest_over_time: Option<InterestOverTime>,
}

#[derive(Debug, Deserialize)]
struct InterestOverTime {
    #[serde(default)]
    timeline_data: Vec<TimelinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimelinePoint {
    date: String,
    #[serde(default)]
    values: Vec<TimelineValue>,
}

#[derive(Debug, Deserialize)]
struct TimelineValue {
    #[serde(default)]
    extracted_value: f64,
}

/// Google Trends interest over the past twelve months through SerpApi.
#[derive(Clone)]
pub struct SerpApiTrends {
    client: Client,
    api_key: String,
    geo: Option<String>,
    service: ProviderService,
}

impl SerpApiTrends {
    pub fn new(api_key: impl Into<String>, geo: Option<String>, service: ProviderService) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            geo,
            service,
        }
    }
}

#[async_trait]
impl TrendSource for SerpApiTrends {
    fn name(&self) -> &'static str {
        "google_trends"
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn daily_series(&self, topic: &str) -> Result<TrendSeries> {
        let mut query = vec![
            ("engine", "google_trends"),
            ("q", topic),
            ("data_type", "TIMESERIES"),
            ("date", "today 12-m"),
            ("api_key", self.api_key.as_str()),
        ];
        if let Some(geo) = self.geo.as_deref() {
            query.push(("geo", geo));
        }
        let parsed: SerpApiTrendsResponse = self
            .service
            .call(Provider::SerpApi, |p| {
                get_json(&self.client, p, "https://serpapi.com/search.json", &query)
            })
            .await?;
        let points = parsed
            .interest_over_time
            .map(|iot| iot.timeline_data)
            .unwrap_or_default()
            .into_iter()
            .map(|point| TrendPoint {
                date: point.date,
                value: point.values.first().map(|v| v.extracted_value).unwrap_or(0.0),
            })
            .collect();
        Ok(TrendSeries {
            topic: topic.to_string(),
            source: self.name().to_string(),
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl TrendSource for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn daily_series(&self, _topic: &str) -> Result<TrendSeries> {
            Err(GraphError::unavailable("down"))
        }
    }

    struct Fixed(Vec<f64>);

    #[async_trait]
    impl TrendSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn daily_series(&self, topic: &str) -> Result<TrendSeries> {
            Ok(TrendSeries::from_values(topic, "fixed", &self.0))
        }
    }

    #[test]
    fn growth_compares_first_and_last_windows() {
        let mut values = vec![100.0; 30];
        values.extend(vec![50.0; 300]);
        values.extend(vec![130.0; 30]);
        assert!((yoy_growth_pct(&values) - 30.0).abs() < 1e-9);
        assert_eq!(yoy_growth_pct(&[0.0; 90]), 0.0);
        assert_eq!(yoy_growth_pct(&[5.0]), 0.0);
        assert!((yoy_growth_pct(&[10.0, 20.0, 15.0, 30.0]) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn trendline_fits_a_line() {
        let (slope, intercept) = linear_trend(&[1.0, 3.0, 5.0, 7.0]);
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn first_working_source_wins() {
        let sources: Vec<Arc<dyn TrendSource>> = vec![
            Arc::new(Failing),
            Arc::new(Fixed(vec![])),
            Arc::new(Fixed(vec![1.0, 2.0])),
        ];
        let series = fetch_first(&sources, "Bicycle").await.unwrap();
        assert_eq!(series.points.len(), 2);
        assert!(fetch_first(&sources[..1], "Bicycle").await.is_err());
    }

    #[test]
    fn wikipedia_urls_are_encoded() {
        assert_eq!(urlencode("Café_(bar)"), "Caf%C3%A9_(bar)");
        assert_eq!(pageview_date("2024010100"), "2024-01-01");
    }
}
