//! Google web search through Serper.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use launchpad_graph::error::{GraphError, ProviderError, Result};
use launchpad_graph::provider::Provider;
use launchpad_graph::retry::ProviderService;

pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const SERPER_API_BASE: &str = "https://google.serper.dev";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub link: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, num: usize) -> Result<Vec<SearchHit>>;
}

/// Stand-in used when no search key is configured. Every call fails, and
/// callers degrade to their "no results" path.
pub struct DisabledSearch;

#[async_trait]
impl WebSearch for DisabledSearch {
    async fn search(&self, _query: &str, _num: usize) -> Result<Vec<SearchHit>> {
        Err(GraphError::unavailable(
            "no search provider configured; set SERPER_API_KEY",
        ))
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct SerperSearch {
    client: Client,
    api_base: String,
    api_key: String,
    service: ProviderService,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>, service: ProviderService) -> Self {
        let client = Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: SERPER_API_BASE.to_string(),
            api_key: api_key.into(),
            service,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn search_once(&self, query: &str, num: usize) -> Result<Vec<SearchHit>> {
        let provider = Provider::Serper;
        let resp = self
            .client
            .post(format!("{}/search", self.api_base))
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": num }))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, &e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(provider, status.as_u16(), &body).into());
        }
        let parsed: SerperResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, &e))?;
        Ok(parsed.organic.into_iter().take(num).collect())
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn search(&self, query: &str, num: usize) -> Result<Vec<SearchHit>> {
        self.service
            .call(Provider::Serper, |_| self.search_once(query, num))
            .await
    }
}

/// Restrict a query to one site.
pub fn site_query(query: &str, domain: &str) -> String {
    format!("{} site:{domain}", query.trim())
}

/// Numbered plain-text listing for prompts.
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "None".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(idx, hit)| {
            format!(
                "{}. {}\n   {}\n   {}",
                idx + 1,
                hit.title.trim(),
                hit.snippet.trim(),
                hit.link.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop repeated links, keeping first occurrences.
pub fn dedupe_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .filter(|hit| hit.link.is_empty() || seen.insert(hit.link.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_search_reports_missing_key() {
        let err = DisabledSearch.search("bike repair", 5).await.unwrap_err();
        assert!(err.to_string().contains("SERPER_API_KEY"));
    }

    #[test]
    fn serper_payload_parses_with_missing_fields() {
        let parsed: SerperResponse = serde_json::from_value(json!({
            "organic": [{ "title": "A", "link": "https://a" }, { "snippet": "s" }],
            "searchParameters": {}
        }))
        .unwrap();
        assert_eq!(parsed.organic.len(), 2);
        assert_eq!(parsed.organic[0].snippet, "");
    }

    #[test]
    fn formatting_and_dedupe() {
        let hits = vec![
            SearchHit {
                title: "A".into(),
                snippet: "first".into(),
                link: "https://a".into(),
            },
            SearchHit {
                title: "A again".into(),
                snippet: "dup".into(),
                link: "https://a".into(),
            },
        ];
        let hits = dedupe_hits(hits);
        assert_eq!(hits.len(), 1);
        assert_eq!(format_hits(&hits), "1. A\n   first\n   https://a");
        assert_eq!(format_hits(&[]), "None");
        assert_eq!(site_query(" pain ", "reddit.com"), "pain site:reddit.com");
    }
}
