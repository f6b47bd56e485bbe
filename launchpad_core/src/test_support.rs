//! Scripted collaborators shared by unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use launchpad_graph::error::{GraphError, ProviderError, ProviderErrorKind, Result};
use launchpad_graph::llm::{LlmClientApi, LlmRequest, LlmResponse, UsageSummary};
use launchpad_graph::provider::Provider;
use launchpad_graph::ratelimit::{GateConfig, RateLimiter};
use launchpad_graph::retry::{ProviderService, RetryPolicy};

use crate::agents::Agents;
use crate::config::LlmSettings;
use crate::services::Services;
use crate::tools::images::ImageGenerator;
use crate::tools::screenshot::{Screenshot, ScreenshotProvider};
use crate::tools::search::{SearchHit, WebSearch};
use crate::tools::tech_stack::PageFetcher;
use crate::tools::trends::{TrendSeries, TrendSource};

#[derive(Clone, Debug)]
enum Reply {
    Text(String),
    Fail(ProviderErrorKind),
}

#[derive(Debug)]
struct Rule {
    needle: String,
    provider: Option<Provider>,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
struct ScriptedInner {
    rules: Vec<Rule>,
    requests: Vec<LlmRequest>,
}

/// Fake model: the first rule whose needle appears in the request text
/// answers. A rule's replies are consumed in order; the last one repeats.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    inner: Arc<Mutex<ScriptedInner>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, needle: &str, provider: Option<Provider>, replies: Vec<Reply>) -> Self {
        self.inner.lock().unwrap().rules.push(Rule {
            needle: needle.to_string(),
            provider,
            replies: replies.into(),
        });
        self
    }

    pub fn reply(self, needle: &str, text: &str) -> Self {
        self.push(needle, None, vec![Reply::Text(text.to_string())])
    }

    pub fn reply_seq(self, needle: &str, texts: &[&str]) -> Self {
        let replies = texts.iter().map(|t| Reply::Text(t.to_string())).collect();
        self.push(needle, None, replies)
    }

    pub fn fail(self, needle: &str, kind: ProviderErrorKind) -> Self {
        self.push(needle, None, vec![Reply::Fail(kind)])
    }

    pub fn fail_provider(self, provider: Provider, kind: ProviderErrorKind) -> Self {
        self.push("", Some(provider), vec![Reply::Fail(kind)])
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| request_text(r).contains(needle))
            .count()
    }
}

pub fn request_text(request: &LlmRequest) -> String {
    let mut text = String::new();
    for message in &request.messages {
        match message.get("content") {
            Some(Value::String(content)) => text.push_str(content),
            Some(Value::Array(parts)) => {
                for part in parts {
                    if let Some(t) = part.get("text").and_then(Value::as_str) {
                        text.push_str(t);
                    }
                }
            }
            _ => {}
        }
        text.push('\n');
    }
    text
}

#[async_trait]
impl LlmClientApi for ScriptedLlm {
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let provider = request.endpoint.provider;
        let text = request_text(request);
        let reply = {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push(request.clone());
            inner
                .rules
                .iter_mut()
                .find(|rule| {
                    text.contains(&rule.needle) && rule.provider.map_or(true, |p| p == provider)
                })
                .and_then(|rule| {
                    if rule.replies.len() > 1 {
                        rule.replies.pop_front()
                    } else {
                        rule.replies.front().cloned()
                    }
                })
        };
        match reply {
            Some(Reply::Text(text)) => Ok(LlmResponse {
                text,
                usage: UsageSummary::default(),
                raw: None,
            }),
            Some(Reply::Fail(kind)) => {
                Err(ProviderError::new(provider, kind, "scripted failure").into())
            }
            None => Err(GraphError::internal(format!(
                "no scripted reply for: {}",
                text.chars().take(200).collect::<String>()
            ))),
        }
    }
}

pub fn test_service() -> ProviderService {
    let gates = Provider::ALL
        .iter()
        .map(|p| {
            (
                *p,
                GateConfig {
                    min_interval: Duration::ZERO,
                    max_concurrent: 4,
                },
            )
        })
        .collect::<HashMap<_, _>>();
    ProviderService::new(
        Arc::new(RateLimiter::new(gates)),
        RetryPolicy {
            max_retries: 1,
            base_delay_ms: 10,
            overload_base_delay_ms: 5,
            max_backoff_ms: 100,
            jitter_ms: 0,
        },
    )
}

/// Agents on Gemini with Groq as the quota fallback.
pub fn agents_with(llm: ScriptedLlm) -> Agents {
    let api_keys = [Provider::Gemini, Provider::Groq, Provider::OpenAi]
        .into_iter()
        .map(|p| (p, format!("{p}-key")))
        .collect();
    Agents::new(
        Arc::new(llm),
        test_service(),
        LlmSettings {
            primary: Provider::Gemini,
            fallbacks: vec![Provider::Groq],
            api_keys,
            role_models: HashMap::new(),
        },
    )
}

/// Search fake: hits keyed by a substring of the query, in insertion order.
#[derive(Clone, Default)]
pub struct FakeSearch {
    results: Arc<Mutex<Vec<(String, Vec<SearchHit>)>>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, needle: &str, hits: Vec<SearchHit>) -> Self {
        self.results.lock().unwrap().push((needle.to_string(), hits));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

pub fn hit(title: &str, snippet: &str, link: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        snippet: snippet.to_string(),
        link: link.to_string(),
    }
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, query: &str, _num: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        let results = self.results.lock().unwrap();
        Ok(results
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, hits)| hits.clone())
            .unwrap_or_default())
    }
}

pub struct FixedTrend(pub Vec<f64>);

#[async_trait]
impl TrendSource for FixedTrend {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn daily_series(&self, topic: &str) -> Result<TrendSeries> {
        Ok(TrendSeries::from_values(topic, self.name(), &self.0))
    }
}

pub struct FakePage(pub String);

#[async_trait]
impl PageFetcher for FakePage {
    async fn fetch(&self, _url: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub struct FakeScreenshot;

#[async_trait]
impl ScreenshotProvider for FakeScreenshot {
    async fn capture(&self, _url: &str) -> Result<Screenshot> {
        Ok(Screenshot {
            base64: "aW1hZ2U=".to_string(),
            mime: "image/png".to_string(),
        })
    }
}

/// Writes a tiny placeholder file for every prompt.
pub struct FakeImages;

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, _prompt: &str, path: &Path) -> Result<PathBuf> {
        tokio::fs::write(path, b"png")
            .await
            .map_err(|e| GraphError::internal(e.to_string()))?;
        Ok(path.to_path_buf())
    }
}

/// Services wired to fakes, writing under `output_dir`.
pub fn services_with(llm: ScriptedLlm, output_dir: &Path) -> Services {
    Services::builder(Arc::new(agents_with(llm)), output_dir)
        .search(Arc::new(FakeSearch::new()))
        .build()
}
