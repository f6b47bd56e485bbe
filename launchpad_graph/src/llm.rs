use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{GraphError, ProviderError, Result};
use crate::provider::Provider;

pub const LLM_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Debug)]
pub struct LlmEndpoint {
    pub api_base: String,
    pub api_key: String,
    pub provider: Provider,
}

impl LlmEndpoint {
    /// Endpoint on the provider's OpenAI-compatible base URL.
    pub fn for_provider(provider: Provider, api_key: impl Into<String>) -> Result<Self> {
        let api_base = provider.default_api_base().ok_or_else(|| {
            GraphError::bad_request(format!("{provider} is not a language-model provider"))
        })?;
        Ok(Self {
            api_base: api_base.to_string(),
            api_key: api_key.into(),
            provider,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = normalize_api_base(&api_base.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub temperature: f64,
    pub max_tokens: Option<i64>,
    pub response_format: Option<Value>,
    pub endpoint: LlmEndpoint,
}

impl LlmRequest {
    pub fn new(endpoint: LlmEndpoint, model: impl Into<String>, messages: Vec<Value>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.0,
            max_tokens: None,
            response_format: None,
            endpoint,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Ask the provider for a JSON object response.
    pub fn json_object(mut self) -> Self {
        self.response_format = Some(json!({ "type": "json_object" }));
        self
    }
}

/// Chat message with plain text content.
pub fn message(role: &str, content: impl Into<String>) -> Value {
    json!({ "role": role, "content": content.into() })
}

/// User message carrying text plus one inline image (vision models).
pub fn image_message(text: impl Into<String>, image_base64: &str, mime: &str) -> Value {
    json!({
        "role": "user",
        "content": [
            { "type": "text", "text": text.into() },
            {
                "type": "image_url",
                "image_url": { "url": format!("data:{mime};base64,{image_base64}") }
            }
        ]
    })
}

#[derive(Clone, Debug, Default)]
pub struct UsageSummary {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub text: String,
    pub usage: UsageSummary,
    pub raw: Option<Value>,
}

#[async_trait]
pub trait LlmClientApi: Send + Sync {
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse>;
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(LLM_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        LlmClient { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        LlmClient { client }
    }

    async fn send_chat(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let provider = request.endpoint.provider;
        let url = format!(
            "{}/chat/completions",
            request.endpoint.api_base.trim_end_matches('/')
        );
        let mut payload = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });
        if let Some(obj) = payload.as_object_mut() {
            if let Some(limit) = request.max_tokens {
                let key = if provider == Provider::Groq {
                    "max_completion_tokens"
                } else {
                    "max_tokens"
                };
                obj.insert(key.to_string(), Value::from(limit));
            }
            if let Some(format) = &request.response_format {
                obj.insert("response_format".to_string(), format.clone());
            }
        }

        let response = self
            .client
            .post(url)
            .bearer_auth(&request.endpoint.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::from_reqwest(provider, &err))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(ProviderError::from_status(provider, status, &body).into());
        }
        let value: Value = response
            .json()
            .await
            .map_err(|err| ProviderError::from_reqwest(provider, &err))?;
        let text = extract_chat_message(&value).unwrap_or_default();
        let usage = extract_usage(&value).unwrap_or_default();
        Ok(LlmResponse {
            text,
            usage,
            raw: Some(value),
        })
    }
}

fn normalize_api_base(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    trimmed.trim_end_matches("/chat/completions").to_string()
}

fn extract_chat_message(value: &Value) -> Option<String> {
    let choices = value.get("choices")?.as_array()?;
    let first = choices.first()?;
    let message = first.get("message")?;
    message.get("content")?.as_str().map(|v| v.to_string())
}

fn extract_usage(value: &Value) -> Option<UsageSummary> {
    let usage = value.get("usage")?;
    let prompt_tokens = usage.get("prompt_tokens").and_then(|v| v.as_i64());
    let completion_tokens = usage.get("completion_tokens").and_then(|v| v.as_i64());
    let total_tokens = usage.get("total_tokens").and_then(|v| v.as_i64()).or_else(|| {
        match (prompt_tokens, completion_tokens) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            _ => None,
        }
    });
    Some(UsageSummary {
        prompt_tokens,
        completion_tokens,
        total_tokens,
    })
}

#[async_trait]
impl LlmClientApi for LlmClient {
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.send_chat(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_message_and_derives_total_tokens() {
        let raw = json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"score\": 4}" } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 5 }
        });
        assert_eq!(extract_chat_message(&raw).as_deref(), Some("{\"score\": 4}"));
        let usage = extract_usage(&raw).unwrap();
        assert_eq!(usage.total_tokens, Some(17));
    }

    #[test]
    fn endpoint_requires_llm_provider() {
        assert!(LlmEndpoint::for_provider(Provider::Serper, "k").is_err());
        let endpoint = LlmEndpoint::for_provider(Provider::Groq, "k")
            .unwrap()
            .with_api_base("http://localhost:8080/v1/chat/completions/");
        assert_eq!(endpoint.api_base, "http://localhost:8080/v1");
    }
}
