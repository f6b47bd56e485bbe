//! Role-based access to language models.
//!
//! Nodes ask for a [`Role`] rather than a model; the role resolves to a
//! provider/model pair from configuration and every call goes through the
//! shared rate-limit and retry service.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use launchpad_graph::error::{GraphError, ProviderError, ProviderErrorKind, Result};
use launchpad_graph::json_repair::parse_structured;
use launchpad_graph::llm::{image_message, LlmClientApi, LlmEndpoint, LlmRequest};
use launchpad_graph::provider::Provider;
use launchpad_graph::retry::ProviderService;

use crate::config::LlmSettings;
use crate::prompts::{self, Prompt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Checker,
    Scorer,
    Vision,
    Writer,
    Researcher,
    Analyst,
    Designer,
    Critic,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::Planner,
        Role::Checker,
        Role::Scorer,
        Role::Vision,
        Role::Writer,
        Role::Researcher,
        Role::Analyst,
        Role::Designer,
        Role::Critic,
    ];

    pub fn env_suffix(self) -> &'static str {
        match self {
            Role::Planner => "PLANNER",
            Role::Checker => "CHECKER",
            Role::Scorer => "SCORER",
            Role::Vision => "VISION",
            Role::Writer => "WRITER",
            Role::Researcher => "RESEARCHER",
            Role::Analyst => "ANALYST",
            Role::Designer => "DESIGNER",
            Role::Critic => "CRITIC",
        }
    }

    pub fn default_temperature(self) -> f64 {
        match self {
            Role::Writer => 0.2,
            Role::Analyst => 0.1,
            Role::Designer => 0.7,
            _ => 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: Provider,
    pub model: String,
    pub temperature: f64,
}

impl ModelSpec {
    /// Parse `provider:model` or a bare `model` on `default_provider`.
    pub fn parse(value: &str, default_provider: Provider, temperature: f64) -> std::result::Result<Self, String> {
        let value = value.trim();
        let (provider, model) = match value.split_once(':') {
            Some((provider, model)) => (Provider::from_str(provider)?, model.trim()),
            None => (default_provider, value),
        };
        if !provider.is_llm() {
            return Err(format!("{provider} is not a language-model provider"));
        }
        if model.is_empty() {
            return Err("model name is empty".to_string());
        }
        Ok(Self {
            provider,
            model: model.to_string(),
            temperature,
        })
    }
}

pub fn default_model(provider: Provider, role: Role) -> &'static str {
    match (provider, role) {
        (Provider::Groq, Role::Vision) => "meta-llama/llama-4-scout-17b-16e-instruct",
        (Provider::Groq, _) => "llama-3.3-70b-versatile",
        (Provider::OpenAi, _) => "gpt-4o-mini",
        _ => "gemini-2.0-flash",
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CallOptions {
    pub json: bool,
    /// Re-issue on the configured fallback providers when the primary stays
    /// over quota.
    pub fallback: bool,
    pub temperature: Option<f64>,
}

impl CallOptions {
    pub fn text() -> Self {
        Self::default()
    }

    pub fn json() -> Self {
        Self {
            json: true,
            ..Self::default()
        }
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

pub struct Agents {
    llm: Arc<dyn LlmClientApi>,
    service: ProviderService,
    settings: LlmSettings,
}

impl Agents {
    pub fn new(llm: Arc<dyn LlmClientApi>, service: ProviderService, settings: LlmSettings) -> Self {
        Self {
            llm,
            service,
            settings,
        }
    }

    pub fn service(&self) -> &ProviderService {
        &self.service
    }

    pub fn model_for(&self, role: Role, provider: Provider) -> ModelSpec {
        match self.settings.role_models.get(&role) {
            Some(spec) if spec.provider == provider => spec.clone(),
            _ => ModelSpec {
                provider,
                model: default_model(provider, role).to_string(),
                temperature: role.default_temperature(),
            },
        }
    }

    fn primary_for(&self, role: Role) -> Provider {
        self.settings
            .role_models
            .get(&role)
            .map(|spec| spec.provider)
            .unwrap_or(self.settings.primary)
    }

    #[tracing::instrument(level = "debug", skip(self, messages))]
    pub async fn complete(&self, role: Role, messages: Vec<Value>, options: CallOptions) -> Result<String> {
        let primary = self.primary_for(role);
        let mut chain = vec![primary];
        if options.fallback {
            chain.extend(self.settings.fallbacks.iter().filter(|p| **p != primary));
        }
        let messages = &messages;
        self.service
            .call_with_fallback(&chain, |provider| {
                let spec = self.model_for(role, provider);
                let api_key = self.settings.api_key(provider).map(str::to_string);
                async move {
                    let api_key = api_key.ok_or_else(|| {
                        GraphError::from(ProviderError::new(
                            provider,
                            ProviderErrorKind::AuthInvalid,
                            format!("no API key configured; set {}_API_KEY", provider.env_suffix()),
                        ))
                    })?;
                    let endpoint = LlmEndpoint::for_provider(provider, api_key)?;
                    let mut request = LlmRequest::new(endpoint, spec.model.clone(), messages.clone())
                        .temperature(options.temperature.unwrap_or(spec.temperature));
                    if options.json {
                        request = request.json_object();
                    }
                    let response = self.llm.send(&request).await?;
                    tracing::debug!(
                        provider = %provider,
                        model = %spec.model,
                        total_tokens = response.usage.total_tokens,
                        "llm call finished"
                    );
                    Ok(response.text)
                }
            })
            .await
    }

    pub async fn run_prompt(&self, role: Role, prompt: Prompt, inputs: &Value, options: CallOptions) -> Result<String> {
        let messages = prompts::render(prompt, inputs)?;
        self.complete(role, messages, options).await
    }

    /// Structured output: JSON mode, then repair, then deserialize into `T`.
    pub async fn run_structured<T: DeserializeOwned>(
        &self,
        role: Role,
        prompt: Prompt,
        inputs: &Value,
        options: CallOptions,
    ) -> Result<T> {
        let messages = prompts::render(prompt, inputs)?;
        let options = CallOptions { json: true, ..options };
        let text = self.complete(role, messages, options).await?;
        parse_structured(&text)
    }

    /// Prompt a vision model with one image attached to the user turn.
    pub async fn describe_image(
        &self,
        prompt: Prompt,
        inputs: &Value,
        image_base64: &str,
        mime: &str,
    ) -> Result<String> {
        let mut messages = prompts::render(prompt, inputs)?;
        if let Some(last) = messages.pop() {
            let text = last
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            messages.push(image_message(text, image_base64, mime));
        }
        self.complete(Role::Vision, messages, CallOptions::text()).await
    }
}
