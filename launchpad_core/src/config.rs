//! Process configuration, read once from the environment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use launchpad_graph::provider::Provider;
use launchpad_graph::ratelimit::GateConfig;
use launchpad_graph::retry::RetryPolicy;

use crate::agents::{ModelSpec, Role};
use crate::{Error, Result};

pub const DEFAULT_PPT_MAX_ITERATIONS: u32 = 3;
pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub primary: Provider,
    /// Tried in order when the primary stays over quota.
    pub fallbacks: Vec<Provider>,
    pub api_keys: HashMap<Provider, String>,
    /// Per-role model overrides; roles not listed use the provider default.
    pub role_models: HashMap<Role, ModelSpec>,
}

impl LlmSettings {
    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        self.api_keys.get(&provider).map(String::as_str)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchSettings {
    pub serper_api_key: Option<String>,
    pub serpapi_api_key: Option<String>,
    pub wiki_lang: String,
    pub trends_geo: Option<String>,
    /// Screenshot service URL template with a `{url}` placeholder.
    pub screenshot_endpoint: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageProviderKind {
    None,
    OpenAi,
}

#[derive(Clone, Debug)]
pub struct ImageSettings {
    pub provider: ImageProviderKind,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub images: ImageSettings,
    pub gates: HashMap<Provider, GateConfig>,
    pub retry: RetryPolicy,
    pub ppt_max_iterations: u32,
    pub output_dir: PathBuf,
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut api_keys = HashMap::new();
        for (provider, var) in [
            (Provider::Gemini, "GEMINI_API_KEY"),
            (Provider::Groq, "GROQ_API_KEY"),
            (Provider::OpenAi, "OPENAI_API_KEY"),
        ] {
            if let Some(key) = get(var).or_else(|| {
                (provider == Provider::Gemini)
                    .then(|| get("GOOGLE_API_KEY"))
                    .flatten()
            }) {
                api_keys.insert(provider, key);
            }
        }

        let primary = match get("LAUNCHPAD_LLM_PROVIDER") {
            Some(v) => parse_llm_provider("LAUNCHPAD_LLM_PROVIDER", &v)?,
            None => [Provider::Gemini, Provider::Groq, Provider::OpenAi]
                .into_iter()
                .find(|p| api_keys.contains_key(p))
                .unwrap_or(Provider::Gemini),
        };

        let mut fallbacks = Vec::new();
        if let Some(v) = get("LAUNCHPAD_FALLBACK_PROVIDERS") {
            for part in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let provider = parse_llm_provider("LAUNCHPAD_FALLBACK_PROVIDERS", part)?;
                if provider != primary && !fallbacks.contains(&provider) {
                    fallbacks.push(provider);
                }
            }
        }

        let mut role_models = HashMap::new();
        for role in Role::ALL {
            let var = format!("LAUNCHPAD_MODEL_{}", role.env_suffix());
            if let Some(v) = get(&var) {
                let spec = ModelSpec::parse(&v, primary, role.default_temperature())
                    .map_err(|e| Error::Config(format!("{var}: {e}")))?;
                role_models.insert(role, spec);
            }
        }

        let mut gates = HashMap::new();
        for provider in Provider::ALL {
            let mut gate = GateConfig::for_provider(provider);
            let interval_var = format!("LAUNCHPAD_MIN_INTERVAL_{}_SECS", provider.env_suffix());
            if let Some(v) = get(&interval_var) {
                let secs = f64::from_str(v.trim())
                    .ok()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .ok_or_else(|| Error::Config(format!("invalid {interval_var}: {v}")))?;
                gate.min_interval = Duration::from_secs_f64(secs);
            }
            let concurrency_var = format!("LAUNCHPAD_MAX_CONCURRENT_{}", provider.env_suffix());
            if let Some(v) = get(&concurrency_var) {
                gate.max_concurrent = parse_number(&concurrency_var, &v)?;
            }
            gates.insert(provider, gate);
        }

        let mut retry = RetryPolicy::default();
        if let Some(v) = get("LAUNCHPAD_MAX_RETRIES") {
            retry.max_retries = parse_number("LAUNCHPAD_MAX_RETRIES", &v)?;
        }

        let images = ImageSettings {
            provider: match get("LAUNCHPAD_IMAGE_PROVIDER").as_deref().map(str::trim) {
                None | Some("none") => ImageProviderKind::None,
                Some("openai") => ImageProviderKind::OpenAi,
                Some(other) => {
                    return Err(Error::Config(format!(
                        "invalid LAUNCHPAD_IMAGE_PROVIDER: {other} (expected none|openai)"
                    )))
                }
            },
            api_key: get("LAUNCHPAD_IMAGE_API_KEY").or_else(|| get("OPENAI_API_KEY")),
        };

        let ppt_max_iterations = match get("PPT_MAX_ITERATIONS") {
            Some(v) => parse_number("PPT_MAX_ITERATIONS", &v)?,
            None => DEFAULT_PPT_MAX_ITERATIONS,
        };

        Ok(Self {
            llm: LlmSettings {
                primary,
                fallbacks,
                api_keys,
                role_models,
            },
            search: SearchSettings {
                serper_api_key: get("SERPER_API_KEY"),
                serpapi_api_key: get("SERPAPI_API_KEY"),
                wiki_lang: get("LAUNCHPAD_WIKI_LANG").unwrap_or_else(|| "en".to_string()),
                trends_geo: get("LAUNCHPAD_TRENDS_GEO"),
                screenshot_endpoint: get("LAUNCHPAD_SCREENSHOT_ENDPOINT"),
            },
            images,
            gates,
            retry,
            ppt_max_iterations,
            output_dir: get("LAUNCHPAD_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key(self.llm.primary).is_none() {
            return Err(Error::Config(format!(
                "no API key for primary LLM provider {}; set {}_API_KEY",
                self.llm.primary,
                self.llm.primary.env_suffix()
            )));
        }
        for provider in &self.llm.fallbacks {
            if self.llm.api_key(*provider).is_none() {
                return Err(Error::Config(format!(
                    "fallback provider {provider} has no API key; set {}_API_KEY",
                    provider.env_suffix()
                )));
            }
        }
        if self.images.provider == ImageProviderKind::OpenAi && self.images.api_key.is_none() {
            return Err(Error::Config(
                "LAUNCHPAD_IMAGE_PROVIDER=openai requires LAUNCHPAD_IMAGE_API_KEY".to_string(),
            ));
        }
        if let Some(endpoint) = &self.search.screenshot_endpoint {
            if !endpoint.contains("{url}") {
                return Err(Error::Config(
                    "LAUNCHPAD_SCREENSHOT_ENDPOINT must contain a {url} placeholder".to_string(),
                ));
            }
        }
        if self.ppt_max_iterations == 0 {
            return Err(Error::Config("PPT_MAX_ITERATIONS must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parse_llm_provider(var: &str, value: &str) -> Result<Provider> {
    let provider = Provider::from_str(value).map_err(|e| Error::Config(format!("{var}: {e}")))?;
    if !provider.is_llm() {
        return Err(Error::Config(format!(
            "{var}: {provider} is not a language-model provider"
        )));
    }
    Ok(provider)
}

fn parse_number<T: FromStr>(var: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid {var}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<PlatformConfig> {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        PlatformConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_pick_first_keyed_provider() {
        let cfg = config(&[("GROQ_API_KEY", "gk")]).unwrap();
        assert_eq!(cfg.llm.primary, Provider::Groq);
        assert_eq!(cfg.ppt_max_iterations, 3);
        assert_eq!(cfg.output_dir, PathBuf::from("outputs"));
        assert_eq!(cfg.search.wiki_lang, "en");
        assert_eq!(cfg.gates[&Provider::Gemini].min_interval, Duration::from_secs(4));
        cfg.validate().unwrap();
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("GEMINI_API_KEY", "g"),
            ("GROQ_API_KEY", "q"),
            ("LAUNCHPAD_FALLBACK_PROVIDERS", "groq, gemini"),
            ("LAUNCHPAD_MIN_INTERVAL_GEMINI_SECS", "7"),
            ("LAUNCHPAD_MAX_CONCURRENT_SERPER", "2"),
            ("LAUNCHPAD_MODEL_SCORER", "groq:llama-3.3-70b-versatile"),
            ("PPT_MAX_ITERATIONS", "5"),
        ])
        .unwrap();
        assert_eq!(cfg.llm.primary, Provider::Gemini);
        assert_eq!(cfg.llm.fallbacks, vec![Provider::Groq]);
        assert_eq!(cfg.gates[&Provider::Gemini].min_interval, Duration::from_secs(7));
        assert_eq!(cfg.gates[&Provider::Serper].max_concurrent, 2);
        assert_eq!(cfg.llm.role_models[&Role::Scorer].provider, Provider::Groq);
        assert_eq!(cfg.ppt_max_iterations, 5);
    }

    #[test]
    fn validation_reports_missing_keys() {
        let err = config(&[]).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = config(&[("LAUNCHPAD_LLM_PROVIDER", "serper")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = config(&[("GEMINI_API_KEY", "g"), ("LAUNCHPAD_IMAGE_PROVIDER", "openai")])
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("LAUNCHPAD_IMAGE_API_KEY"));

        let err = config(&[("GEMINI_API_KEY", "g"), ("LAUNCHPAD_SCREENSHOT_ENDPOINT", "https://shots.test")])
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("{url}"));
    }
}
