use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// An external service whose calls pass through the rate-limit gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gemini,
    Groq,
    OpenAi,
    Serper,
    SerpApi,
    Wikipedia,
    Images,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::Gemini,
        Provider::Groq,
        Provider::OpenAi,
        Provider::Serper,
        Provider::SerpApi,
        Provider::Wikipedia,
        Provider::Images,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Groq => "groq",
            Provider::OpenAi => "openai",
            Provider::Serper => "serper",
            Provider::SerpApi => "serpapi",
            Provider::Wikipedia => "wikipedia",
            Provider::Images => "images",
        }
    }

    pub fn is_llm(self) -> bool {
        matches!(self, Provider::Gemini | Provider::Groq | Provider::OpenAi)
    }

    /// OpenAI-compatible chat completions base URL for language-model providers.
    pub fn default_api_base(self) -> Option<&'static str> {
        match self {
            Provider::Gemini => Some("https://generativelanguage.googleapis.com/v1beta/openai"),
            Provider::Groq => Some("https://api.groq.com/openai/v1"),
            Provider::OpenAi => Some("https://api.openai.com/v1"),
            _ => None,
        }
    }

    /// Free-tier friendly spacing between consecutive calls.
    pub fn default_min_interval(self) -> Duration {
        match self {
            Provider::Gemini => Duration::from_secs(4),
            Provider::Groq => Duration::from_secs(2),
            Provider::OpenAi => Duration::from_secs(1),
            Provider::Serper | Provider::SerpApi => Duration::from_secs(1),
            Provider::Wikipedia => Duration::from_millis(200),
            Provider::Images => Duration::from_secs(7),
        }
    }

    pub fn env_suffix(self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "groq" => Ok(Provider::Groq),
            "openai" => Ok(Provider::OpenAi),
            "serper" => Ok(Provider::Serper),
            "serpapi" => Ok(Provider::SerpApi),
            "wikipedia" => Ok(Provider::Wikipedia),
            "images" => Ok(Provider::Images),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}
