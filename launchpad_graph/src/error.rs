use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::definition::Diagnostic;
use crate::provider::Provider;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid graph")]
    InvalidGraph { diagnostics: Vec<Diagnostic> },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("run cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),
}

impl GraphError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn invalid_graph(diagnostics: Vec<Diagnostic>) -> Self {
        Self::InvalidGraph { diagnostics }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// The provider failure kind, when this error came from an outbound call.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider(err) => Some(err.kind),
            _ => None,
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.provider_kind() == Some(ProviderErrorKind::QuotaExceeded)
    }
}

/// Classification of a failed provider call. Drives the retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    QuotaExceeded,
    Overloaded,
    AuthInvalid,
    BadRequest,
    Transient,
}

impl ProviderErrorKind {
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded | Self::Overloaded | Self::Transient
        )
    }

    /// Classify an HTTP failure from its status code and response body.
    ///
    /// Some providers answer quota exhaustion with 400/403 and a textual marker,
    /// so the body is inspected before falling back to the status code.
    pub fn classify(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        if status == 429
            || lower.contains("resource_exhausted")
            || lower.contains("quota")
            || lower.contains("rate limit")
        {
            return Self::QuotaExceeded;
        }
        if status == 401
            || status == 403
            || lower.contains("api key not valid")
            || lower.contains("invalid api key")
            || lower.contains("suspended")
        {
            return Self::AuthInvalid;
        }
        if lower.contains("overloaded") || matches!(status, 500 | 502 | 503 | 504 | 529) {
            return Self::Overloaded;
        }
        if (400..500).contains(&status) {
            return Self::BadRequest;
        }
        Self::Transient
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::QuotaExceeded => "quota exceeded",
            Self::Overloaded => "overloaded",
            Self::AuthInvalid => "authentication failed",
            Self::BadRequest => "bad request",
            Self::Transient => "transient failure",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    pub provider: Provider,
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: Provider, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(provider: Provider, status: u16, body: &str) -> Self {
        let message = body.trim().chars().take(500).collect::<String>();
        Self {
            provider,
            kind: ProviderErrorKind::classify(status, body),
            status: Some(status),
            message,
        }
    }

    /// Map a reqwest transport error (connect, timeout, body read).
    pub fn from_reqwest(provider: Provider, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(provider, status.as_u16(), &err.to_string());
        }
        Self::new(provider, ProviderErrorKind::Transient, err.to_string())
    }

    /// Message suitable for returning to an end user.
    pub fn user_message(&self) -> String {
        match self.kind {
            ProviderErrorKind::AuthInvalid => format!(
                "{} rejected the configured credentials. Check that the API key is set, valid and the account is active.",
                self.provider
            ),
            ProviderErrorKind::QuotaExceeded => format!(
                "{} quota exhausted. Wait a minute and retry, or configure a fallback provider.",
                self.provider
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_body_markers_before_status() {
        assert_eq!(
            ProviderErrorKind::classify(400, "{\"status\":\"RESOURCE_EXHAUSTED\"}"),
            ProviderErrorKind::QuotaExceeded
        );
        assert_eq!(
            ProviderErrorKind::classify(400, "API key not valid. Please pass a valid API key."),
            ProviderErrorKind::AuthInvalid
        );
        assert_eq!(
            ProviderErrorKind::classify(503, "The model is overloaded"),
            ProviderErrorKind::Overloaded
        );
        assert_eq!(
            ProviderErrorKind::classify(422, "unprocessable"),
            ProviderErrorKind::BadRequest
        );
    }

    #[test]
    fn only_quota_overload_and_transient_retry() {
        assert!(ProviderErrorKind::QuotaExceeded.is_retriable());
        assert!(ProviderErrorKind::Overloaded.is_retriable());
        assert!(ProviderErrorKind::Transient.is_retriable());
        assert!(!ProviderErrorKind::AuthInvalid.is_retriable());
        assert!(!ProviderErrorKind::BadRequest.is_retriable());
    }
}
