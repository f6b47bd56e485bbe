use std::error::Error as StdError;

use launchpad_graph::{GraphError, ProviderError, ProviderErrorKind};

/// Common error type for `launchpad_core`.
///
/// Provider failures keep their classification so the REST adapter can map
/// quota and credential problems to the right status code.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Graph(GraphError),

    #[error("backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    #[tracing::instrument(level = "debug", name = "launchpad.error.backend", skip(source))]
    pub fn backend(
        context: impl Into<String> + std::fmt::Debug,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Convenience: wrap any error into `Backend` with "reqwest" context.
    pub fn backend_reqwest(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Backend {
            context: "reqwest".into(),
            source: Box::new(source),
        }
    }
}

impl From<GraphError> for Error {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Provider(provider) => provider.into(),
            GraphError::BadRequest(message) => Self::InvalidInput(message),
            other => Self::Graph(other),
        }
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ProviderErrorKind::AuthInvalid => Self::Unauthorized(err.user_message()),
            ProviderErrorKind::QuotaExceeded => Self::QuotaExceeded(err.user_message()),
            _ => Self::Graph(GraphError::Provider(err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::backend("serde_json", err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
