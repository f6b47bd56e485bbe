use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use launchpad_core::Error as CoreError;
use launchpad_graph::{GraphError, ProviderErrorKind};
use serde::Serialize;

/// Seconds a client should wait after a provider quota rejection.
pub const QUOTA_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        Self::Core(err.into())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => match err {
                CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                CoreError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
                CoreError::Graph(GraphError::Provider(p)) => match p.kind {
                    ProviderErrorKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
                    ProviderErrorKind::AuthInvalid => StatusCode::UNAUTHORIZED,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                },
                CoreError::Graph(GraphError::BadRequest(_)) => StatusCode::BAD_REQUEST,
                CoreError::Config(_)
                | CoreError::Graph(_)
                | CoreError::Backend { .. }
                | CoreError::BackendMessage(_)
                | CoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn hint(&self) -> Option<String> {
        match self.status_code() {
            StatusCode::TOO_MANY_REQUESTS => Some(format!(
                "retry after {QUOTA_RETRY_AFTER_SECS} seconds or configure LAUNCHPAD_FALLBACK_PROVIDERS"
            )),
            StatusCode::UNAUTHORIZED => {
                Some("check the provider API key variables (GEMINI_API_KEY, GROQ_API_KEY, OPENAI_API_KEY)".to_string())
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = code.as_u16(), "request rejected");
        }
        let body = ErrorBody {
            error: self.to_string(),
            hint: self.hint(),
        };
        let mut response = (code, Json(body)).into_response();
        if code == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(QUOTA_RETRY_AFTER_SECS));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_graph::{Provider, ProviderError};

    #[test]
    fn provider_failures_map_to_client_statuses() {
        let quota = ApiError::from(CoreError::from(ProviderError::new(
            Provider::Gemini,
            ProviderErrorKind::QuotaExceeded,
            "RESOURCE_EXHAUSTED",
        )));
        assert_eq!(quota.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let auth = ApiError::from(GraphError::Provider(ProviderError::new(
            Provider::Groq,
            ProviderErrorKind::AuthInvalid,
            "bad key",
        )));
        assert_eq!(auth.status_code(), StatusCode::UNAUTHORIZED);
        assert!(auth.hint().unwrap().contains("GROQ_API_KEY"));

        let transient = ApiError::from(GraphError::Provider(ProviderError::new(
            Provider::Groq,
            ProviderErrorKind::Transient,
            "reset",
        )));
        assert_eq!(transient.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn input_and_backend_errors() {
        assert_eq!(
            ApiError::from(CoreError::InvalidInput("idea".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(GraphError::BadRequest("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CoreError::BackendMessage("pdf".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(ApiError::from(CoreError::Config("x".into())).hint().is_none());
    }

    #[test]
    fn quota_responses_carry_retry_after() {
        let response = ApiError::from(CoreError::QuotaExceeded("gemini".into())).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }
}
