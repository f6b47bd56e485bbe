use crate::routes;
use axum::extract::DefaultBodyLimit;
use axum::{Extension, Router};
use launchpad_core::{PlatformConfig, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Uploads carry a logo and two JSON documents.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            started_at: Instant::now(),
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn from_config(config: &PlatformConfig) -> launchpad_core::Result<Self> {
        Ok(Self::new(Services::from_config(config)?))
    }
}

/// Read configuration from the environment, apply the CLI output directory
/// override and validate it.
#[tracing::instrument(level = "debug", skip_all)]
pub fn load_config(output_dir: Option<PathBuf>) -> launchpad_core::Result<PlatformConfig> {
    let mut config = PlatformConfig::from_env()?;
    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    config.validate()?;
    Ok(config)
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn router(state: AppState) -> Router {
    let request_id = axum::http::HeaderName::from_static("x-request-id");
    Router::new()
        .merge(routes::router())
        .layer(Extension(Arc::new(state)))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[tracing::instrument(level = "info", skip_all, fields(%addr))]
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    tracing::info!(
        output_dir = %state.services.output_dir.display(),
        "launchpad server listening"
    );
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> Router {
        let output_dir = dir.display().to_string();
        let config = PlatformConfig::from_lookup(move |key| match key {
            "GEMINI_API_KEY" => Some("test-key".to_string()),
            "LAUNCHPAD_OUTPUT_DIR" => Some(output_dir.clone()),
            _ => None,
        })
        .unwrap();
        config.validate().unwrap();
        router(AppState::from_config(&config).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_with_request_id() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_before_any_model_call() {
        let dir = tempfile::tempdir().unwrap();
        for (uri, body) in [
            ("/research", r#"{"idea": "   ", "problem": "x"}"#),
            ("/evaluate", "[1, 2]"),
            ("/recommend", r#"{"raw_input": "text", "evaluation_output": {}}"#),
            ("/ppt/generate", "{}"),
        ] {
            let response = app(dir.path()).oneshot(post_json(uri, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = body_json(response).await;
            assert!(body["error"].as_str().unwrap().contains("invalid input"), "{uri}: {body}");
        }
    }

    #[tokio::test]
    async fn upload_requires_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let form = "--XBOUNDARY\r\n\
                    Content-Disposition: form-data; name=\"use_default_colors\"\r\n\r\n\
                    true\r\n\
                    --XBOUNDARY--\r\n";
        let request = Request::builder()
            .method("POST")
            .uri("/ppt/generate/upload")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(form))
            .unwrap();
        let response = app(dir.path()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("startup_file"));
    }
}
