//! Website screenshots for visual analysis.
//!
//! Capture is delegated to an HTTP screenshot service configured with an
//! endpoint template such as `https://shots.example.com/png?url={url}`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use std::time::Duration;

use launchpad_graph::error::{GraphError, Result};

pub const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Screenshot {
    pub base64: String,
    pub mime: String,
}

#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn capture(&self, url: &str) -> Result<Screenshot>;
}

pub struct NoScreenshot;

#[async_trait]
impl ScreenshotProvider for NoScreenshot {
    async fn capture(&self, _url: &str) -> Result<Screenshot> {
        Err(GraphError::unavailable(
            "screenshot capture not configured; set LAUNCHPAD_SCREENSHOT_ENDPOINT",
        ))
    }
}

#[derive(Clone)]
pub struct HttpScreenshot {
    client: Client,
    endpoint_template: String,
}

impl HttpScreenshot {
    pub fn new(endpoint_template: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(SCREENSHOT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint_template: endpoint_template.into(),
        }
    }

    fn endpoint(&self, url: &str) -> String {
        self.endpoint_template.replace("{url}", url)
    }
}

#[async_trait]
impl ScreenshotProvider for HttpScreenshot {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn capture(&self, url: &str) -> Result<Screenshot> {
        let resp = self
            .client
            .get(self.endpoint(url))
            .send()
            .await
            .map_err(|e| GraphError::unavailable(format!("screenshot of {url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GraphError::unavailable(format!(
                "screenshot of {url}: HTTP {status}"
            )));
        }
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/png")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GraphError::unavailable(format!("screenshot of {url}: {e}")))?;
        if bytes.is_empty() {
            return Err(GraphError::unavailable(format!("empty screenshot of {url}")));
        }
        Ok(Screenshot {
            base64: STANDARD.encode(&bytes),
            mime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_template_is_filled() {
        let shots = HttpScreenshot::new("https://shots.test/png?url={url}&w=1280");
        assert_eq!(
            shots.endpoint("https://acme.io"),
            "https://shots.test/png?url=https://acme.io&w=1280"
        );
    }

    #[tokio::test]
    async fn unconfigured_capture_fails() {
        assert!(NoScreenshot.capture("https://acme.io").await.is_err());
    }
}
