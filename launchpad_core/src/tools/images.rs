//! Slide illustration generation.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

use launchpad_graph::error::{GraphError, ProviderError, Result};
use launchpad_graph::provider::Provider;
use launchpad_graph::retry::ProviderService;

pub const IMAGE_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image for `prompt` and write it to `path`.
    async fn generate(&self, prompt: &str, path: &Path) -> Result<PathBuf>;
}

pub struct NoImages;

#[async_trait]
impl ImageGenerator for NoImages {
    async fn generate(&self, _prompt: &str, _path: &Path) -> Result<PathBuf> {
        Err(GraphError::unavailable("image generation disabled"))
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiImages {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    service: ProviderService,
}

impl OpenAiImages {
    pub fn new(api_key: impl Into<String>, service: ProviderService) -> Self {
        let client = Client::builder()
            .timeout(IMAGE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: "dall-e-3".to_string(),
            service,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn request(&self, prompt: &str) -> Result<Vec<u8>> {
        let provider = Provider::Images;
        let resp = self
            .client
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "n": 1,
                "size": "1792x1024",
                "response_format": "b64_json",
            }))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, &e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(provider, status.as_u16(), &body).into());
        }
        let parsed: ImagesResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, &e))?;
        let encoded = parsed
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| GraphError::internal("image response carried no data"))?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| GraphError::internal(format!("image payload is not base64: {e}")))
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn generate(&self, prompt: &str, path: &Path) -> Result<PathBuf> {
        let bytes = self
            .service
            .call(Provider::Images, |_| self.request(prompt))
            .await?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| GraphError::internal(format!("write {}: {e}", path.display())))?;
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_generator_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = NoImages
            .generate("a bike shop", &dir.path().join("x.png"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn response_shape_parses() {
        let parsed: ImagesResponse =
            serde_json::from_value(json!({ "created": 1, "data": [{ "b64_json": "cG5n" }] })).unwrap();
        assert_eq!(parsed.data[0].b64_json.as_deref(), Some("cG5n"));
    }
}
