//! Generation provider seams.
//!
//! [`TextGenerator`] and [`ImageGenerator`] are what the synthesizers talk
//! to; the OpenAI-compatible implementations here are the production ones.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::{ImageConfig, TextConfig};
use crate::error::{Capability, FlashcastError, ProviderError};

/// Structured text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Label used in diagnostics, usually the model name.
    fn name(&self) -> &str;

    /// Sends one prompt and returns the raw response text.
    async fn generate(&self, prompt: &str, system: &str) -> Result<String, ProviderError>;
}

/// Parameters for one image generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRequest {
    /// Full prompt text.
    pub prompt: String,
    /// Requested size, `WIDTHxHEIGHT`.
    pub size: String,
    /// Model to generate with.
    pub model: String,
}

/// What an image provider handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Base64-encoded image bytes.
    Inline(String),
    /// A URL the bytes can be downloaded from.
    Remote(String),
}

/// Image generation.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates one image.
    async fn generate(&self, request: &ImageRequest) -> Result<ImagePayload, ProviderError>;

    /// Downloads the bytes behind a [`ImagePayload::Remote`] location.
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Returns the response if its status is a success, else a classified error.
async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(provider, status.as_u16(), body))
}

/// Host part of a URL, for logging without paths or query strings.
fn url_host(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid url>".to_string())
}

fn build_client(timeout_secs: u64, provider: &str) -> Result<reqwest::Client, FlashcastError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::from_transport(provider, &e).into())
}

/// Chat-completions client constrained to JSON output.
///
/// Requests are never retried; a slow call fails with a timeout instead.
#[derive(Debug, Clone)]
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiTextGenerator {
    /// Builds a generator from configuration.
    ///
    /// Fails with [`FlashcastError::CapabilityUnconfigured`] when no API key
    /// is set.
    pub fn from_config(config: &TextConfig) -> Result<Self, FlashcastError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(FlashcastError::CapabilityUnconfigured {
                capability: Capability::TextGeneration,
            })?;
        Ok(Self {
            client: build_client(config.timeout_secs, &config.model)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, prompt, system), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, system: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&self.model, &e))?;
        let response = check_status(&self.model, response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport(&self.model, &e))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::invalid_response(&self.model, "no message content"))?;

        debug!(len = content.len(), "Text generation complete");
        Ok(content)
    }
}

/// Images-generation client.
#[derive(Debug, Clone)]
pub struct OpenAiImageGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiImageGenerator {
    /// Builds a generator from configuration.
    ///
    /// Fails with [`FlashcastError::CapabilityUnconfigured`] when no API key
    /// is set.
    pub fn from_config(config: &ImageConfig) -> Result<Self, FlashcastError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(FlashcastError::CapabilityUnconfigured {
                capability: Capability::ImageGeneration,
            })?;
        Ok(Self {
            client: build_client(config.timeout_secs, "openai-images")?,
            endpoint: format!(
                "{}/images/generations",
                config.base_url.trim_end_matches('/')
            ),
            api_key,
        })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    #[instrument(skip(self, request), fields(model = %request.model, size = %request.size))]
    async fn generate(&self, request: &ImageRequest) -> Result<ImagePayload, ProviderError> {
        let body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "size": request.size,
            "n": 1,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(&request.model, &e))?;
        let response = check_status(&request.model, response).await?;

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_transport(&request.model, &e))?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response(&request.model, "empty data array"))?;

        match (datum.b64_json, datum.url) {
            (Some(b64), _) if !b64.is_empty() => Ok(ImagePayload::Inline(b64)),
            (_, Some(url)) if !url.is_empty() => Ok(ImagePayload::Remote(url)),
            _ => Err(ProviderError::invalid_response(
                &request.model,
                "response carried neither b64_json nor url",
            )),
        }
    }

    // Remote payload URLs are usually signed; only the host is recorded.
    #[instrument(skip(self, url), fields(host = %url_host(url)))]
    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport("image-download", &e.without_url()))?;
        let response = check_status("image-download", response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_transport("image-download", &e.without_url()))?;
        Ok(bytes.to_vec())
    }
}
