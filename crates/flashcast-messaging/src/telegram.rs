//! Telegram Bot API implementation of [`Messenger`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, instrument};

use crate::caption::truncate_caption;
use crate::{DeliveryError, Messenger, PhotoUpload};

/// Telegram rejects photo captions longer than this many characters.
pub const MAX_CAPTION_CHARS: usize = 1024;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Options for constructing a [`TelegramMessenger`].
///
/// Missing credentials are accepted here; sends fail with
/// [`DeliveryError::Unconfigured`] instead.
#[derive(Debug, Clone)]
pub struct TelegramOptions {
    /// Bot token issued by `@BotFather`.
    pub bot_token: Option<String>,
    /// Destination chat id.
    pub chat_id: Option<String>,
    /// API base URL, without trailing slash.
    pub api_base: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl TelegramOptions {
    /// Creates options with the default API base and timeout.
    #[must_use]
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        Self {
            bot_token,
            chat_id,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Overrides the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Sends messages to one Telegram chat.
#[derive(Debug, Clone)]
pub struct TelegramMessenger {
    client: reqwest::Client,
    options: TelegramOptions,
}

impl TelegramMessenger {
    /// Builds the HTTP client for the given options.
    pub fn new(options: TelegramOptions) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(DeliveryError::transport)?;
        Ok(Self { client, options })
    }

    /// Returns `true` if both the bot token and chat id are present.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.options.bot_token.is_some() && self.options.chat_id.is_some()
    }

    fn endpoint(&self, method: &str) -> Result<(String, &str), DeliveryError> {
        let token = self
            .options
            .bot_token
            .as_deref()
            .ok_or_else(|| DeliveryError::unconfigured("bot token"))?;
        let chat_id = self
            .options
            .chat_id
            .as_deref()
            .ok_or_else(|| DeliveryError::unconfigured("chat id"))?;
        Ok((
            format!("{}/bot{token}/{method}", self.options.api_base),
            chat_id,
        ))
    }

    async fn check(response: reqwest::Response) -> Result<(), DeliveryError> {
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    fn channel(&self) -> &str {
        "telegram"
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn send_text(&self, text: &str) -> Result<(), DeliveryError> {
        let (url, chat_id) = self.endpoint("sendMessage")?;
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(DeliveryError::transport)?;
        Self::check(response).await?;
        debug!("Text message delivered");
        Ok(())
    }

    #[instrument(skip(self, photo, caption), fields(file = %photo.file_name, bytes = photo.bytes.len()))]
    async fn send_photo(&self, photo: PhotoUpload, caption: &str) -> Result<(), DeliveryError> {
        let (url, chat_id) = self.endpoint("sendPhoto")?;
        let part = Part::bytes(photo.bytes)
            .file_name(photo.file_name)
            .mime_str(&photo.mime_type)
            .map_err(DeliveryError::transport)?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", truncate_caption(caption, MAX_CAPTION_CHARS))
            .part("photo", part);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(DeliveryError::transport)?;
        Self::check(response).await?;
        info!("Photo delivered");
        Ok(())
    }
}
