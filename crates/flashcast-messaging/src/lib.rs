//! Flashcast Messaging
//!
//! The outbound side of the pipeline: a [`Messenger`] that can send plain
//! text or a photo with a caption, the Telegram Bot API implementation, and
//! the renderers that turn flashcard fields into notices.
//!
//! # Example
//!
//! ```no_run
//! use flashcast_messaging::{CaptionRenderer, CardFields, Messenger, TelegramMessenger, TelegramOptions};
//!
//! # async fn example() -> Result<(), flashcast_messaging::DeliveryError> {
//! let messenger = TelegramMessenger::new(TelegramOptions::new(
//!     Some("123:abc".to_string()),
//!     Some("42".to_string()),
//! ))?;
//! let renderer = CaptionRenderer::default();
//! let card = CardFields {
//!     term: "ciao",
//!     phonetic: "chow",
//!     translation: "hello",
//!     example_sentence: "Ciao, come stai?",
//! };
//! messenger.send_text(&renderer.progress_notice(&card)).await?;
//! # Ok(())
//! # }
//! ```

mod caption;
mod telegram;

use async_trait::async_trait;
use thiserror::Error;

pub use caption::{truncate_caption, CaptionRenderer, CardFields, DEFAULT_TITLE};
pub use telegram::{TelegramMessenger, TelegramOptions, MAX_CAPTION_CHARS};

/// Errors that can occur while delivering a message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The channel is missing credentials or a destination.
    #[error("messaging channel is not configured: {missing}\n\nSuggestion: Set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID")]
    Unconfigured {
        /// Which setting is missing.
        missing: String,
    },

    /// The request could not be sent or the response could not be read.
    ///
    /// Built through [`DeliveryError::transport`] so the request URL, which
    /// carries the bot token, never reaches the message.
    #[error("messaging transport error: {0}")]
    Http(reqwest::Error),

    /// The remote API returned a non-success status.
    #[error("messaging API error: {status} {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },
}

impl DeliveryError {
    /// Creates a new `Unconfigured` error.
    #[must_use]
    pub fn unconfigured(missing: impl Into<String>) -> Self {
        Self::Unconfigured {
            missing: missing.into(),
        }
    }

    /// Wraps a transport failure with its request URL stripped.
    #[must_use]
    pub fn transport(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

/// An image to upload alongside a caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// File name presented to the remote API.
    pub file_name: String,
    /// MIME type of the bytes.
    pub mime_type: String,
}

/// Outbound messaging channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Label recorded on flashcards delivered through this channel.
    fn channel(&self) -> &str;

    /// Sends a plain text message.
    async fn send_text(&self, text: &str) -> Result<(), DeliveryError>;

    /// Sends an image with a caption as a single message.
    async fn send_photo(&self, photo: PhotoUpload, caption: &str) -> Result<(), DeliveryError>;
}
