//! Illustration synthesis.
//!
//! One prompt is composed per card, tried against the configured model and
//! then, once, against [`FALLBACK_IMAGE_MODEL`]. Whatever the provider hands
//! back is normalized to raw bytes and written under the output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ImageConfig;
use crate::error::ProviderError;
use crate::provider::{ImageGenerator, ImagePayload, ImageRequest};

/// Model tried when the configured one fails.
pub const FALLBACK_IMAGE_MODEL: &str = "dall-e-3";

const MAX_SLUG_CHARS: usize = 40;

/// Image formats recognized from their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG image format.
    Png,
    /// JPEG image format.
    Jpeg,
    /// GIF image format.
    Gif,
    /// WebP image format.
    Webp,
}

impl ImageFormat {
    /// Detects the format from magic numbers.
    ///
    /// Returns `None` if the bytes match no known signature.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    /// File extension, without the dot.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }

    /// MIME type for uploads.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A generated and persisted illustration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// Where the bytes were written.
    pub location: PathBuf,
    /// Prompt sent to the provider.
    pub prompt_used: String,
    /// Model that produced the image.
    pub model_used: String,
    /// Detected format (PNG when unrecognized).
    pub format: ImageFormat,
}

impl ImageResult {
    /// File name component of [`ImageResult::location`].
    #[must_use]
    pub fn file_name(&self) -> String {
        self.location
            .file_name()
            .map_or_else(|| "card".to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Result of one synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// An illustration is available.
    Image(ImageResult),
    /// No illustration; the card goes out as text.
    NoImage {
        /// Prompt that was (or would have been) sent.
        prompt_used: String,
        /// Why there is no image.
        reason: String,
    },
}

impl ImageOutcome {
    /// The prompt, whichever way the synthesis ended.
    #[must_use]
    pub fn prompt_used(&self) -> &str {
        match self {
            Self::Image(result) => &result.prompt_used,
            Self::NoImage { prompt_used, .. } => prompt_used,
        }
    }
}

/// Produces illustrations for cards.
#[derive(Clone)]
pub struct ImageSynthesizer {
    generator: Option<Arc<dyn ImageGenerator>>,
    primary_model: String,
    size: String,
    prompt_template: String,
    output_dir: PathBuf,
}

impl std::fmt::Debug for ImageSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSynthesizer")
            .field("configured", &self.generator.is_some())
            .field("primary_model", &self.primary_model)
            .field("size", &self.size)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl ImageSynthesizer {
    /// Creates a synthesizer; `None` means image generation is unconfigured.
    #[must_use]
    pub fn new(
        generator: Option<Arc<dyn ImageGenerator>>,
        config: &ImageConfig,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            primary_model: config.model.clone(),
            size: config.size.clone(),
            prompt_template: config.prompt_template.clone(),
            output_dir: output_dir.into(),
        }
    }

    /// Directory illustrations are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fills the prompt template with the card's text fields.
    #[must_use]
    pub fn compose_prompt(&self, term: &str, phonetic: &str, translation: &str) -> String {
        self.prompt_template
            .replace("{term}", term)
            .replace("{phonetic}", phonetic)
            .replace("{translation}", translation)
    }

    /// Generates, normalizes and stores one illustration.
    ///
    /// Provider failures never escape: they resolve to the fallback model's
    /// result or to [`ImageOutcome::NoImage`], and are logged.
    pub async fn synthesize(&self, term: &str, phonetic: &str, translation: &str) -> ImageOutcome {
        let prompt = self.compose_prompt(term, phonetic, translation);

        let Some(generator) = &self.generator else {
            return ImageOutcome::NoImage {
                prompt_used: prompt,
                reason: "image generation is not configured".to_string(),
            };
        };

        let primary = self
            .attempt(generator.as_ref(), &prompt, &self.primary_model)
            .await;
        let (bytes, model_used) = match primary {
            Ok(bytes) => (bytes, self.primary_model.clone()),
            Err(primary_err) if self.primary_model == FALLBACK_IMAGE_MODEL => {
                warn!(model = %self.primary_model, error = %primary_err, "Image generation failed");
                return ImageOutcome::NoImage {
                    prompt_used: prompt,
                    reason: primary_err.to_string(),
                };
            }
            Err(primary_err) => {
                warn!(
                    primary = %self.primary_model,
                    fallback = FALLBACK_IMAGE_MODEL,
                    error = %primary_err,
                    "Primary image model failed, retrying with fallback"
                );
                match self.attempt(generator.as_ref(), &prompt, FALLBACK_IMAGE_MODEL).await {
                    Ok(bytes) => (bytes, FALLBACK_IMAGE_MODEL.to_string()),
                    Err(fallback_err) => {
                        warn!(
                            model = FALLBACK_IMAGE_MODEL,
                            error = %fallback_err,
                            "Fallback image model failed, continuing without an image"
                        );
                        return ImageOutcome::NoImage {
                            prompt_used: prompt,
                            reason: fallback_err.to_string(),
                        };
                    }
                }
            }
        };

        let format = ImageFormat::sniff(&bytes).unwrap_or(ImageFormat::Png);
        let location = self
            .output_dir
            .join(image_file_name(Utc::now(), term, format));

        if let Err(e) = self.persist(&location, &bytes).await {
            warn!(path = %location.display(), error = %e, "Could not store illustration");
            return ImageOutcome::NoImage {
                prompt_used: prompt,
                reason: format!("failed to store image: {e}"),
            };
        }

        info!(
            model = %model_used,
            path = %location.display(),
            bytes = bytes.len(),
            "Illustration stored"
        );
        ImageOutcome::Image(ImageResult {
            bytes,
            location,
            prompt_used: prompt,
            model_used,
            format,
        })
    }

    /// One generation call plus payload normalization.
    async fn attempt(
        &self,
        generator: &dyn ImageGenerator,
        prompt: &str,
        model: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let request = ImageRequest {
            prompt: prompt.to_string(),
            size: self.size.clone(),
            model: model.to_string(),
        };
        let bytes = match generator.generate(&request).await? {
            ImagePayload::Inline(encoded) => decode_inline(model, &encoded)?,
            ImagePayload::Remote(url) => generator.fetch_remote(&url).await?,
        };
        if bytes.is_empty() {
            return Err(ProviderError::invalid_response(model, "image payload was empty"));
        }
        Ok(bytes)
    }

    async fn persist(&self, location: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(location, bytes).await
    }
}

/// Decodes base64, tolerating a `data:` URL prefix.
fn decode_inline(model: &str, encoded: &str) -> Result<Vec<u8>, ProviderError> {
    let encoded = encoded.trim();
    let encoded = encoded
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .map_or(encoded, |(_, data)| data);
    STANDARD
        .decode(encoded)
        .map_err(|e| ProviderError::invalid_response(model, format!("invalid base64 image: {e}")))
}

/// Lowercased, underscore-separated form of a term for file names.
#[must_use]
pub fn slugify(term: &str) -> String {
    let replaced: String = term
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                '_'
            }
        })
        .collect();
    let slug: String = replaced
        .trim_matches('_')
        .chars()
        .take(MAX_SLUG_CHARS)
        .collect();
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "card".to_string()
    } else {
        slug.to_string()
    }
}

/// `{YYYYmmdd_HHMMSS}_{slug}.{ext}`.
#[must_use]
pub fn image_file_name(at: DateTime<Utc>, term: &str, format: ImageFormat) -> String {
    format!(
        "{}_{}.{}",
        at.format("%Y%m%d_%H%M%S"),
        slugify(term),
        format.extension()
    )
}
