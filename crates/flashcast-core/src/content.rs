//! Linguistic content synthesis.
//!
//! [`ContentSynthesizer::synthesize`] never fails. A missing generator, a
//! failed call, or an unreadable response all degrade to the sentinel
//! strings below so the text phase always has something to deliver.

use std::sync::Arc;

use flashcast_messaging::CardFields;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::provider::TextGenerator;

/// Placeholder pronunciation.
pub const PHONETIC_UNAVAILABLE: &str = "Pronunciation unavailable";
/// Placeholder translation.
pub const TRANSLATION_UNAVAILABLE: &str = "Translation unavailable";
/// Placeholder example sentence.
pub const EXAMPLE_UNAVAILABLE: &str = "Example unavailable";

const SYSTEM_PROMPT: &str = "Return only valid JSON.";

const TERM_KEYS: &[&str] = &["term", "italian_text"];
const PHONETIC_KEYS: &[&str] = &["phonetic", "pronunciation"];
const TRANSLATION_KEYS: &[&str] = &["translation", "english_translation"];
const EXAMPLE_KEYS: &[&str] = &["example_sentence", "example"];

static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\n?\s*```\s*$").ok());

/// The four text fields of a flashcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinguisticContent {
    /// The term, as the generator normalized it (or the input).
    pub term: String,
    /// Pronunciation guide.
    pub phonetic: String,
    /// Translation.
    pub translation: String,
    /// One example sentence using the term.
    pub example_sentence: String,
}

impl LinguisticContent {
    /// Sentinel content echoing the input term.
    #[must_use]
    pub fn unavailable(term: &str) -> Self {
        Self {
            term: term.to_string(),
            phonetic: PHONETIC_UNAVAILABLE.to_string(),
            translation: TRANSLATION_UNAVAILABLE.to_string(),
            example_sentence: EXAMPLE_UNAVAILABLE.to_string(),
        }
    }

    /// Borrowed view for caption rendering.
    #[must_use]
    pub fn fields(&self) -> CardFields<'_> {
        CardFields {
            term: &self.term,
            phonetic: &self.phonetic,
            translation: &self.translation,
            example_sentence: &self.example_sentence,
        }
    }
}

/// Result of one synthesis.
///
/// Every variant carries usable content; the variant says how it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentOutcome {
    /// The generator answered with at least one usable field.
    Generated(LinguisticContent),
    /// No text generator is configured.
    Unconfigured(LinguisticContent),
    /// The call failed or the response was unusable.
    Degraded {
        /// Sentinel content.
        content: LinguisticContent,
        /// Why generation was abandoned.
        reason: String,
    },
}

impl ContentOutcome {
    /// The content, whichever way it was produced.
    #[must_use]
    pub const fn content(&self) -> &LinguisticContent {
        match self {
            Self::Generated(content)
            | Self::Unconfigured(content)
            | Self::Degraded { content, .. } => content,
        }
    }

    /// Consumes the outcome, returning the content.
    #[must_use]
    pub fn into_content(self) -> LinguisticContent {
        match self {
            Self::Generated(content)
            | Self::Unconfigured(content)
            | Self::Degraded { content, .. } => content,
        }
    }

    /// Returns `true` unless the content came from the generator.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        !matches!(self, Self::Generated(_))
    }
}

/// Produces [`LinguisticContent`] for a term.
#[derive(Clone)]
pub struct ContentSynthesizer {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl std::fmt::Debug for ContentSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentSynthesizer")
            .field("generator", &self.generator.as_ref().map(|g| g.name()))
            .finish()
    }
}

impl ContentSynthesizer {
    /// Creates a synthesizer; `None` means text generation is unconfigured.
    #[must_use]
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    /// Returns `true` if a generator is attached.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    /// The attached generator, if any.
    #[must_use]
    pub fn generator(&self) -> Option<&dyn TextGenerator> {
        self.generator.as_deref()
    }

    /// Generates content for `term`, degrading instead of failing.
    pub async fn synthesize(&self, term: &str) -> ContentOutcome {
        let Some(generator) = &self.generator else {
            debug!(term, "Text generation unconfigured, using sentinel content");
            return ContentOutcome::Unconfigured(LinguisticContent::unavailable(term));
        };

        let raw = match generator.generate(&build_prompt(term), SYSTEM_PROMPT).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(term, error = %e, "Text generation failed, using sentinel content");
                return ContentOutcome::Degraded {
                    content: LinguisticContent::unavailable(term),
                    reason: e.to_string(),
                };
            }
        };

        match parse_content(term, &raw) {
            Ok(content) => ContentOutcome::Generated(content),
            Err(reason) => {
                warn!(term, %reason, "Unusable text generation response");
                ContentOutcome::Degraded {
                    content: LinguisticContent::unavailable(term),
                    reason,
                }
            }
        }
    }
}

fn build_prompt(term: &str) -> String {
    format!(
        "You are helping beginners learn Italian. \
         Return strict JSON with the string keys term, phonetic, translation and example_sentence. \
         phonetic is an English-style pronunciation guide; translation is the English meaning; \
         example_sentence is one short Italian sentence using the term, followed by its English \
         translation in parentheses. Use this Italian word or phrase: {term}."
    )
}

/// Removes a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(raw))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| raw.trim(), |m| m.as_str().trim())
}

fn pick(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Extracts each field independently, defaulting the missing ones.
///
/// Fails only when the response is not a JSON object or carries none of the
/// expected fields.
pub(crate) fn parse_content(term: &str, raw: &str) -> Result<LinguisticContent, String> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| format!("response is not valid JSON: {e}"))?;
    let Value::Object(object) = value else {
        return Err("response is not a JSON object".to_string());
    };

    let phonetic = pick(&object, PHONETIC_KEYS);
    let translation = pick(&object, TRANSLATION_KEYS);
    let example = pick(&object, EXAMPLE_KEYS);
    if phonetic.is_none() && translation.is_none() && example.is_none() {
        return Err("response contained none of the expected fields".to_string());
    }

    Ok(LinguisticContent {
        term: pick(&object, TERM_KEYS).unwrap_or_else(|| term.to_string()),
        phonetic: phonetic.unwrap_or_else(|| PHONETIC_UNAVAILABLE.to_string()),
        translation: translation.unwrap_or_else(|| TRANSLATION_UNAVAILABLE.to_string()),
        example_sentence: example.unwrap_or_else(|| EXAMPLE_UNAVAILABLE.to_string()),
    })
}
