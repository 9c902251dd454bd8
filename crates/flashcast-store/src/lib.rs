//! Flashcast Persistence
//!
//! Storage for the rotating pool of source terms and the lifecycle of
//! generated flashcards.
//!
//! The [`CardStore`] trait is the persistence seam consumed by the pipeline;
//! [`SqliteStore`] is the bundled implementation.

mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteStore;

/// A specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to prepare the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No flashcard exists with the given id.
    #[error("flashcard not found: {id}")]
    FlashcardNotFound {
        /// The missing record id.
        id: i64,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp in store: '{value}'")]
    InvalidTimestamp {
        /// The raw stored value.
        value: String,
    },

    /// A stored tier label is not recognized.
    #[error("invalid tier in store: '{value}'")]
    InvalidTier {
        /// The raw stored value.
        value: String,
    },

    /// The connection lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Difficulty tier partitioning the term pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Beginner terms (the only tier seeded today).
    #[default]
    Beginner,
    /// Intermediate terms.
    Intermediate,
    /// Advanced terms.
    Advanced,
}

impl Tier {
    /// Returns the stored label for this tier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }

    /// Parses a tier label, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid tier '{s}': expected one of 'beginner', 'intermediate', 'advanced'"
            ))
        })
    }
}

impl Serialize for Tier {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A term in the rotating pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTerm {
    /// Stable id assigned at insertion; rotation order follows it.
    pub id: i64,
    /// The term itself, unique within the pool.
    pub text: String,
    /// Free-form category label.
    pub category: String,
    /// Difficulty tier.
    pub tier: Tier,
    /// Whether the term has been drawn in the current lap.
    pub used: bool,
    /// When the term was last drawn.
    pub used_at: Option<DateTime<Utc>>,
}

/// Fields for a flashcard created at the end of phase one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFlashcard {
    /// The term.
    pub term: String,
    /// Pronunciation guide.
    pub phonetic: String,
    /// Translation.
    pub translation: String,
    /// Example sentence using the term.
    pub example_sentence: String,
    /// Tier the term was drawn from.
    pub tier: Tier,
    /// Delivery channel label (e.g. "telegram").
    pub delivery_channel: String,
    /// When phase one committed the card. Stamped before the progress
    /// notice is attempted, so it does not prove the notice was delivered.
    pub sent_at: DateTime<Utc>,
}

/// A persisted flashcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardRecord {
    /// Id assigned on creation.
    pub id: i64,
    /// The term.
    pub term: String,
    /// Pronunciation guide.
    pub phonetic: String,
    /// Translation.
    pub translation: String,
    /// Example sentence.
    pub example_sentence: String,
    /// Local path of the illustration, set by phase two.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_location: Option<String>,
    /// Prompt used for the illustration, set by phase two.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_used: Option<String>,
    /// Tier the term was drawn from.
    pub tier: Tier,
    /// Delivery channel label.
    pub delivery_channel: String,
    /// When phase one committed the card; see [`NewFlashcard::sent_at`].
    pub sent_at: DateTime<Utc>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Persistence operations consumed by the pipeline.
///
/// Implementations must be shareable across tasks. Rotation assumes a single
/// writer per tier; no locking is done across calls.
pub trait CardStore: Send + Sync {
    /// Counts terms across all tiers.
    fn count_terms(&self) -> Result<u64>;

    /// Inserts a term, returning its id, or `None` if the text already exists.
    fn insert_term(&self, text: &str, category: &str, tier: Tier) -> Result<Option<i64>>;

    /// Lists terms at a tier ordered by id, optionally filtered by `used`.
    fn list_terms(&self, tier: Tier, used: Option<bool>) -> Result<Vec<SourceTerm>>;

    /// Marks a term as drawn at the given time.
    fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Clears `used`/`used_at` on every term at a tier, returning the count.
    fn reset_all_used(&self, tier: Tier) -> Result<usize>;

    /// Resets a tier and marks its lowest-id term as drawn.
    ///
    /// The default composes the individual operations in order; stores that
    /// support transactions should override it so the reset and the mark
    /// commit together.
    fn reset_and_draw_first(&self, tier: Tier, at: DateTime<Utc>) -> Result<Option<SourceTerm>> {
        self.reset_all_used(tier)?;
        let Some(mut first) = self.list_terms(tier, None)?.into_iter().next() else {
            return Ok(None);
        };
        self.mark_used(first.id, at)?;
        first.used = true;
        first.used_at = Some(at);
        Ok(Some(first))
    }

    /// Creates a flashcard record, returning its id.
    fn create_flashcard(&self, card: &NewFlashcard) -> Result<i64>;

    /// Attaches image data to an existing record.
    fn update_flashcard_image(&self, id: i64, location: &str, prompt: &str) -> Result<()>;

    /// Fetches a record by id.
    fn get_flashcard(&self, id: i64) -> Result<Option<FlashcardRecord>>;

    /// Lists the most recent records, newest first.
    fn list_flashcards(&self, limit: usize) -> Result<Vec<FlashcardRecord>>;
}
