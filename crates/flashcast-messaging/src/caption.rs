//! Notice and caption rendering.
//!
//! Three shapes are produced per cycle:
//! - the progress notice sent at the end of phase one,
//! - the full caption attached to the illustration (or sent alone),
//! - the minimal fallback used when phase two fails outright.

/// Default heading for every notice.
pub const DEFAULT_TITLE: &str = "🇮🇹 Daily Italian Flashcard";

/// Borrowed view of the text fields of a flashcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardFields<'a> {
    /// The term.
    pub term: &'a str,
    /// Pronunciation guide.
    pub phonetic: &'a str,
    /// Translation.
    pub translation: &'a str,
    /// Example sentence.
    pub example_sentence: &'a str,
}

/// Renders flashcard fields into outbound message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionRenderer {
    title: String,
}

impl Default for CaptionRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

impl CaptionRenderer {
    /// Creates a renderer with a custom heading.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// The heading used on every notice.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Short notice sent once the text phase is done.
    #[must_use]
    pub fn progress_notice(&self, card: &CardFields<'_>) -> String {
        format!(
            "{}\n\n🟩 {}\n🔊 {}\n🌍 {}\n\n🎨 Illustration on the way...",
            self.title, card.term, card.phonetic, card.translation
        )
    }

    /// Full caption carried by the consolidated message.
    #[must_use]
    pub fn full_caption(&self, card: &CardFields<'_>) -> String {
        format!(
            "{}\n\n🟩 Term: {}\n🔊 Pronunciation: {}\n🌍 Translation: {}\n💬 Example: {}",
            self.title, card.term, card.phonetic, card.translation, card.example_sentence
        )
    }

    /// Last-resort notice with only the term and translation.
    #[must_use]
    pub fn minimal_notice(&self, term: &str, translation: &str) -> String {
        format!("{}\n\n{term} = {translation}", self.title)
    }
}

/// Truncates `caption` to at most `max_chars` characters, marking the cut
/// with an ellipsis.
#[must_use]
pub fn truncate_caption(caption: &str, max_chars: usize) -> String {
    if caption.chars().count() <= max_chars {
        return caption.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = caption.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}
