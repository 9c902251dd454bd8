//! SQLite-backed [`CardStore`].
//!
//! A single connection guarded by a mutex. Timestamps are stored as RFC 3339
//! UTC strings with microsecond precision so that lexical order matches
//! chronological order.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::{CardStore, FlashcardRecord, NewFlashcard, Result, SourceTerm, StoreError, Tier};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS source_terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL UNIQUE,
    category TEXT NOT NULL DEFAULT 'general',
    tier TEXT NOT NULL DEFAULT 'beginner',
    used INTEGER NOT NULL DEFAULT 0,
    used_at TEXT
);

CREATE TABLE IF NOT EXISTS flashcards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term TEXT NOT NULL,
    phonetic TEXT NOT NULL,
    translation TEXT NOT NULL,
    example_sentence TEXT NOT NULL,
    image_location TEXT,
    prompt_used TEXT,
    tier TEXT NOT NULL,
    delivery_channel TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_source_terms_tier_used ON source_terms(tier, used, id);
CREATE INDEX IF NOT EXISTS idx_flashcards_created_at ON flashcards(created_at);
";

const TERM_COLUMNS: &str = "id, text, category, tier, used, used_at";
const CARD_COLUMNS: &str = "id, term, phonetic, translation, example_sentence, image_location, \
                            prompt_used, tier, delivery_channel, sent_at, created_at";

/// SQLite implementation of [`CardStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) a database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "Opened flashcard database");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl CardStore for SqliteStore {
    fn count_terms(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM source_terms", [], |row| {
            row.get(0)
        })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn insert_term(&self, text: &str, category: &str, tier: Tier) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO source_terms (text, category, tier) VALUES (?1, ?2, ?3)",
            params![text, category, tier.as_str()],
        )?;
        if changed == 0 {
            debug!(text, "Term already present, skipped");
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn list_terms(&self, tier: Tier, used: Option<bool>) -> Result<Vec<SourceTerm>> {
        let conn = self.lock()?;
        let raw = match used {
            Some(flag) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TERM_COLUMNS} FROM source_terms \
                     WHERE tier = ?1 AND used = ?2 ORDER BY id ASC"
                ))?;
                let rows = stmt.query_map(params![tier.as_str(), flag], RawTerm::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TERM_COLUMNS} FROM source_terms WHERE tier = ?1 ORDER BY id ASC"
                ))?;
                let rows = stmt.query_map(params![tier.as_str()], RawTerm::from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        raw.into_iter().map(RawTerm::into_term).collect()
    }

    fn mark_used(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE source_terms SET used = 1, used_at = ?1 WHERE id = ?2",
            params![format_timestamp(at), id],
        )?;
        Ok(())
    }

    fn reset_all_used(&self, tier: Tier) -> Result<usize> {
        let conn = self.lock()?;
        let count = conn.execute(
            "UPDATE source_terms SET used = 0, used_at = NULL WHERE tier = ?1",
            params![tier.as_str()],
        )?;
        Ok(count)
    }

    fn reset_and_draw_first(&self, tier: Tier, at: DateTime<Utc>) -> Result<Option<SourceTerm>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let reset = tx.execute(
            "UPDATE source_terms SET used = 0, used_at = NULL WHERE tier = ?1",
            params![tier.as_str()],
        )?;

        let first = tx
            .query_row(
                &format!(
                    "SELECT {TERM_COLUMNS} FROM source_terms WHERE tier = ?1 ORDER BY id ASC LIMIT 1"
                ),
                params![tier.as_str()],
                RawTerm::from_row,
            )
            .optional()?;

        let Some(raw) = first else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE source_terms SET used = 1, used_at = ?1 WHERE id = ?2",
            params![format_timestamp(at), raw.id],
        )?;
        tx.commit()?;

        debug!(tier = %tier, reset, id = raw.id, "Recycled tier and drew first term");

        let mut term = raw.into_term()?;
        term.used = true;
        term.used_at = Some(at);
        Ok(Some(term))
    }

    fn create_flashcard(&self, card: &NewFlashcard) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO flashcards (term, phonetic, translation, example_sentence, tier, \
             delivery_channel, sent_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                card.term,
                card.phonetic,
                card.translation,
                card.example_sentence,
                card.tier.as_str(),
                card.delivery_channel,
                format_timestamp(card.sent_at),
                format_timestamp(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_flashcard_image(&self, id: i64, location: &str, prompt: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE flashcards SET image_location = ?1, prompt_used = ?2 WHERE id = ?3",
            params![location, prompt, id],
        )?;
        if changed == 0 {
            return Err(StoreError::FlashcardNotFound { id });
        }
        Ok(())
    }

    fn get_flashcard(&self, id: i64) -> Result<Option<FlashcardRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM flashcards WHERE id = ?1"),
                params![id],
                RawCard::from_row,
            )
            .optional()?;
        raw.map(RawCard::into_record).transpose()
    }

    fn list_flashcards(&self, limit: usize) -> Result<Vec<FlashcardRecord>> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM flashcards ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))?;
        let raw = stmt
            .query_map(params![limit], RawCard::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawCard::into_record).collect()
    }
}

// Rows are read as raw strings first; parsing happens outside the rusqlite
// closure so that failures map to `StoreError`.

struct RawTerm {
    id: i64,
    text: String,
    category: String,
    tier: String,
    used: bool,
    used_at: Option<String>,
}

impl RawTerm {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            text: row.get(1)?,
            category: row.get(2)?,
            tier: row.get(3)?,
            used: row.get(4)?,
            used_at: row.get(5)?,
        })
    }

    fn into_term(self) -> Result<SourceTerm> {
        Ok(SourceTerm {
            id: self.id,
            text: self.text,
            category: self.category,
            tier: parse_tier(&self.tier)?,
            used: self.used,
            used_at: self.used_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

struct RawCard {
    id: i64,
    term: String,
    phonetic: String,
    translation: String,
    example_sentence: String,
    image_location: Option<String>,
    prompt_used: Option<String>,
    tier: String,
    delivery_channel: String,
    sent_at: String,
    created_at: String,
}

impl RawCard {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            term: row.get(1)?,
            phonetic: row.get(2)?,
            translation: row.get(3)?,
            example_sentence: row.get(4)?,
            image_location: row.get(5)?,
            prompt_used: row.get(6)?,
            tier: row.get(7)?,
            delivery_channel: row.get(8)?,
            sent_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<FlashcardRecord> {
        Ok(FlashcardRecord {
            id: self.id,
            term: self.term,
            phonetic: self.phonetic,
            translation: self.translation,
            example_sentence: self.example_sentence,
            image_location: self.image_location,
            prompt_used: self.prompt_used,
            tier: parse_tier(&self.tier)?,
            delivery_channel: self.delivery_channel,
            sent_at: parse_timestamp(&self.sent_at)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp {
            value: value.to_string(),
        })
}

fn parse_tier(value: &str) -> Result<Tier> {
    Tier::from_str_case_insensitive(value).ok_or_else(|| StoreError::InvalidTier {
        value: value.to_string(),
    })
}
