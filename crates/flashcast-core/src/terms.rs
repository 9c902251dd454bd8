//! Term rotation over a [`CardStore`].
//!
//! Terms are drawn in ascending id order. When every term at the tier has
//! been drawn, the tier is reset and the lap starts again from the lowest
//! id. Callers must not run two draws for the same tier concurrently.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use flashcast_store::{CardStore, Tier};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FlashcastError, Result};

fn default_category() -> String {
    "general".to_string()
}

/// One bootstrap candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedTerm {
    /// The term text.
    #[serde(alias = "italian_text")]
    pub text: String,
    /// Free-form grouping label.
    #[serde(default = "default_category")]
    pub category: String,
}

impl SeedTerm {
    /// Creates a candidate.
    #[must_use]
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }
}

/// What a bootstrap did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedOutcome {
    /// Terms written to the pool.
    pub inserted: usize,
    /// Candidates not written (pool already populated, blank or duplicate).
    pub skipped: usize,
}

/// Reads a JSON array of seed terms.
///
/// A missing file yields an empty list.
pub fn load_seed_file(path: &Path) -> Result<Vec<SeedTerm>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "Seed file not found, skipping bootstrap");
            return Ok(Vec::new());
        }
        Err(e) => return Err(FlashcastError::seed_file(path, e.to_string())),
    };
    serde_json::from_str(&contents).map_err(|e| FlashcastError::seed_file(path, e.to_string()))
}

/// Draws terms from one tier of the pool.
#[derive(Clone)]
pub struct TermStore {
    store: Arc<dyn CardStore>,
    tier: Tier,
}

impl std::fmt::Debug for TermStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermStore")
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

impl TermStore {
    /// Creates a term store drawing from `tier`.
    #[must_use]
    pub fn new(store: Arc<dyn CardStore>, tier: Tier) -> Self {
        Self { store, tier }
    }

    /// The tier drawn from.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        self.tier
    }

    /// Draws the next term and marks it used.
    ///
    /// Fails with [`FlashcastError::PoolExhausted`] only when the tier holds
    /// no terms at all.
    pub fn next_term(&self) -> Result<String> {
        let now = Utc::now();

        if let Some(term) = self.store.list_terms(self.tier, Some(false))?.into_iter().next() {
            self.store.mark_used(term.id, now)?;
            debug!(id = term.id, term = %term.text, "Drew term");
            return Ok(term.text);
        }

        info!(tier = %self.tier, "All terms drawn, starting a new lap");
        match self.store.reset_and_draw_first(self.tier, now)? {
            Some(term) => {
                debug!(id = term.id, term = %term.text, "Drew term after reset");
                Ok(term.text)
            }
            None => Err(FlashcastError::PoolExhausted { tier: self.tier }),
        }
    }

    /// Inserts `candidates` only if the pool has no terms at any tier.
    pub fn seed_if_empty(&self, candidates: &[SeedTerm]) -> Result<SeedOutcome> {
        let existing = self.store.count_terms()?;
        if existing > 0 {
            debug!(existing, "Pool already seeded");
            return Ok(SeedOutcome {
                inserted: 0,
                skipped: candidates.len(),
            });
        }

        let mut outcome = SeedOutcome::default();
        let mut seen = HashSet::new();
        for candidate in candidates {
            let text = candidate.text.trim();
            if text.is_empty() || !seen.insert(text) {
                outcome.skipped += 1;
                continue;
            }
            match self.store.insert_term(text, &candidate.category, self.tier)? {
                Some(_) => outcome.inserted += 1,
                None => outcome.skipped += 1,
            }
        }

        info!(
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            tier = %self.tier,
            "Seeded term pool"
        );
        Ok(outcome)
    }
}
