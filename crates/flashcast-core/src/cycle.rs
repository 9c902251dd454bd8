//! Cycle state for one flashcard delivery.
//!
//! A cycle moves strictly forward through
//! `Created -> TextSent -> ImageAttempted -> Complete`; each phase runs once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FlashcastError, Result};

// ============================================================================
// CycleState
// ============================================================================

/// Where a cycle is in the two-phase pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// The flashcard record has been persisted.
    #[default]
    Created,
    /// The progress notice has been delivered.
    TextSent,
    /// Illustration synthesis has finished, with or without an image.
    ImageAttempted,
    /// The consolidated (or fallback) message has been handled.
    Complete,
}

impl CycleState {
    /// Returns `true` if `next` is the immediate successor of this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use flashcast_core::CycleState;
    ///
    /// assert!(CycleState::Created.can_transition_to(CycleState::TextSent));
    /// assert!(!CycleState::TextSent.can_transition_to(CycleState::Created));
    /// assert!(!CycleState::Created.can_transition_to(CycleState::Complete));
    /// ```
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::TextSent)
                | (Self::TextSent, Self::ImageAttempted)
                | (Self::ImageAttempted, Self::Complete)
        )
    }

    /// Returns `true` for [`CycleState::Complete`].
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::TextSent => write!(f, "text_sent"),
            Self::ImageAttempted => write!(f, "image_attempted"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

// ============================================================================
// CycleTracker
// ============================================================================

/// A state change and when it happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State entered.
    pub state: CycleState,
    /// When it was entered.
    pub at: DateTime<Utc>,
}

/// Tracks one cycle's state for one flashcard record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTracker {
    /// Record the cycle belongs to.
    pub record_id: i64,
    /// Every state entered so far, oldest first.
    pub history: Vec<Transition>,
}

impl CycleTracker {
    /// Starts a tracker in [`CycleState::Created`].
    #[must_use]
    pub fn created(record_id: i64) -> Self {
        Self::resume(record_id, CycleState::Created)
    }

    /// Starts a tracker at an arbitrary state, e.g. phase two picking up
    /// after phase one.
    #[must_use]
    pub fn resume(record_id: i64, state: CycleState) -> Self {
        Self {
            record_id,
            history: vec![Transition {
                state,
                at: Utc::now(),
            }],
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> CycleState {
        self.history
            .last()
            .map_or(CycleState::Created, |transition| transition.state)
    }

    /// Moves to `next`, rejecting anything but the immediate successor.
    pub fn advance(&mut self, next: CycleState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(FlashcastError::invalid_transition(current, next));
        }
        self.history.push(Transition {
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }
}
