//! The two-phase delivery pipeline.
//!
//! Phase one draws a term, writes its text, persists the record and sends a
//! short progress notice. It is the only step a trigger waits on. Phase two
//! runs later, produces the illustration and sends one consolidated message.
//! Its failures end in a minimal notice and are otherwise only logged.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use flashcast_messaging::{CaptionRenderer, CardFields, Messenger, PhotoUpload};
use flashcast_store::{CardStore, NewFlashcard, Tier};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::content::{ContentOutcome, ContentSynthesizer};
use crate::cycle::{CycleState, CycleTracker};
use crate::error::{FlashcastError, Result};
use crate::image::{ImageOutcome, ImageSynthesizer};
use crate::provider::{ImageGenerator, OpenAiImageGenerator, OpenAiTextGenerator, TextGenerator};
use crate::terms::TermStore;

/// What phase one hands to phase two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOneOutput {
    /// Id of the persisted flashcard record.
    pub record_id: i64,
    /// The term.
    pub term: String,
    /// Pronunciation guide.
    pub phonetic: String,
    /// Translation.
    pub translation: String,
    /// Example sentence.
    pub example_sentence: String,
}

impl PhaseOneOutput {
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

/// Which message phase two managed to deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryKind {
    /// Illustration with the full caption.
    Photo,
    /// Full caption as plain text.
    Text,
    /// Term and translation only, after a failure.
    MinimalFallback,
    /// Nothing reached the channel.
    #[default]
    Nothing,
}

/// Summary of a phase-two run, for logs and inline callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTwoOutcome {
    /// Stored illustration path, if one was produced.
    pub image_location: Option<String>,
    /// Model that produced the illustration.
    pub model_used: Option<String>,
    /// What was delivered.
    pub delivered: DeliveryKind,
}

/// Both phases of an inline cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Phase-one hand-off.
    pub flashcard: PhaseOneOutput,
    /// Phase-two result.
    pub phase_two: PhaseTwoOutcome,
}

/// Runs generation cycles.
pub struct DeliveryOrchestrator {
    terms: TermStore,
    store: Arc<dyn CardStore>,
    content: ContentSynthesizer,
    images: ImageSynthesizer,
    messenger: Arc<dyn Messenger>,
    renderer: CaptionRenderer,
}

impl std::fmt::Debug for DeliveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryOrchestrator")
            .field("terms", &self.terms)
            .field("content", &self.content)
            .field("images", &self.images)
            .field("channel", &self.messenger.channel())
            .finish_non_exhaustive()
    }
}

impl DeliveryOrchestrator {
    /// Assembles an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CardStore>,
        tier: Tier,
        content: ContentSynthesizer,
        images: ImageSynthesizer,
        messenger: Arc<dyn Messenger>,
        renderer: CaptionRenderer,
    ) -> Self {
        Self {
            terms: TermStore::new(Arc::clone(&store), tier),
            store,
            content,
            images,
            messenger,
            renderer,
        }
    }

    /// Builds the production pipeline from configuration.
    ///
    /// A missing API key leaves that capability unconfigured rather than
    /// failing.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CardStore>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self> {
        let text: Option<Arc<dyn TextGenerator>> =
            match OpenAiTextGenerator::from_config(&config.text) {
                Ok(generator) => Some(Arc::new(generator)),
                Err(FlashcastError::CapabilityUnconfigured { capability }) => {
                    info!(%capability, "Capability unconfigured, sentinel content will be used");
                    None
                }
                Err(e) => return Err(e),
            };
        let image: Option<Arc<dyn ImageGenerator>> =
            match OpenAiImageGenerator::from_config(&config.image) {
                Ok(generator) => Some(Arc::new(generator)),
                Err(FlashcastError::CapabilityUnconfigured { capability }) => {
                    info!(%capability, "Capability unconfigured, cards will be sent without images");
                    None
                }
                Err(e) => return Err(e),
            };

        Ok(Self::new(
            store,
            config.tier,
            ContentSynthesizer::new(text),
            ImageSynthesizer::new(image, &config.image, PathBuf::from(&config.images_dir)),
            messenger,
            CaptionRenderer::new(config.card_title.clone()),
        ))
    }

    /// The term rotation used by this pipeline.
    #[must_use]
    pub const fn terms(&self) -> &TermStore {
        &self.terms
    }

    /// The persistence collaborator.
    #[must_use]
    pub fn store(&self) -> &dyn CardStore {
        self.store.as_ref()
    }

    /// The text synthesizer.
    #[must_use]
    pub const fn content(&self) -> &ContentSynthesizer {
        &self.content
    }

    /// The messaging collaborator.
    #[must_use]
    pub fn messenger(&self) -> &dyn Messenger {
        self.messenger.as_ref()
    }

    /// Draws a term, writes its text, persists the record and sends the
    /// progress notice.
    ///
    /// The record is kept even if the notice cannot be delivered; the
    /// delivery error is still returned.
    #[instrument(skip(self))]
    pub async fn run_phase_one(&self) -> Result<PhaseOneOutput> {
        let drawn = self.terms.next_term()?;

        let outcome = self.content.synthesize(&drawn).await;
        if let ContentOutcome::Degraded { reason, .. } = &outcome {
            debug!(%reason, "Continuing with sentinel content");
        }
        let content = outcome.into_content();

        let record_id = self.store.create_flashcard(&NewFlashcard {
            term: content.term.clone(),
            phonetic: content.phonetic.clone(),
            translation: content.translation.clone(),
            example_sentence: content.example_sentence.clone(),
            tier: self.terms.tier(),
            delivery_channel: self.messenger.channel().to_string(),
            // Commit time of phase one; the notice below may still be rejected.
            sent_at: Utc::now(),
        })?;
        let mut cycle = CycleTracker::created(record_id);

        self.messenger
            .send_text(&self.renderer.progress_notice(&content.fields()))
            .await?;
        cycle.advance(CycleState::TextSent)?;

        info!(record_id, term = %content.term, "Phase one complete");
        Ok(PhaseOneOutput {
            record_id,
            term: content.term,
            phonetic: content.phonetic,
            translation: content.translation,
            example_sentence: content.example_sentence,
        })
    }

    /// Produces the illustration and sends the consolidated message.
    ///
    /// Never fails. Any error ends in one minimal notice attempt; after that
    /// the outcome is only observable through logs and the channel.
    #[instrument(skip(self, job), fields(record_id = job.record_id))]
    pub async fn run_phase_two(&self, job: &PhaseOneOutput) -> PhaseTwoOutcome {
        let mut outcome = PhaseTwoOutcome::default();
        let mut cycle = CycleTracker::resume(job.record_id, CycleState::TextSent);

        match self.deliver_consolidated(job, &mut cycle, &mut outcome).await {
            Ok(()) => {
                info!(delivered = ?outcome.delivered, "Phase two complete");
            }
            Err(e) => {
                error!(error = %e, state = %cycle.state(), "Phase two failed, sending minimal notice");
                let notice = self.renderer.minimal_notice(&job.term, &job.translation);
                match self.messenger.send_text(&notice).await {
                    Ok(()) => outcome.delivered = DeliveryKind::MinimalFallback,
                    Err(e) => {
                        error!(error = %e, "Minimal notice failed, nothing delivered");
                        outcome.delivered = DeliveryKind::Nothing;
                    }
                }
            }
        }
        outcome
    }

    async fn deliver_consolidated(
        &self,
        job: &PhaseOneOutput,
        cycle: &mut CycleTracker,
        outcome: &mut PhaseTwoOutcome,
    ) -> Result<()> {
        let image = self
            .images
            .synthesize(&job.term, &job.phonetic, &job.translation)
            .await;
        cycle.advance(CycleState::ImageAttempted)?;

        let caption = self.renderer.full_caption(&job.fields());
        match image {
            ImageOutcome::Image(result) => {
                let location = result.location.to_string_lossy().into_owned();
                self.store
                    .update_flashcard_image(job.record_id, &location, &result.prompt_used)?;
                outcome.image_location = Some(location);
                outcome.model_used = Some(result.model_used.clone());

                let upload = PhotoUpload {
                    file_name: result.file_name(),
                    mime_type: result.format.mime_type().to_string(),
                    bytes: result.bytes,
                };
                self.messenger.send_photo(upload, &caption).await?;
                outcome.delivered = DeliveryKind::Photo;
            }
            ImageOutcome::NoImage { reason, .. } => {
                warn!(%reason, "Sending caption without an illustration");
                self.messenger.send_text(&caption).await?;
                outcome.delivered = DeliveryKind::Text;
            }
        }

        cycle.advance(CycleState::Complete)?;
        Ok(())
    }

    /// Runs phase one then phase two in-process.
    pub async fn run_cycle_inline(&self) -> Result<CycleReport> {
        let flashcard = self.run_phase_one().await?;
        let phase_two = self.run_phase_two(&flashcard).await;
        Ok(CycleReport {
            flashcard,
            phase_two,
        })
    }
}
