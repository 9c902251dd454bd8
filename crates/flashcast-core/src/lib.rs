//! Flashcast Core
//!
//! The daily flashcard pipeline: term rotation, content and illustration
//! synthesis, the two-phase delivery orchestrator, the phase-two worker and
//! the HTTP trigger surface.

pub mod api;
pub mod config;
pub mod content;
pub mod cycle;
pub mod diagnostics;
pub mod error;
pub mod image;
pub mod orchestrator;
pub mod provider;
pub mod terms;
pub mod worker;

pub use api::{
    create_router, AppState, ErrorResponse, GenerateResponse, HealthResponse, ListQuery,
    ListResponse,
};
pub use config::{Config, ImageConfig, ServerConfig, TelegramConfig, TextConfig};
pub use content::{ContentOutcome, ContentSynthesizer, LinguisticContent};
pub use cycle::{CycleState, CycleTracker, Transition};
pub use diagnostics::{
    run_diagnostics, CheckResult, CheckStatus, DiagnosticsChecks, DiagnosticsReport,
    EnvironmentReport,
};
pub use error::{Capability, FlashcastError, ProviderError, ProviderErrorKind, Result};
pub use image::{
    image_file_name, slugify, ImageFormat, ImageOutcome, ImageResult, ImageSynthesizer,
    FALLBACK_IMAGE_MODEL,
};
pub use orchestrator::{
    CycleReport, DeliveryKind, DeliveryOrchestrator, PhaseOneOutput, PhaseTwoOutcome,
};
pub use provider::{
    ImageGenerator, ImagePayload, ImageRequest, OpenAiImageGenerator, OpenAiTextGenerator,
    TextGenerator,
};
pub use terms::{load_seed_file, SeedOutcome, SeedTerm, TermStore};
pub use worker::PhaseTwoQueue;
