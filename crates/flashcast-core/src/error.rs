//! Error types for the Flashcast pipeline.
//!
//! Errors are grouped by where they surface: configuration (fatal at
//! startup), the term pool (fatal to a cycle), generation providers
//! (degraded, never fatal), and delivery (surfaced to whichever phase
//! triggered it).

use std::path::PathBuf;

use flashcast_messaging::DeliveryError;
use flashcast_store::{StoreError, Tier};

/// A specialized `Result` type for Flashcast operations.
pub type Result<T> = std::result::Result<T, FlashcastError>;

/// Errors that can occur while running the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum FlashcastError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your flashcast.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Term Pool Errors
    // ========================================================================
    /// No term is available at the tier, even after recycling.
    #[error("No {tier} terms available\n\nSuggestion: Populate the terms file and run `flashcast seed`")]
    PoolExhausted {
        /// The tier that was drawn from.
        tier: Tier,
    },

    /// The seed collection could not be read.
    #[error("Failed to load seed terms from '{path}': {message}\n\nSuggestion: The terms file must be a JSON array of {{\"text\", \"category\"}} objects")]
    SeedFile {
        /// Path to the seed file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// A generation capability has no credentials configured.
    #[error("{capability} is not configured\n\nSuggestion: Set OPENAI_API_KEY to enable it")]
    CapabilityUnconfigured {
        /// Which capability is missing.
        capability: Capability,
    },

    /// A generation provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The messaging channel rejected or could not accept a message.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The persistence layer failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },
}

/// Generation capabilities that may be left unconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Structured text generation.
    TextGeneration,
    /// Image generation.
    ImageGeneration,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextGeneration => write!(f, "text generation"),
            Self::ImageGeneration => write!(f, "image generation"),
        }
    }
}

/// Categories of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Invalid or missing credentials.
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// The request exceeded its time budget.
    Timeout,
    /// Network connectivity issues.
    Network,
    /// The response could not be interpreted.
    InvalidResponse,
    /// Other unclassified errors, including rejected options.
    Other,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ProviderErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key",
            Self::RateLimit => "Wait and retry, or reduce request frequency",
            Self::Server => "Retry later; the provider may be experiencing issues",
            Self::Timeout => "Raise the timeout or try a faster model",
            Self::Network => "Check your network connection",
            Self::InvalidResponse => "Check that the model supports the requested output format",
            Self::Other => "Check the model name and request options",
        }
    }

    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            408 | 504 => Self::Timeout,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

/// A failed call to a generation provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider} error ({kind}): {message}\n\nSuggestion: {}", .kind.suggestion())]
pub struct ProviderError {
    /// Provider or model label.
    pub provider: String,
    /// Failure category.
    pub kind: ProviderErrorKind,
    /// Detail from the provider or transport.
    pub message: String,
}

impl ProviderError {
    /// Creates a new provider error.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Creates an error from a non-success HTTP response.
    #[must_use]
    pub fn from_status(provider: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::new(
            provider,
            ProviderErrorKind::from_status(status),
            format!("HTTP {status}: {}", body.into()),
        )
    }

    /// Creates an error from a transport failure.
    #[must_use]
    pub fn from_transport(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_connect() || err.is_request() {
            ProviderErrorKind::Network
        } else if err.is_decode() || err.is_body() {
            ProviderErrorKind::InvalidResponse
        } else {
            ProviderErrorKind::Other
        };
        Self::new(provider, kind, err.to_string())
    }

    /// Creates an `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, ProviderErrorKind::InvalidResponse, message)
    }
}

impl FlashcastError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `SeedFile` error.
    #[must_use]
    pub fn seed_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SeedFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error is transient and may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError {
                kind: ProviderErrorKind::RateLimit
                    | ProviderErrorKind::Server
                    | ProviderErrorKind::Timeout
                    | ProviderErrorKind::Network,
                ..
            })
        )
    }

    /// Returns `true` if this error should abort the current cycle or startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::PoolExhausted { .. }
                | Self::SeedFile { .. }
        )
    }
}
