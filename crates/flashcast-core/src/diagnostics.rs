//! Component self-checks.
//!
//! Each collaborator is exercised once and reported as success, skipped or
//! failed. The report itself never fails.

use flashcast_messaging::Messenger;
use flashcast_store::CardStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::provider::TextGenerator;

const TEXT_PROBE: &str = "Say 'test successful' in Italian. Reply as JSON: {\"reply\": \"...\"}";
const MESSAGE_PROBE: &str = "🧪 Test message from Flashcast";

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The collaborator answered.
    Success,
    /// The collaborator is not configured.
    Skipped,
    /// The collaborator returned an error.
    Failed,
}

/// One check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Outcome.
    pub status: CheckStatus,
    /// Detail on success, reason when skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Error text when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn success(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Success,
            detail: Some(detail.into()),
            error: None,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skipped,
            detail: Some(reason.into()),
            error: None,
        }
    }

    fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            status: CheckStatus::Failed,
            detail: None,
            error: Some(error.to_string()),
        }
    }
}

/// Which settings are present. Secrets are reported as booleans only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentReport {
    /// Database path.
    pub db_path: String,
    /// Illustration output directory.
    pub images_dir: String,
    /// Tier drawn from.
    pub tier: String,
    /// Whether a text generation key is set.
    pub has_text_key: bool,
    /// Whether an image generation key is set.
    pub has_image_key: bool,
    /// Whether a Telegram bot token is set.
    pub has_telegram_token: bool,
    /// Whether a Telegram chat id is set.
    pub has_telegram_chat_id: bool,
}

/// Per-collaborator checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsChecks {
    /// Store reachability and term count.
    pub database: CheckResult,
    /// One tiny text generation call.
    pub text_generation: CheckResult,
    /// One test message.
    pub messaging: CheckResult,
}

/// Full diagnostics output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    /// Configuration summary.
    pub environment: EnvironmentReport,
    /// Check results.
    pub tests: DiagnosticsChecks,
}

/// Runs every check in order: database, text generation, messaging.
///
/// Messaging is skipped unless both a bot token and a chat id are set, so
/// running diagnostics against an unconfigured channel sends nothing.
pub async fn run_diagnostics(
    config: &Config,
    store: &dyn CardStore,
    text: Option<&dyn TextGenerator>,
    messenger: &dyn Messenger,
) -> DiagnosticsReport {
    let environment = EnvironmentReport {
        db_path: config.db_path.clone(),
        images_dir: config.images_dir.clone(),
        tier: config.tier.to_string(),
        has_text_key: config.text.api_key.is_some(),
        has_image_key: config.image.api_key.is_some(),
        has_telegram_token: config.telegram.bot_token.is_some(),
        has_telegram_chat_id: config.telegram.chat_id.is_some(),
    };

    let database = match store.count_terms() {
        Ok(count) => CheckResult::success(format!("{count} terms in pool")),
        Err(e) => CheckResult::failed(e),
    };

    let text_generation = match text {
        None => CheckResult::skipped("No API key configured"),
        Some(generator) => match generator.generate(TEXT_PROBE, "Return only valid JSON.").await {
            Ok(reply) => CheckResult::success(reply),
            Err(e) => CheckResult::failed(e),
        },
    };

    let messaging = if environment.has_telegram_token && environment.has_telegram_chat_id {
        match messenger.send_text(MESSAGE_PROBE).await {
            Ok(()) => CheckResult::success(format!("Test message sent via {}", messenger.channel())),
            Err(e) => CheckResult::failed(e),
        }
    } else {
        CheckResult::skipped("Messaging channel not configured")
    };

    info!(
        database = ?database.status,
        text_generation = ?text_generation.status,
        messaging = ?messaging.status,
        "Diagnostics complete"
    );

    DiagnosticsReport {
        environment,
        tests: DiagnosticsChecks {
            database,
            text_generation,
            messaging,
        },
    }
}
