//! Configuration types for the Flashcast pipeline.
//!
//! A [`Config`] is built once at process start (file, then environment
//! overlay) and handed by reference to each component's constructor.

use std::path::Path;

use flashcast_messaging::DEFAULT_TITLE;
use flashcast_store::Tier;
use serde::{Deserialize, Serialize};

use crate::error::{FlashcastError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "flashcast.json";

/// Default prompt template for illustrations.
///
/// `{term}`, `{phonetic}` and `{translation}` are substituted.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Create a clean, friendly educational flashcard \
illustration for a beginner language learner. Draw a simple picture that represents the term, \
and render ALL of the following text legibly inside the image, exactly as written:\n\
Term: {term}\n\
Pronunciation: {phonetic}\n\
Translation: {translation}\n\
Use a single solid off-white background with no gradients, patterns or scenery.";

fn default_db_path() -> String {
    "flashcards.db".to_string()
}

fn default_terms_file() -> String {
    "data/beginner_terms.json".to_string()
}

fn default_images_dir() -> String {
    "generated_images".to_string()
}

fn default_card_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Text calls must fit well inside the trigger's request budget.
const fn default_text_timeout() -> u64 {
    5
}

const fn default_temperature() -> f32 {
    0.3
}

fn default_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

const fn default_image_timeout() -> u64 {
    120
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

fn default_telegram_base() -> String {
    "https://api.telegram.org".to_string()
}

const fn default_telegram_timeout() -> u64 {
    20
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path of the SQLite database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// JSON seed collection consumed once at bootstrap.
    #[serde(default = "default_terms_file")]
    pub terms_file: String,

    /// Tier drawn from on every cycle.
    #[serde(default)]
    pub tier: Tier,

    /// Directory where illustrations are written.
    #[serde(default = "default_images_dir")]
    pub images_dir: String,

    /// Heading used on every outbound notice.
    #[serde(default = "default_card_title")]
    pub card_title: String,

    /// Text generation settings.
    #[serde(default)]
    pub text: TextConfig,

    /// Image generation settings.
    #[serde(default)]
    pub image: ImageConfig,

    /// Telegram delivery settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// HTTP trigger surface settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            terms_file: default_terms_file(),
            tier: Tier::default(),
            images_dir: default_images_dir(),
            card_title: default_card_title(),
            text: TextConfig::default(),
            image: ImageConfig::default(),
            telegram: TelegramConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `flashcast.json`; returns defaults if it is absent.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            FlashcastError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `flashcast.json` from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the (validated) default configuration.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(FlashcastError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| FlashcastError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays values from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Overlays values from an environment lookup.
    ///
    /// Each value keeps only its first line, trimmed; empty values are
    /// treated as unset. `OPENAI_API_KEY` configures both text and image
    /// generation.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).as_deref().and_then(first_line);

        if let Some(v) = get("DB_PATH") {
            self.db_path = v;
        }
        if let Some(v) = get("BEGINNER_TERMS_FILE") {
            self.terms_file = v;
        }
        if let Some(v) = get("IMAGES_DIR") {
            self.images_dir = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.text.api_key = Some(v.clone());
            self.image.api_key = Some(v);
        }
        if let Some(v) = get("IMAGE_MODEL") {
            self.image.model = v;
        }
        if let Some(v) = get("IMAGE_SIZE") {
            self.image.size = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(FlashcastError::config_validation(
                "dbPath must not be empty",
                "Set dbPath in flashcast.json or DB_PATH in the environment",
            ));
        }

        if self.images_dir.trim().is_empty() {
            return Err(FlashcastError::config_validation(
                "imagesDir must not be empty",
                "Set imagesDir to a writable directory (e.g. 'generated_images')",
            ));
        }

        if self.text.timeout_secs == 0 {
            return Err(FlashcastError::config_validation(
                "text.timeoutSecs must be greater than 0",
                "Set text.timeoutSecs to a few seconds in flashcast.json",
            ));
        }

        if self.image.timeout_secs == 0 {
            return Err(FlashcastError::config_validation(
                "image.timeoutSecs must be greater than 0",
                "Set image.timeoutSecs to at least 1 second in flashcast.json",
            ));
        }

        if self.telegram.timeout_secs == 0 {
            return Err(FlashcastError::config_validation(
                "telegram.timeoutSecs must be greater than 0",
                "Set telegram.timeoutSecs to at least 1 second in flashcast.json",
            ));
        }

        if parse_size(&self.image.size).is_none() {
            return Err(FlashcastError::config_validation(
                format!("image.size '{}' is not of the form WIDTHxHEIGHT", self.image.size),
                "Use a size such as '1024x1024'",
            ));
        }

        if !self.image.prompt_template.contains("{term}") {
            return Err(FlashcastError::config_validation(
                "image.promptTemplate must contain the {term} placeholder",
                "Include {term}, {phonetic} and {translation} in the template",
            ));
        }

        Ok(())
    }
}

/// Text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfig {
    /// API key; text generation is disabled when absent.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Chat model name.
    #[serde(default = "default_text_model")]
    pub model: String,

    /// Request timeout in seconds. No retries are made.
    #[serde(default = "default_text_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base(),
            model: default_text_model(),
            timeout_secs: default_text_timeout(),
            temperature: default_temperature(),
        }
    }
}

/// Image generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// API key; image generation is disabled when absent.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Primary image model.
    #[serde(default = "default_image_model")]
    pub model: String,

    /// Requested image size, `WIDTHxHEIGHT`.
    #[serde(default = "default_image_size")]
    pub size: String,

    /// Request timeout in seconds.
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,

    /// Prompt template with `{term}`, `{phonetic}` and `{translation}`.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base(),
            model: default_image_model(),
            size: default_image_size(),
            timeout_secs: default_image_timeout(),
            prompt_template: default_prompt_template(),
        }
    }
}

/// Telegram delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token.
    #[serde(default, skip_serializing)]
    pub bot_token: Option<String>,

    /// Destination chat id.
    #[serde(default)]
    pub chat_id: Option<String>,

    /// Bot API base URL.
    #[serde(default = "default_telegram_base")]
    pub api_base: String,

    /// Request timeout in seconds.
    #[serde(default = "default_telegram_timeout")]
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: default_telegram_base(),
            timeout_secs: default_telegram_timeout(),
        }
    }
}

/// HTTP trigger surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Keeps only the first line of a value, trimmed.
fn first_line(value: &str) -> Option<String> {
    value
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

/// Parses `WIDTHxHEIGHT`.
pub(crate) fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.trim().split_once('x')?;
    let w = w.parse::<u32>().ok().filter(|w| *w > 0)?;
    let h = h.parse::<u32>().ok().filter(|h| *h > 0)?;
    Some((w, h))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.db_path, "flashcards.db");
        assert_eq!(config.terms_file, "data/beginner_terms.json");
        assert_eq!(config.tier, Tier::Beginner);
        assert_eq!(config.images_dir, "generated_images");
        assert_eq!(config.text.model, "gpt-4o-mini");
        assert_eq!(config.text.timeout_secs, 5);
        assert_eq!(config.image.model, "gpt-image-1");
        assert_eq!(config.image.size, "1024x1024");
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
        assert_eq!(config.server.port, 3000);
        assert!(config.text.api_key.is_none());
        assert!(config.telegram.bot_token.is_none());
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "dbPath": "/tmp/cards.db",
            "tier": "Beginner",
            "text": { "model": "gpt-4.1-mini", "timeoutSecs": 3 },
            "image": { "size": "512x512" },
            "telegram": { "chatId": "-100123" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.db_path, "/tmp/cards.db");
        assert_eq!(config.text.model, "gpt-4.1-mini");
        assert_eq!(config.text.timeout_secs, 3);
        assert_eq!(config.image.size, "512x512");
        assert_eq!(config.telegram.chat_id.as_deref(), Some("-100123"));
        // Defaults fill the rest
        assert_eq!(config.image.model, "gpt-image-1");
        assert_eq!(config.text.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = Config::default();
        config.text.api_key = Some("sk-secret".to_string());
        config.telegram.bot_token = Some("123:abc".to_string());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(!json.contains("123:abc"));
    }

    #[test]
    fn test_invalid_tier_error() {
        let result: std::result::Result<Config, _> = serde_json::from_str(r#"{"tier": "expert"}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("invalid tier"));
        assert!(err.contains("expert"));
    }

    #[test]
    fn test_apply_env_overrides_and_trims() {
        let vars = env(&[
            ("OPENAI_API_KEY", "sk-abc\nsk-accidental-second-line"),
            ("TELEGRAM_BOT_TOKEN", "  123:abc  "),
            ("TELEGRAM_CHAT_ID", "42"),
            ("IMAGE_MODEL", "gpt-image-2"),
            ("DB_PATH", "/tmp/data/flashcards.db"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned());

        assert_eq!(config.text.api_key.as_deref(), Some("sk-abc"));
        assert_eq!(config.image.api_key.as_deref(), Some("sk-abc"));
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.telegram.chat_id.as_deref(), Some("42"));
        assert_eq!(config.image.model, "gpt-image-2");
        assert_eq!(config.db_path, "/tmp/data/flashcards.db");
    }

    #[test]
    fn test_apply_env_ignores_empty_values() {
        let vars = env(&[("OPENAI_API_KEY", "   "), ("IMAGE_SIZE", "")]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned());

        assert!(config.text.api_key.is_none());
        assert_eq!(config.image.size, "1024x1024");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024x1024"), Some((1024, 1024)));
        assert_eq!(parse_size("1792x1024"), Some((1792, 1024)));
        assert_eq!(parse_size("1024"), None);
        assert_eq!(parse_size("0x512"), None);
        assert_eq!(parse_size("axb"), None);
    }

    #[test]
    fn test_config_validation_bad_size() {
        let mut config = Config::default();
        config.image.size = "large".to_string();

        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, FlashcastError::ConfigValidationError { message, .. } if message.contains("image.size")),
            "Expected ConfigValidationError about image.size, got: {err:?}"
        );
    }

    #[test]
    fn test_config_validation_zero_text_timeout() {
        let mut config = Config::default();
        config.text.timeout_secs = 0;

        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, FlashcastError::ConfigValidationError { message, suggestion }
                if message.contains("text.timeoutSecs") && suggestion.contains("text.timeoutSecs")),
            "Expected ConfigValidationError about text.timeoutSecs, got: {err:?}"
        );
    }

    #[test]
    fn test_config_validation_template_needs_term() {
        let mut config = Config::default();
        config.image.prompt_template = "Draw something nice".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_paths() {
        let config = Config {
            db_path: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            images_dir: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_file_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("flashcast.json");
        std::fs::write(&config_path, r#"{"imagesDir": "/tmp/images", "server": {"port": 8080}}"#)
            .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.images_dir, "/tmp/images");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");

        let from_dir = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(from_dir.images_dir, "/tmp/images");
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("flashcast.json");
        std::fs::write(&config_path, "{ not valid json }").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, FlashcastError::ConfigParseError { path, message } if *path == config_path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(&PathBuf::from("/nonexistent/flashcast.json")).unwrap();
        assert_eq!(config.db_path, "flashcards.db");
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("flashcast.json");
        std::fs::write(&config_path, r#"{"image": {"timeoutSecs": 0}}"#).unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, FlashcastError::ConfigValidationError { .. }),
            "Expected ConfigValidationError, got: {err:?}"
        );
    }
}
