//! End-to-end tests for the flashcard pipeline
//!
//! Each test builds the production pipeline from a [`Config`] against an
//! on-disk database, with the OpenAI and Telegram endpoints served by
//! wiremock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flashcast_core::{
    load_seed_file, Config, DeliveryKind, DeliveryOrchestrator, FlashcastError, SeedTerm,
    TermStore, FALLBACK_IMAGE_MODEL,
};
use flashcast_messaging::{TelegramMessenger, TelegramOptions};
use flashcast_store::{CardStore, SqliteStore, Tier};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOT_TOKEN: &str = "123:abc";

/// A PNG signature followed by padding, enough for format sniffing.
const PNG_BYTES: [u8; 16] = [
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

/// Path to the fixtures directory.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Config pointing every collaborator at the mock server and the temp dir.
fn mock_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config {
        db_path: dir.join("flashcards.db").to_string_lossy().into_owned(),
        images_dir: dir.join("images").to_string_lossy().into_owned(),
        ..Config::default()
    };
    config.text.api_key = Some("sk-test".to_string());
    config.text.base_url = format!("{}/v1", server.uri());
    config.image.api_key = Some("sk-test".to_string());
    config.image.base_url = format!("{}/v1", server.uri());
    config.telegram.bot_token = Some(BOT_TOKEN.to_string());
    config.telegram.chat_id = Some("42".to_string());
    config.telegram.api_base = server.uri();
    config.validate().expect("mock config should validate");
    config
}

/// Builds the production orchestrator for a config.
fn pipeline(config: &Config) -> (Arc<SqliteStore>, DeliveryOrchestrator) {
    let store = Arc::new(SqliteStore::open(&config.db_path).expect("Failed to open store"));
    let options = TelegramOptions::new(
        config.telegram.bot_token.clone(),
        config.telegram.chat_id.clone(),
    )
    .with_api_base(config.telegram.api_base.clone());
    let messenger = Arc::new(TelegramMessenger::new(options).expect("Failed to build messenger"));
    let orchestrator = DeliveryOrchestrator::from_config(
        config,
        Arc::clone(&store) as Arc<dyn CardStore>,
        messenger,
    )
    .expect("Failed to build orchestrator");
    (store, orchestrator)
}

fn chat_reply(content: &serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "content": content.to_string() } }]
    }))
}

async fn mount_telegram(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendPhoto")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, endpoint: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .expect("request recording is enabled")
        .into_iter()
        .filter(|r| r.url.path() == endpoint)
        .collect()
}

/// Tests that the sample config fixture loads and validates.
#[test]
fn test_sample_config_loads() {
    let config_path = fixture_path().join("flashcast.json");
    assert!(
        config_path.exists(),
        "Config fixture not found at: {config_path:?}"
    );

    let config = Config::load_from_file(&config_path).expect("Failed to load config");

    assert_eq!(config.db_path, "data/flashcards.db");
    assert_eq!(config.tier, Tier::Beginner);
    assert_eq!(config.text.model, "gpt-4o-mini");
    assert_eq!(config.text.timeout_secs, 5);
    assert_eq!(config.image.model, "gpt-image-1");
    assert_eq!(config.telegram.chat_id.as_deref(), Some("-1001234567890"));
    assert!(config.telegram.bot_token.is_none(), "secrets come from the environment");
    assert_eq!(config.server.port, 8080);
}

/// Tests that the seed fixture accepts both field spellings.
#[test]
fn test_seed_fixture_loads() {
    let seeds = load_seed_file(&fixture_path().join("beginner_terms.json"))
        .expect("Failed to load seed file");

    assert_eq!(seeds.len(), 4);
    assert_eq!(seeds[2], SeedTerm::new("buongiorno", "greetings"));
    assert_eq!(seeds[3].category, "general");
}

/// Tests one full cycle: generated text, a failing primary image model, the
/// fixed fallback model, and a single consolidated photo message.
#[tokio::test]
async fn test_full_cycle_falls_back_to_second_image_model() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = mock_config(&server, dir.path());

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(chat_reply(&json!({
            "phonetic": "CHOW",
            "translation": "hello / goodbye",
            "example_sentence": "Ciao, come stai?"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({ "model": "gpt-image-1" })))
        .respond_with(ResponseTemplate::new(400).set_body_string("model not available"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .and(body_partial_json(json!({ "model": FALLBACK_IMAGE_MODEL })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": format!("{}/files/card.png", server.uri()) }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/card.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES.to_vec()))
        .mount(&server)
        .await;
    mount_telegram(&server).await;

    let (store, orchestrator) = pipeline(&config);
    orchestrator
        .terms()
        .seed_if_empty(&[SeedTerm::new("ciao", "greetings")])
        .expect("Failed to seed");

    let report = orchestrator
        .run_cycle_inline()
        .await
        .expect("Cycle should succeed");

    assert_eq!(report.flashcard.term, "ciao");
    assert_eq!(report.flashcard.phonetic, "CHOW");
    assert_eq!(report.phase_two.delivered, DeliveryKind::Photo);
    assert_eq!(
        report.phase_two.model_used.as_deref(),
        Some(FALLBACK_IMAGE_MODEL)
    );

    let location = report
        .phase_two
        .image_location
        .expect("an illustration should be stored");
    assert!(location.ends_with(".png"), "unexpected location: {location}");
    let written = std::fs::read(&location).expect("illustration should exist on disk");
    assert_eq!(written, PNG_BYTES);

    let record = store
        .get_flashcard(report.flashcard.record_id)
        .expect("store read")
        .expect("record should exist");
    assert_eq!(record.image_location.as_deref(), Some(location.as_str()));
    assert!(record
        .prompt_used
        .as_deref()
        .is_some_and(|p| p.contains("Term: ciao")));
    assert_eq!(record.delivery_channel, "telegram");

    // One progress notice, one photo with the full caption, nothing else.
    let notices = requests_to(&server, &format!("/bot{BOT_TOKEN}/sendMessage")).await;
    let photos = requests_to(&server, &format!("/bot{BOT_TOKEN}/sendPhoto")).await;
    assert_eq!(notices.len(), 1);
    assert_eq!(photos.len(), 1);
    let notice: serde_json::Value =
        serde_json::from_slice(&notices[0].body).expect("notice is JSON");
    assert_eq!(notice["chat_id"], "42");
    assert!(notice["text"]
        .as_str()
        .is_some_and(|t| t.contains("ciao")));
    let upload = String::from_utf8_lossy(&photos[0].body);
    assert!(upload.contains("Ciao, come stai?"), "caption missing example");
}

/// Tests that a cycle without any generation keys still delivers the
/// sentinel caption as text.
#[tokio::test]
async fn test_cycle_without_generation_keys_sends_text() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = mock_config(&server, dir.path());
    config.text.api_key = None;
    config.image.api_key = None;
    mount_telegram(&server).await;

    let (store, orchestrator) = pipeline(&config);
    orchestrator
        .terms()
        .seed_if_empty(&[SeedTerm::new("grazie", "courtesy")])
        .expect("Failed to seed");

    let report = orchestrator
        .run_cycle_inline()
        .await
        .expect("Cycle should succeed");

    assert_eq!(report.flashcard.term, "grazie");
    assert_eq!(report.flashcard.translation, "Translation unavailable");
    assert_eq!(report.phase_two.delivered, DeliveryKind::Text);
    assert!(report.phase_two.image_location.is_none());

    let record = store
        .get_flashcard(report.flashcard.record_id)
        .expect("store read")
        .expect("record should exist");
    assert!(record.image_location.is_none());

    let messages = requests_to(&server, &format!("/bot{BOT_TOKEN}/sendMessage")).await;
    assert_eq!(messages.len(), 2, "progress notice then caption");
    assert!(requests_to(&server, &format!("/bot{BOT_TOKEN}/sendPhoto"))
        .await
        .is_empty());
    assert!(requests_to(&server, "/v1/chat/completions").await.is_empty());
}

/// Tests that a rejected photo upload degrades to the minimal notice.
#[tokio::test]
async fn test_rejected_photo_sends_minimal_notice() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = mock_config(&server, dir.path());

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(chat_reply(&json!({
            "phonetic": "AH-kwah",
            "translation": "water",
            "example": "Vorrei un bicchiere d'acqua."
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/images/generations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "b64_json": STANDARD.encode(PNG_BYTES) }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{BOT_TOKEN}/sendPhoto")))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: PHOTO_INVALID"))
        .mount(&server)
        .await;

    let (_store, orchestrator) = pipeline(&config);
    orchestrator
        .terms()
        .seed_if_empty(&[SeedTerm::new("acqua", "food")])
        .expect("Failed to seed");

    let report = orchestrator
        .run_cycle_inline()
        .await
        .expect("Phase one should succeed");

    assert_eq!(report.phase_two.delivered, DeliveryKind::MinimalFallback);
    assert_eq!(report.phase_two.model_used.as_deref(), Some("gpt-image-1"));

    let messages = requests_to(&server, &format!("/bot{BOT_TOKEN}/sendMessage")).await;
    assert_eq!(messages.len(), 2);
    let minimal: serde_json::Value =
        serde_json::from_slice(&messages[1].body).expect("notice is JSON");
    assert!(minimal["text"]
        .as_str()
        .is_some_and(|t| t.ends_with("acqua = water")));
}

/// Tests that the rotation survives a restart: used flags are persisted and
/// the pool recycles once every term has been drawn.
#[test]
fn test_rotation_persists_across_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("rotation.db");
    let seeds = [
        SeedTerm::new("ciao", "greetings"),
        SeedTerm::new("grazie", "courtesy"),
    ];

    {
        let store = Arc::new(SqliteStore::open(&db_path).expect("Failed to open store"));
        let terms = TermStore::new(store, Tier::Beginner);
        let outcome = terms.seed_if_empty(&seeds).expect("Failed to seed");
        assert_eq!(outcome.inserted, 2);
        assert_eq!(terms.next_term().expect("draw"), "ciao");
    }

    let store = Arc::new(SqliteStore::open(&db_path).expect("Failed to reopen store"));
    let terms = TermStore::new(Arc::clone(&store) as Arc<dyn CardStore>, Tier::Beginner);
    let outcome = terms.seed_if_empty(&seeds).expect("Failed to seed");
    assert_eq!(outcome.inserted, 0, "a populated pool is never reseeded");

    assert_eq!(terms.next_term().expect("draw"), "grazie");
    // Every term used: the tier resets and the first term comes round again.
    assert_eq!(terms.next_term().expect("draw"), "ciao");
    let unused = store
        .list_terms(Tier::Beginner, Some(false))
        .expect("list terms");
    assert_eq!(unused.len(), 1);
}

/// Tests that drawing from a tier with no terms reports exhaustion.
#[test]
fn test_empty_tier_is_exhausted() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(SqliteStore::open(dir.path().join("empty.db")).expect("open"));
    store
        .insert_term("ciao", "greetings", Tier::Beginner)
        .expect("insert");

    let terms = TermStore::new(store, Tier::Advanced);
    let err = terms.next_term().expect_err("advanced tier is empty");
    assert!(matches!(err, FlashcastError::PoolExhausted { tier: Tier::Advanced }));
}
