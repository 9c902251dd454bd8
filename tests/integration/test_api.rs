//! HTTP trigger surface tests
//!
//! These tests bind the real router to an ephemeral port and drive it over
//! HTTP, with Telegram served by wiremock. No generation keys are set, so
//! cards carry sentinel content and go out as text.

use std::path::Path;
use std::sync::Arc;

use flashcast_core::{
    create_router, AppState, Config, DeliveryOrchestrator, ErrorResponse, GenerateResponse,
    HealthResponse, ListResponse, PhaseTwoQueue, SeedTerm,
};
use flashcast_messaging::{TelegramMessenger, TelegramOptions};
use flashcast_store::SqliteStore;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A running server plus the handles a test needs to inspect it.
struct TestServer {
    base: String,
    queue: Arc<PhaseTwoQueue>,
    _dir: TempDir,
}

fn test_config(telegram: &MockServer, dir: &Path) -> Config {
    let mut config = Config {
        db_path: dir.join("api.db").to_string_lossy().into_owned(),
        images_dir: dir.join("images").to_string_lossy().into_owned(),
        ..Config::default()
    };
    config.telegram.bot_token = Some("123:abc".to_string());
    config.telegram.chat_id = Some("42".to_string());
    config.telegram.api_base = telegram.uri();
    config
}

async fn spawn_server(telegram: &MockServer, seeds: &[SeedTerm]) -> TestServer {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(telegram, dir.path());

    let store = Arc::new(SqliteStore::open(&config.db_path).expect("Failed to open store"));
    let options = TelegramOptions::new(
        config.telegram.bot_token.clone(),
        config.telegram.chat_id.clone(),
    )
    .with_api_base(config.telegram.api_base.clone());
    let messenger = Arc::new(TelegramMessenger::new(options).expect("Failed to build messenger"));
    let orchestrator = Arc::new(
        DeliveryOrchestrator::from_config(&config, store, messenger)
            .expect("Failed to build orchestrator"),
    );
    orchestrator
        .terms()
        .seed_if_empty(seeds)
        .expect("Failed to seed");

    let queue = Arc::new(PhaseTwoQueue::start(Arc::clone(&orchestrator)));
    let router = create_router(AppState::new(config, orchestrator, Arc::clone(&queue)));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to read address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    TestServer {
        base: format!("http://{addr}"),
        queue,
        _dir: dir,
    }
}

async fn mount_send_message(telegram: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "ok": status == 200 })))
        .mount(telegram)
        .await;
}

/// Tests the liveness probe.
#[tokio::test]
async fn test_health_endpoint() {
    let telegram = MockServer::start().await;
    let server = spawn_server(&telegram, &[]).await;

    let response = reqwest::get(format!("{}/health", server.base))
        .await
        .expect("request failed");

    assert_eq!(response.status(), 200);
    let body: HealthResponse = response.json().await.expect("invalid body");
    assert_eq!(body.status, "ok");
}

/// Tests that a trigger returns after phase one and the queued phase two
/// delivers the caption.
#[tokio::test]
async fn test_generate_now_queues_phase_two() {
    let telegram = MockServer::start().await;
    mount_send_message(&telegram, 200).await;
    let server = spawn_server(&telegram, &[SeedTerm::new("ciao", "greetings")]).await;

    let response = reqwest::Client::new()
        .post(format!("{}/flashcards/generate-now", server.base))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 200);
    let body: GenerateResponse = response.json().await.expect("invalid body");
    assert_eq!(body.status, "success");
    assert_eq!(body.flashcard.term, "ciao");

    // Drain the worker so phase two has run.
    server.queue.shutdown().await;
    let sent = telegram
        .received_requests()
        .await
        .expect("request recording is enabled");
    assert_eq!(sent.len(), 2, "progress notice then caption");

    let listed: ListResponse = reqwest::get(format!("{}/flashcards?limit=5", server.base))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].id, body.flashcard.record_id);
}

/// Tests that the cron trigger behaves like generate-now.
#[tokio::test]
async fn test_cron_trigger() {
    let telegram = MockServer::start().await;
    mount_send_message(&telegram, 200).await;
    let server = spawn_server(
        &telegram,
        &[SeedTerm::new("ciao", "greetings"), SeedTerm::new("grazie", "courtesy")],
    )
    .await;

    let first: GenerateResponse = reqwest::get(format!("{}/api/cron", server.base))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    let second: GenerateResponse = reqwest::get(format!("{}/api/cron", server.base))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");

    assert_eq!(first.flashcard.term, "ciao");
    assert_eq!(second.flashcard.term, "grazie");
    server.queue.shutdown().await;
}

/// Tests that an empty pool is reported as a server error.
#[tokio::test]
async fn test_generate_with_empty_pool_fails() {
    let telegram = MockServer::start().await;
    let server = spawn_server(&telegram, &[]).await;

    let response = reqwest::Client::new()
        .post(format!("{}/flashcards/generate-now", server.base))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), 500);
    let body: ErrorResponse = response.json().await.expect("invalid body");
    assert!(body.error.contains("beginner"), "unexpected error: {}", body.error);
    assert!(telegram
        .received_requests()
        .await
        .expect("request recording is enabled")
        .is_empty());
}

/// Tests that a rejected progress notice is a gateway error and the record
/// is still stored.
#[tokio::test]
async fn test_rejected_notice_is_bad_gateway() {
    let telegram = MockServer::start().await;
    mount_send_message(&telegram, 403).await;
    let server = spawn_server(&telegram, &[SeedTerm::new("ciao", "greetings")]).await;

    let response = reqwest::Client::new()
        .post(format!("{}/flashcards/generate-now", server.base))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), 502);

    let listed: ListResponse = reqwest::get(format!("{}/flashcards", server.base))
        .await
        .expect("request failed")
        .json()
        .await
        .expect("invalid body");
    assert_eq!(listed.items.len(), 1);
    assert_eq!(listed.items[0].term, "ciao");
}
