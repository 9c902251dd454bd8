//! HTTP trigger surface.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `POST /flashcards/generate-now` - Run phase one now, queue phase two
//! - `GET /api/cron` - Same as `generate-now`, for schedulers that only GET
//! - `GET /flashcards?limit=N` - Most recent flashcard records
//! - `GET /diagnostics` - Component self-checks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use flashcast_core::{create_router, AppState, Config, DeliveryOrchestrator, PhaseTwoQueue};
//! use flashcast_messaging::{TelegramMessenger, TelegramOptions};
//! use flashcast_store::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let store = Arc::new(SqliteStore::open(&config.db_path)?);
//! let messenger = Arc::new(TelegramMessenger::new(TelegramOptions::new(None, None))?);
//! let orchestrator = Arc::new(DeliveryOrchestrator::from_config(&config, store, messenger)?);
//! let queue = Arc::new(PhaseTwoQueue::start(Arc::clone(&orchestrator)));
//!
//! let router = create_router(AppState::new(config, orchestrator, queue));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use flashcast_store::FlashcardRecord;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::config::Config;
use crate::diagnostics::{run_diagnostics, DiagnosticsReport};
use crate::error::FlashcastError;
use crate::orchestrator::{DeliveryOrchestrator, PhaseOneOutput};
use crate::worker::PhaseTwoQueue;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
}

/// Response body for a successful trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Always `"success"`.
    pub status: String,
    /// The phase-one hand-off; phase two has been queued.
    pub flashcard: PhaseOneOutput,
}

/// Query string for the list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// Maximum number of records, clamped to `1..=1000`.
    pub limit: Option<usize>,
}

/// Response body for the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    /// Records, newest first.
    pub items: Vec<FlashcardRecord>,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration the pipeline was built from.
    pub config: Arc<Config>,
    /// The pipeline.
    pub orchestrator: Arc<DeliveryOrchestrator>,
    /// Where phase-two jobs are queued.
    pub queue: Arc<PhaseTwoQueue>,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub fn new(
        config: Config,
        orchestrator: Arc<DeliveryOrchestrator>,
        queue: Arc<PhaseTwoQueue>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            queue,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
struct ApiError(FlashcastError);

impl From<FlashcastError> for ApiError {
    fn from(err: FlashcastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FlashcastError::Delivery(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints, CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/flashcards/generate-now", post(handle_generate))
        .route("/api/cron", get(handle_generate))
        .route("/flashcards", get(handle_list))
        .route("/diagnostics", get(handle_diagnostics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Handler for `POST /flashcards/generate-now` and `GET /api/cron`.
///
/// Phase two is queued and its outcome is not reported here; it surfaces
/// only through the channel and the logs.
async fn handle_generate(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let flashcard = state.orchestrator.run_phase_one().await.map_err(|e| {
        error!(error = %e, "Phase one failed");
        ApiError(e)
    })?;

    state.queue.submit(flashcard.clone());
    info!(record_id = flashcard.record_id, "Flashcard triggered");

    Ok(Json(GenerateResponse {
        status: "success".to_string(),
        flashcard,
    }))
}

/// Handler for `GET /flashcards`.
async fn handle_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let items = state
        .orchestrator
        .store()
        .list_flashcards(limit)
        .map_err(FlashcastError::from)?;
    Ok(Json(ListResponse { items }))
}

/// Handler for `GET /diagnostics`.
async fn handle_diagnostics(State(state): State<Arc<AppState>>) -> Json<DiagnosticsReport> {
    let orchestrator = &state.orchestrator;
    let report = run_diagnostics(
        &state.config,
        orchestrator.store(),
        orchestrator.content().generator(),
        orchestrator.messenger(),
    )
    .await;
    Json(report)
}
