//! Reader HTTP surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/items` | Cached items + last-refreshed timestamp; may trigger a background refresh |
//! | `GET`  | `/api/refresh` | Run a refresh now and wait for it |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `/api/items` never waits on a refresh: it asks the staleness monitor to
//! maybe start one, then reads whatever the store holds at that instant,
//! which may be a run in progress.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "internal", "message": "..." } }
//! ```
//!
//! `/api/refresh` uses its own status bodies: 200 `{"status":"ok", ...}`,
//! 409 `{"status":"busy"}`, 500 `{"status":"error", "message": ...}`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can read the cache from another origin.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use hotfeed_core::models::Item;

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::refresh::{RefreshOutcome, RefreshReport};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
}

/// Build the router. Separate from [`run_server`] so tests can drive it
/// without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/items", get(handle_items))
        .route("/api/refresh", get(handle_refresh))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is terminated.
///
/// Migrates the store once up front and starts the periodic staleness
/// check alongside the listener.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    pipeline.store.migrate_schema().await?;

    let ticker = pipeline
        .monitor
        .clone()
        .spawn_periodic(config.refresh.check_interval());

    let app = router(AppState { pipeline });
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "listening");

    let result = axum::serve(listener, app).await;
    ticker.abort();
    result?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/items ============

#[derive(Serialize)]
struct ItemsResponse {
    last_refreshed: i64,
    refreshing: bool,
    items: Vec<Item>,
}

async fn handle_items(State(state): State<AppState>) -> Result<Json<ItemsResponse>, AppError> {
    // fire-and-forget; the handle is dropped on purpose
    let _ = state.pipeline.monitor.maybe_trigger_refresh().await;

    let snapshot = state
        .pipeline
        .store
        .read_all()
        .await
        .map_err(|e| internal(format!("failed to read cache: {e}")))?;

    Ok(Json(ItemsResponse {
        last_refreshed: snapshot.last_refreshed,
        refreshing: state.pipeline.refresher.is_running(),
        items: snapshot.items,
    }))
}

// ============ GET /api/refresh ============

#[derive(Serialize)]
struct RefreshResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    report: Option<RefreshReport>,
}

async fn handle_refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshResponse>) {
    match state.pipeline.refresher.try_refresh().await {
        RefreshOutcome::Completed(report) => (
            StatusCode::OK,
            Json(RefreshResponse {
                status: "ok",
                message: None,
                report: Some(report),
            }),
        ),
        RefreshOutcome::Skipped => (
            StatusCode::CONFLICT,
            Json(RefreshResponse {
                status: "busy",
                message: Some("a refresh is already running".to_string()),
                report: None,
            }),
        ),
        RefreshOutcome::Failed(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(RefreshResponse {
                status: "error",
                message: Some(e.to_string()),
                report: None,
            }),
        ),
    }
}
