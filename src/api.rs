// Polarity Timeline - HTTP API
// Axum router over the shared SQLite connection

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::db::{list_entities, submit_vote, Entity, StoreError, VoteOutcome};
use crate::layout::{effective_score, layout_entities, LayoutConfig, PositionedEntity, Viewport};
use crate::vote::VoteScore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub layout: LayoutConfig,
}

impl AppState {
    pub fn new(conn: Connection, layout: LayoutConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            layout,
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db.lock().map_err(|_| {
            error!("database mutex poisoned");
            ApiError::Internal("database unavailable".to_string())
        })
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Unavailable(_) => {
                error!("store error: {}", err);
                ApiError::Internal("store unavailable".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ApiResponse::<()>::failed(message))).into_response()
    }
}

/// POST body for a vote
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    /// Fraction in [0, 1]
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct LayoutQuery {
    /// When given, each pin also carries its absolute `y_px`
    pub viewport_height: Option<f64>,
}

/// Positioned entity as sent to the page
#[derive(Serialize)]
pub struct PinResponse {
    #[serde(flatten)]
    pin: PositionedEntity,
    #[serde(skip_serializing_if = "Option::is_none")]
    y_px: Option<f64>,
    /// Clamped score the pin was placed by
    effective_score: f64,
    display_image: String,
    display_reason: String,
}

impl PinResponse {
    fn new(pin: PositionedEntity, viewport: Option<&Viewport>) -> Self {
        Self {
            y_px: viewport.map(|v| pin.y_px(v)),
            effective_score: effective_score(pin.entity.score),
            display_image: pin.entity.display_image().to_string(),
            display_reason: pin.entity.display_reason().to_string(),
            pin,
        }
    }
}

#[derive(Serialize)]
pub struct LayoutResponse {
    config: LayoutConfig,
    pins: Vec<PinResponse>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/entities - All entities, unordered
async fn get_entities(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Entity>>>, ApiError> {
    let conn = state.conn()?;
    let entities = list_entities(&conn)?;
    Ok(Json(ApiResponse::ok(entities)))
}

/// GET /api/layout - Entities with their timeline positions
async fn get_layout(
    State(state): State<AppState>,
    Query(query): Query<LayoutQuery>,
) -> Result<Json<ApiResponse<LayoutResponse>>, ApiError> {
    let viewport = match query.viewport_height {
        Some(h) if h.is_finite() && h > 0.0 => Some(Viewport::new(0.0, h)),
        Some(h) => return Err(ApiError::BadRequest(format!("invalid viewport_height {}", h))),
        None => None,
    };

    let entities = {
        let conn = state.conn()?;
        list_entities(&conn)?
    };

    let pins = layout_entities(&entities, &state.layout)
        .into_iter()
        .map(|pin| PinResponse::new(pin, viewport.as_ref()))
        .collect();

    Ok(Json(ApiResponse::ok(LayoutResponse {
        config: state.layout,
        pins,
    })))
}

/// POST /api/entities/:id/vote - Fold a vote into the running average
async fn post_vote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<VoteOutcome>>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(%id, "malformed vote body: {}", rejection.body_text());
        ApiError::BadRequest(rejection.body_text())
    })?;
    let vote = VoteScore::new(request.score).map_err(|e| {
        warn!(%id, "rejected vote: {}", e);
        ApiError::BadRequest(e.to_string())
    })?;

    let conn = state.conn()?;
    let outcome = submit_vote(&conn, &id, vote)?;
    info!(%id, score = outcome.score, count = outcome.count, "vote recorded");

    Ok(Json(ApiResponse::ok(outcome)))
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Router
// ============================================================================

/// API routes only (no page, no static files)
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/entities", get(get_entities))
        .route("/entities/:id/vote", post(post_vote))
        .route("/layout", get(get_layout))
        .with_state(state)
}

/// Full application: page, API under /api, static files
pub fn app(state: AppState, static_dir: PathBuf) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_router(state))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
}
