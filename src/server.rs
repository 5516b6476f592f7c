//! HTTP server exposing sessions, presence logs and attendance computation.
//!
//! # Architecture
//!
//! ```text
//! BLE observer ──→ POST /presence-logs ──→ store
//! Faculty UI   ──→ POST /attendance/compute/:id ──→ engine ──→ store
//!                                                      ↓
//!                                                  audit log
//! ```

use crate::audit::{create_shared_log, create_shared_log_with_persistence, AuditStats, SharedAuditLog};
use crate::core::{AttendanceRecord, EngineConfig, Session, Sighting};
use crate::config::ConfigError;
use crate::engine::AttendanceEngine;
use crate::error::{AttendanceError, StoreError, ValidationError};
use crate::store::{MemoryStore, RecordMode, RecordSink, SessionStore, SightingStore};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Signal strength recorded when an observer omits one.
pub const DEFAULT_SIGNAL_STRENGTH: i32 = -50;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Directory for the store snapshot and audit log; in-memory only if unset
    pub data_path: Option<PathBuf>,
    /// Record handling on recomputation
    pub record_mode: RecordMode,
    /// Engine parameters
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Create an in-memory server configuration on localhost.
    pub fn new(port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            data_path: None,
            record_mode: RecordMode::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Build a server configuration from the service configuration.
    pub fn from_config(config: &crate::Config) -> Result<Self, ConfigError> {
        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            data_path: Some(config.data_path.clone()),
            record_mode: config.record_mode,
            engine: config.engine_config()?,
        })
    }
}

/// Shared server state
pub struct ServerState {
    store: Arc<MemoryStore>,
    engine: AttendanceEngine,
    audit: SharedAuditLog,
}

impl ServerState {
    /// Create new server state, loading persisted data if configured.
    pub fn new(config: &ServerConfig) -> Result<Self, StoreError> {
        let (store, audit) = match &config.data_path {
            Some(dir) => (
                MemoryStore::with_persistence(dir.join("store.json"), config.record_mode)?,
                create_shared_log_with_persistence(dir.join("audit.json")),
            ),
            None => (MemoryStore::new(config.record_mode), create_shared_log()),
        };
        let store = Arc::new(store);
        let engine = AttendanceEngine::new(store.clone(), store.clone(), store.clone(), config.engine);

        Ok(Self {
            store,
            engine,
            audit,
        })
    }
}

/// Request body for creating or replacing a session
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRequest {
    /// Session id; generated if omitted on create
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub required_presence_fraction: f64,
}

/// Request body for logging a beacon sighting
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceLogRequest {
    pub session_id: String,
    pub device_identifier: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub rssi: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub message: String,
    pub session: Session,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceLogResponse {
    pub message: String,
    pub log: Sighting,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComputeResponse {
    pub message: String,
    pub records: Vec<AttendanceRecord>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn store_failure(e: StoreError) -> ApiError {
    match e {
        StoreError::Rejected(e) => invalid(e),
        StoreError::Conflict(id) => api_error(
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Session already exists: {id}"),
        ),
        e => {
            tracing::error!("Store operation failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e.to_string())
        }
    }
}

fn invalid(e: ValidationError) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
}

fn session_not_found(id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "NOT_FOUND", format!("Session not found: {id}"))
}

fn attendance_failure(e: AttendanceError) -> ApiError {
    let status = match &e {
        AttendanceError::Validation(_) => StatusCode::BAD_REQUEST,
        AttendanceError::NotFound { .. } => StatusCode::NOT_FOUND,
        AttendanceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.code(), e.to_string())
}

/// Run store work on the blocking pool; persistence does file IO under the store lock.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("Store task panicked: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Store operation failed",
        )
    })?
}

fn build_session(id: String, body: SessionRequest) -> Result<Session, ApiError> {
    let session = Session {
        id,
        course_id: body.course_id,
        window_start: body.window_start,
        window_end: body.window_end,
        required_presence_fraction: body.required_presence_fraction,
    };
    session.validate().map_err(invalid)?;
    Ok(session)
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// POST /sessions
async fn create_session(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<SessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let id = body
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session = build_session(id, body)?;

    let store = state.store.clone();
    let stored = session.clone();
    blocking(move || store.insert_session(stored).map_err(store_failure)).await?;
    state.audit.record_session_written();
    tracing::info!(session_id = %session.id, "Session created");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            message: "Session created".to_string(),
            session,
        }),
    ))
}

/// GET /sessions
async fn list_sessions(State(state): State<Arc<ServerState>>) -> Result<Json<Vec<Session>>, ApiError> {
    let store = state.store.clone();
    let sessions = blocking(move || store.list_sessions().map_err(store_failure)).await?;
    Ok(Json(sessions))
}

/// GET /sessions/:id
async fn get_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let store = state.store.clone();
    blocking(move || {
        store
            .get_session(&id)
            .map_err(store_failure)?
            .map(Json)
            .ok_or_else(|| session_not_found(&id))
    })
    .await
}

/// PUT /sessions/:id
async fn update_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Json(body): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = build_session(id, body)?;

    let store = state.store.clone();
    let stored = session.clone();
    blocking(move || {
        if store.get_session(&stored.id).map_err(store_failure)?.is_none() {
            return Err(session_not_found(&stored.id));
        }
        store.upsert_session(stored).map_err(store_failure)
    })
    .await?;
    state.audit.record_session_written();
    tracing::info!(session_id = %session.id, "Session updated");

    Ok(Json(SessionResponse {
        message: "Session updated".to_string(),
        session,
    }))
}

/// POST /presence-logs
///
/// Accepts a single beacon sighting from an observer.
async fn log_presence(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<PresenceLogRequest>,
) -> Result<(StatusCode, Json<PresenceLogResponse>), ApiError> {
    if body.device_identifier.trim().is_empty() {
        return Err(invalid(ValidationError::EmptyDeviceId));
    }

    let sighting = Sighting::new(body.device_identifier, body.timestamp)
        .with_signal_strength(body.rssi.unwrap_or(DEFAULT_SIGNAL_STRENGTH));
    let store = state.store.clone();
    let session_id = body.session_id;
    let stored = sighting.clone();
    blocking(move || {
        if store.get_session(&session_id).map_err(store_failure)?.is_none() {
            return Err(session_not_found(&session_id));
        }
        store.record_sighting(&session_id, stored).map_err(store_failure)
    })
    .await?;
    state.audit.record_sighting();

    Ok((
        StatusCode::CREATED,
        Json(PresenceLogResponse {
            message: "Presence logged".to_string(),
            log: sighting,
        }),
    ))
}

/// GET /presence-logs/:session_id
async fn list_presence_logs(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Sighting>>, ApiError> {
    let store = state.store.clone();
    let mut sightings =
        blocking(move || store.sightings_for_session(&session_id).map_err(store_failure)).await?;
    sightings.sort_by_key(|s| s.observed_at);
    Ok(Json(sightings))
}

/// POST /attendance/compute/:session_id
async fn compute_attendance(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ComputeResponse>, ApiError> {
    let engine = state.engine.clone();
    let id = session_id.clone();
    let result = tokio::task::spawn_blocking(move || engine.compute(&id))
        .await
        .map_err(|e| {
            tracing::error!("Attendance computation panicked: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Attendance computation failed",
            )
        })?;

    match result {
        Ok(records) => {
            state.audit.record_computation(&records);
            Ok(Json(ComputeResponse {
                message: "Attendance computed".to_string(),
                records,
            }))
        }
        Err(e) => {
            state.audit.record_failed_computation();
            tracing::warn!(session_id = %session_id, "Attendance computation failed: {}", e);
            Err(attendance_failure(e))
        }
    }
}

/// GET /attendance/:session_id
async fn get_attendance(
    State(state): State<Arc<ServerState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let store = state.store.clone();
    let records =
        blocking(move || store.records_for_session(&session_id).map_err(store_failure)).await?;
    Ok(Json(records))
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<AuditStats> {
    Json(state.audit.stats())
}

/// Build the application router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).put(update_session))
        .route("/presence-logs", post(log_presence))
        .route("/presence-logs/:session_id", get(list_presence_logs))
        .route("/attendance/compute/:session_id", post(compute_attendance))
        .route("/attendance/:session_id", get(get_attendance))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn bind(config: &ServerConfig) -> anyhow::Result<(TcpListener, Router, SharedAuditLog)> {
    let state = Arc::new(ServerState::new(config)?);
    let audit = state.audit.clone();
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    Ok((listener, router(state), audit))
}

async fn serve_on<F>(
    listener: TcpListener,
    app: Router,
    audit: SharedAuditLog,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Server shutdown signal received");
        })
        .await?;

    if let Err(e) = audit.save() {
        tracing::warn!("Failed to save audit log: {}", e);
    }
    Ok(())
}

/// Serve in the foreground until `shutdown` resolves.
pub async fn serve<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (listener, app, audit) = bind(&config).await?;
    tracing::info!("Attendance server listening on http://{}", listener.local_addr()?);
    serve_on(listener, app, audit, shutdown).await
}

/// Run the HTTP server in the background.
///
/// Returns the bound address and a sender that stops the server.
pub async fn run(config: ServerConfig) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let (listener, app, audit) = bind(&config).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Attendance server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = serve_on(listener, app, audit, shutdown).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
