//!
//! docportal HTTP server
//! ---------------------
//! Axum-based JSON API for the document portal. All routes live under `/api`.
//!
//! Responsibilities:
//! - Cookie sessions issued by the `identity` layer.
//! - Account endpoints (login, register, logout, me, admin profile) in `auth_routes`.
//! - Document endpoints (list, upload, batch upload, preview, download, delete) in
//!   `document_routes`; multipart staging lives in `upload`, streaming in `content`.
//! - Startup: folder report, backend warm-up, bootstrap admin, periodic sweeps.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::PortalConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{LocalAuthProvider, SessionIdentity, SessionManager, SessionToken};
use crate::phone::normalize_phone;
use crate::storage::staging::StagingArea;
use crate::storage::{ensure_bootstrap_admin, StorageHandle};

pub mod auth_routes;
pub mod document_routes;
mod content;
mod upload;

pub const SESSION_COOKIE: &str = "docportal_session";

// Multipart framing and text fields on top of the file bytes.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageHandle,
    pub sessions: SessionManager,
    pub auth: Arc<LocalAuthProvider>,
    pub staging: Arc<StagingArea>,
    pub config: Arc<PortalConfig>,
}

impl AppState {
    pub fn new(config: PortalConfig, storage: StorageHandle) -> anyhow::Result<Self> {
        let staging = StagingArea::new(config.staging_dir())
            .with_context(|| format!("While creating staging dir: {}", config.staging_dir().display()))?;
        let sessions = SessionManager::new(config.session_ttl);
        let auth = LocalAuthProvider::new(storage.clone(), sessions.clone());
        Ok(Self {
            storage,
            sessions,
            auth: Arc::new(auth),
            staging: Arc::new(staging),
            config: Arc::new(config),
        })
    }
}

/// Build the full router. Upload routes get body limits sized from the config.
pub fn router(state: AppState) -> Router {
    let per_file = usize::try_from(state.config.max_upload_bytes).unwrap_or(usize::MAX);
    let upload_limit = per_file.saturating_add(MULTIPART_OVERHEAD);
    let batch_limit = per_file
        .saturating_mul(state.config.max_batch_files)
        .saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(auth_routes::login))
        .route("/auth/register", post(auth_routes::register))
        .route("/auth/logout", post(auth_routes::logout))
        .route("/auth/me", get(auth_routes::me))
        .route("/clients", get(auth_routes::clients))
        .route("/admin/profile", patch(auth_routes::update_profile))
        .route("/documents", get(document_routes::list_documents))
        .route(
            "/documents/upload",
            post(document_routes::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/documents/batch-upload",
            post(document_routes::batch_upload).layer(DefaultBodyLimit::max(batch_limit)),
        )
        .route("/documents/{id}", axum::routing::delete(document_routes::delete_document))
        .route("/documents/{id}/preview", get(document_routes::preview))
        .route("/documents/{id}/download", get(document_routes::download));

    Router::new().nest("/api", api).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let storage = state.storage.get().await;
    Json(json!({"status": "ok", "backend": storage.backend_name()}))
}

fn log_startup_folders(config: &PortalConfig) {
    let cwd = std::env::current_dir().ok();
    let exe = std::env::current_exe().ok();
    let data_env = std::env::var("DOCPORTAL_DATA_DIR").ok();
    info!(
        target: "startup",
        "docportal starting. Folder configuration: cwd={:?}, exe={:?}, data_dir={:?}, DOCPORTAL_DATA_DIR_env={:?}",
        cwd, exe, config.data_dir, data_env
    );
    info!(
        target: "startup",
        "Path existence: data_dir_exists={}, blobs_exists={}, staging_exists={}",
        config.data_dir.exists(), config.blob_dir().exists(), config.staging_dir().exists()
    );
    info!(
        target: "startup",
        "Limits: max_upload_bytes={}, max_batch_files={}, session_ttl_secs={}, cookie_secure={}, database_configured={}",
        config.max_upload_bytes,
        config.max_batch_files,
        config.session_ttl.as_secs(),
        config.cookie_secure,
        config.database_url.is_some()
    );
}

async fn seed_admin(state: &AppState) -> anyhow::Result<()> {
    let Some(admin) = state.config.bootstrap_admin.clone() else {
        debug!(target: "startup", "no bootstrap admin configured");
        return Ok(());
    };
    let phone = match normalize_phone(&admin.phone_number) {
        Ok(p) => p,
        Err(e) => {
            warn!(target: "startup", "bootstrap admin phone '{}' rejected: {}", admin.phone_number, e);
            return Ok(());
        }
    };
    let storage = state.storage.get().await;
    ensure_bootstrap_admin(&storage, &phone, &admin.password, admin.name.as_deref())
        .await
        .with_context(|| format!("While seeding bootstrap admin {}", phone))?;
    Ok(())
}

/// Staging sweeps walk the directory with blocking fs calls; keep them off the runtime.
async fn sweep_staging(staging: &Arc<StagingArea>, max_age: Duration) -> usize {
    let staging = staging.clone();
    match tokio::task::spawn_blocking(move || staging.sweep_stale(max_age)).await {
        Ok(n) => n,
        Err(e) => {
            warn!(target: "docportal::ingest", "staging sweep task failed: {}", e);
            0
        }
    }
}

fn spawn_sweeper(state: &AppState) {
    let sessions = state.sessions.clone();
    let staging = state.staging.clone();
    let max_age = state.config.staging_max_age;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SWEEP_INTERVAL).await;
            let expired = sessions.sweep_expired();
            if expired > 0 { debug!(target: "docportal::session", expired = expired, "session_sweep"); }
            let stale = sweep_staging(&staging, max_age).await;
            if stale > 0 { info!(target: "docportal::ingest", removed = stale, "removed stale staged uploads"); }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(target: "startup", "failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!(target: "startup", "shutdown requested");
}

/// Start the HTTP server with the given configuration and serve until Ctrl-C.
pub async fn run_with_config(config: PortalConfig) -> anyhow::Result<()> {
    log_startup_folders(&config);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create or access data dir: {}", config.data_dir.display()))?;
    let http_port = config.http_port;
    let storage = StorageHandle::lazy(config.backend_settings());
    let state = AppState::new(config, storage)?;

    let swept = sweep_staging(&state.staging, Duration::ZERO).await;
    if swept > 0 {
        info!(target: "startup", "removed {} staged uploads left from a previous run", swept);
    }

    // Select the backend now rather than on the first request.
    let backend = state.storage.get().await;
    info!(target: "startup", "storage backend: {}", backend.backend_name());
    seed_admin(&state).await?;
    spawn_sweeper(&state);

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!(target: "startup", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

/// Convenience entry point using configuration from the environment only.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(PortalConfig::from_env()).await
}

pub(crate) fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all("cookie").iter() {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some(eq) = p.find('=') {
                let (k, v) = p.split_at(eq);
                if k == name { return Some(v[1..].to_string()); }
            }
        }
    }
    None
}

pub(crate) fn set_session_cookie(token: &str, config: &PortalConfig) -> AppResult<HeaderValue> {
    let secure = if config.cookie_secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}={}; Max-Age={}; HttpOnly; SameSite=Lax; Path=/{}",
        SESSION_COOKIE,
        token,
        config.session_ttl.as_secs(),
        secure
    ))
    .map_err(|e| AppError::internal("cookie_error", e.to_string()))
}

pub(crate) fn clear_session_cookie(config: &PortalConfig) -> HeaderValue {
    let secure = if config.cookie_secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Lax; Path=/{}",
        SESSION_COOKIE, secure
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("docportal_session=deleted; Max-Age=0; Path=/"))
}

/// The caller's live session, or 401.
pub(crate) fn require_session(state: &AppState, headers: &HeaderMap) -> AppResult<(SessionToken, SessionIdentity)> {
    let token = parse_cookie(headers, SESSION_COOKIE)
        .ok_or_else(|| AppError::auth("not_authenticated", "Not authenticated"))?;
    let who = state
        .sessions
        .validate(&token)
        .ok_or_else(|| AppError::auth("session_expired", "Not authenticated"))?;
    Ok((token, who))
}

/// Turn axum's JSON rejection into the API's error shape.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    match payload {
        Ok(Json(v)) => Ok(v),
        Err(rej) => Err(AppError::validation("invalid_input", format!("Invalid input: {}", rej.body_text()))),
    }
}
