//! HTTP API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;

use crate::feed::{LedgerStats, ReservedLedger};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the engine is ready to take sessions.
    pub ready: Arc<std::sync::atomic::AtomicBool>,
    /// Tenant this instance serves.
    pub tenant_id: Arc<tokio::sync::RwLock<Option<String>>>,
    /// Reserved-balance view, once the feed is up.
    pub ledger: Arc<tokio::sync::RwLock<Option<Arc<ReservedLedger>>>>,
    /// Prometheus scrape handle, when the exporter is installed.
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new() -> Self {
        Self {
            ready: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            tenant_id: Arc::new(tokio::sync::RwLock::new(None)),
            ledger: Arc::new(tokio::sync::RwLock::new(None)),
            metrics_handle: None,
        }
    }

    /// Attach a Prometheus scrape handle.
    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready
            .store(ready, std::sync::atomic::Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
    /// Tenant served by this instance, if configured.
    pub tenant: Option<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Tenant served by this instance.
    pub tenant: Option<String>,
    /// Reserved-balance view stats, once the feed is up.
    pub ledger: Option<LedgerStats>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let tenant = state.tenant_id.read().await.clone();

    let response = ReadyResponse {
        ready: is_ready,
        tenant,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns engine status and ledger statistics.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let tenant = state.tenant_id.read().await.clone();
    let ledger = state.ledger.read().await;

    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        tenant,
        ledger: ledger.as_ref().map(|l| l.stats()),
    })
}

/// Prometheus scrape handler.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}
