//! decksync-ingest library interface
//!
//! Tournament and decklist ingestion: source client, parsers, card resolver,
//! sync orchestrator and SQLite persistence, plus the HTTP trigger surface.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::models::SyncRunResult;
use crate::services::SyncOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub orchestrator: Arc<SyncOrchestrator>,
    /// Cancellation token of the run in progress; `None` when idle
    pub active_run: Arc<Mutex<Option<CancellationToken>>>,
    /// Result (or partial result) of the most recent run
    pub last_result: Arc<RwLock<Option<SyncRunResult>>>,
    /// Bearer token required by the trigger endpoints, if configured
    pub trigger_token: Option<String>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last fatal error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, orchestrator: Arc<SyncOrchestrator>, trigger_token: Option<String>) -> Self {
        Self {
            db,
            orchestrator,
            active_run: Arc::new(Mutex::new(None)),
            last_result: Arc::new(RwLock::new(None)),
            trigger_token: trigger_token.filter(|t| !t.is_empty()),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// True while a sync run holds the active slot
    pub fn sync_running(&self) -> bool {
        self.active_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::sync_routes())
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
