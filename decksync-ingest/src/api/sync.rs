//! Sync trigger API handlers
//!
//! POST /sync/run, POST /sync/cancel, GET /sync/last

use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ApiError, ApiResult},
    models::{SyncParameters, SyncRunResult},
    services::SyncFailure,
    AppState,
};

/// POST /sync/cancel response
#[derive(Debug, Serialize)]
pub struct CancelSyncResponse {
    pub cancelled: bool,
    pub cancelled_at: DateTime<Utc>,
}

/// Holds the single active-run slot; frees it when dropped
struct ActiveRunGuard {
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl ActiveRunGuard {
    /// Claim the slot, or `None` when a run is already active
    fn claim(slot: &Arc<Mutex<Option<CancellationToken>>>) -> Option<(Self, CancellationToken)> {
        let mut active = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if active.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Some((Self { slot: slot.clone() }, token))
    }
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        let mut active = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = None;
    }
}

/// Check `Authorization: Bearer <token>` when a trigger token is configured
fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.trigger_token.as_deref() else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("invalid trigger token".to_string())),
        None => Err(ApiError::Unauthorized("missing bearer token".to_string())),
    }
}

/// Overlay the JSON object in `body` onto `defaults`; an empty body keeps the defaults
pub fn parameters_from_body(defaults: &SyncParameters, body: &[u8]) -> ApiResult<SyncParameters> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(defaults.clone());
    }

    let overrides: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid sync parameters: {}", e)))?;
    let Value::Object(overrides) = overrides else {
        return Err(ApiError::BadRequest(
            "sync parameters must be a JSON object".to_string(),
        ));
    };

    let mut merged = serde_json::to_value(defaults)
        .map_err(|e| ApiError::Internal(format!("failed to encode defaults: {}", e)))?;
    if let Value::Object(base) = &mut merged {
        base.extend(overrides);
    }

    serde_json::from_value(merged)
        .map_err(|e| ApiError::BadRequest(format!("invalid sync parameters: {}", e)))
}

async fn record_outcome(state: &AppState, outcome: &Result<SyncRunResult, SyncFailure>) {
    let (result, error) = match outcome {
        Ok(result) => (result.clone(), None),
        Err(failure) => (failure.partial.clone(), Some(failure.error.to_string())),
    };

    *state.last_result.write().await = Some(result);
    if error.is_some() {
        *state.last_error.write().await = error;
    }
}

/// POST /sync/run
///
/// Runs one sync to completion and returns its result. The optional JSON body
/// overrides individual [`SyncParameters`]. 409 while another run is active,
/// 503 with the partial result when the run fails.
pub async fn run_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SyncRunResult>> {
    authorize(&state, &headers)?;
    let params = parameters_from_body(state.orchestrator.defaults(), &body)?;

    let (guard, token) = ActiveRunGuard::claim(&state.active_run)
        .ok_or_else(|| ApiError::Conflict("a sync run is already in progress".to_string()))?;

    // The run continues even if the caller disconnects
    let task_state = state.clone();
    let handle = tokio::spawn(async move {
        let _guard = guard;
        let outcome = task_state.orchestrator.run(params, token).await;
        record_outcome(&task_state, &outcome).await;
        outcome
    });

    let outcome = handle
        .await
        .map_err(|e| ApiError::Internal(format!("sync task ended abnormally: {}", e)))?;

    Ok(Json(outcome?))
}

/// POST /sync/cancel
///
/// Stops the active run from starting new fetches; the run still returns its
/// partial result to its own caller.
pub async fn cancel_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<CancelSyncResponse>> {
    authorize(&state, &headers)?;

    let token = state
        .active_run
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone();

    match token {
        Some(token) => {
            token.cancel();
            tracing::info!("Sync run cancellation requested");
            Ok(Json(CancelSyncResponse {
                cancelled: true,
                cancelled_at: Utc::now(),
            }))
        }
        None => Err(ApiError::NotFound("no sync run in progress".to_string())),
    }
}

/// GET /sync/last
pub async fn last_sync(State(state): State<AppState>) -> ApiResult<Json<SyncRunResult>> {
    state
        .last_result
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no sync run has finished yet".to_string()))
}

/// Build sync routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/run", post(run_sync))
        .route("/sync/cancel", post(cancel_sync))
        .route("/sync/last", get(last_sync))
}
