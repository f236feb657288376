//! API route handlers
//!
//! The transport surface around the supervisor core:
//! - `GET /alive` — liveness report intake from the external probe
//! - `POST /api/v1/command` — manual command intake
//! - `GET /api/v1/status` — fleet snapshot for dashboards
//! - `GET /health` — process liveness for infrastructure probes

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::warn;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::command::{Command, CommandError};
use crate::registry::SharedRegistry;
use crate::types::AccountSnapshot;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Current registry generation
    pub registry: SharedRegistry,
}

// ============================================================================
// Liveness Intake
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AliveParams {
    pub account: Option<String>,
}

/// `GET /alive?account=NAME`
///
/// Idempotent: the probe retries freely. Returns immediately regardless of
/// what recovery orchestration the report triggered. Plain text on purpose —
/// the probe side is a dumb HTTP GET.
pub async fn report_alive(
    State(state): State<ApiState>,
    Query(params): Query<AliveParams>,
) -> Response {
    let Some(name) = params.account.filter(|n| !n.is_empty()) else {
        warn!("liveness report without an account name");
        return (StatusCode::NOT_FOUND, "account is required").into_response();
    };

    let registry = state.registry.load_full();
    let entry = match registry.get(&name) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(account = %name, "liveness report for unknown account");
            return (StatusCode::NOT_FOUND, e.to_string()).into_response();
        }
    };

    entry.lock().await.report_alive();
    (StatusCode::OK, "OK").into_response()
}

// ============================================================================
// Command Intake
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Command token — canonical name or any recognized alias
    pub command: String,
    /// Target account name, or "all" for broadcast-capable commands
    pub account: String,
    /// Optional payload (e.g. `name=value` for set-param)
    #[serde(default)]
    pub value: Option<String>,
}

/// `POST /api/v1/command`
pub async fn submit_command(
    State(state): State<ApiState>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let command: Command = match req.command.parse() {
        Ok(c) => c,
        Err(e) => {
            warn!(command = %req.command, "rejected unknown command");
            return ApiErrorResponse::bad_request(e.to_string());
        }
    };

    let registry = state.registry.load_full();
    match crate::command::dispatch(&registry, command, &req.account, req.value.as_deref()).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "command": command.canonical(),
            "account": req.account,
            "accepted": true,
        })),
        Err(e @ CommandError::UnknownAccount(_)) => {
            warn!(account = %req.account, "rejected command for unknown account");
            ApiErrorResponse::not_found(e.to_string())
        }
        Err(e) => {
            warn!(error = %e, "rejected command");
            ApiErrorResponse::bad_request(e.to_string())
        }
    }
}

// ============================================================================
// Status Snapshot
// ============================================================================

/// `GET /api/v1/status`
pub async fn fleet_status(State(state): State<ApiState>) -> Response {
    let registry = state.registry.load_full();
    let mut snapshots: Vec<AccountSnapshot> = Vec::with_capacity(registry.len());
    for entry in registry.accounts() {
        snapshots.push(entry.lock().await.snapshot());
    }
    ApiResponse::ok(serde_json::json!({
        "registry_version": registry.version(),
        "accounts": snapshots,
    }))
}

// ============================================================================
// Health
// ============================================================================

/// `GET /health` — supervisor process liveness.
pub async fn health(State(state): State<ApiState>) -> Response {
    let registry = state.registry.load_full();
    ApiResponse::ok(serde_json::json!({
        "status": "ok",
        "accounts": registry.len(),
    }))
}
