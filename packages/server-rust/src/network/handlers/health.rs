//! Liveness and readiness endpoints for orchestrators.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::LifecycleState;

/// `GET /healthz`: 200 once the runtime is listening (including while it
/// drains), 503 before that. The body reports lifecycle state, in-flight
/// calls, and uptime.
pub async fn healthz_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let lifecycle = state.shutdown.state();
    let status = match lifecycle {
        LifecycleState::Listening | LifecycleState::Draining => StatusCode::OK,
        LifecycleState::Created | LifecycleState::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(json!({
            "state": lifecycle.as_str(),
            "in_flight": state.shutdown.in_flight_count(),
            "uptime_secs": state.start_time.elapsed().as_secs(),
        })),
    )
}

/// `GET /readyz`: 200 only while listening and every backend probe
/// succeeds within its timeout; 503 otherwise, including while draining.
///
/// Probes run on every request. The body names each probe and whether it
/// passed; failure detail goes to the log only.
pub async fn readyz_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let lifecycle = state.shutdown.state();
    let report = state.ready.check().await;
    let ready = lifecycle == LifecycleState::Listening && report.ready;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "state": lifecycle.as_str(),
            "ready": ready,
            "probes": report.probes,
        })),
    )
}
