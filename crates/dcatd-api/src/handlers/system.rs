//! `/system/health`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::warn;

use dcatd_core::logging;

use crate::state::AppState;

pub const HEALTHY: &str = "dcatd systemhealth is OK";

/// 200 when every plugin reports healthy, else 503 with the first problem.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let problems = state.hooks.health_check().await;
    match problems.into_iter().next() {
        None => (StatusCode::OK, HEALTHY.to_string()),
        Some(problem) => {
            warn!(
                subsystem = logging::SUBSYSTEM_API,
                component = "health",
                error = %problem,
                "Health check failed"
            );
            (StatusCode::SERVICE_UNAVAILABLE, problem)
        }
    }
}
