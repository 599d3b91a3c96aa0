//! Liveness endpoint.

use axum::Json;

use crate::models::StatusResponse;

/// `GET /status` — liveness probe with the running version.
pub async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: goalpro_core::version().to_string(),
    })
}
