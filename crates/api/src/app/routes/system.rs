use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /ready - Queue depth, for operators and probes.
pub async fn ready(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.settlement.job_stats() {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "jobs_pending": stats.pending + stats.failed,
                "jobs_dead_lettered": stats.dead_lettered,
            })),
        )
            .into_response(),
        Err(e) => crate::app::errors::settlement_error_to_response(e),
    }
}
