//! Operator routes: the collaborator retry queue, projection rebuilds, and
//! seeding the in-process collaborators.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use settle_infra::jobs::JobId;
use settle_orders::{CustomerSnapshot, ProductSnapshot};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

const DEFAULT_DEAD_LETTER_LIMIT: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/jobs/run", post(run_jobs))
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/dead-letters", get(list_dead_letters))
        .route("/jobs/dead-letters/:id/retry", post(retry_dead_letter))
        .route("/projections/rebuild", post(rebuild_projections))
        .route("/catalog/products", post(upsert_product))
        .route("/customers", post(upsert_customer))
        .route("/inventory/levels", put(set_stock_level))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /admin/jobs/run - Run every due collaborator job now
pub async fn run_jobs(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    // Collaborator calls block; keep them off the async workers.
    let result = tokio::task::spawn_blocking(move || services.settlement.run_collaborator_jobs()).await;
    match result {
        Ok(Ok(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(Err(e)) => errors::settlement_error_to_response(e),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string()),
    }
}

pub async fn job_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.settlement.job_stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

/// GET /admin/jobs/dead-letters?limit=
pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::LimitQuery>,
) -> axum::response::Response {
    let limit = q.limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT);
    match services.settlement.dead_letters(limit) {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

/// POST /admin/jobs/dead-letters/:id/retry - Requeue with a fresh attempt budget
pub async fn retry_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_id::<Uuid>(&id, "job") {
        Ok(v) => JobId(v),
        Err(resp) => return resp,
    };
    match services.settlement.retry_dead_letter(job_id) {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

pub async fn rebuild_projections(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.settlement.rebuild_projections() {
        Ok(events) => (
            StatusCode::OK,
            Json(serde_json::json!({ "events_replayed": events })),
        )
            .into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

pub async fn upsert_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(product): Json<ProductSnapshot>,
) -> axum::response::Response {
    let id = product.product_id;
    services.adapters.catalog.insert(product);
    (StatusCode::CREATED, Json(serde_json::json!({ "id": id.to_string() }))).into_response()
}

pub async fn upsert_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Json(customer): Json<CustomerSnapshot>,
) -> axum::response::Response {
    let id = customer.customer_id;
    services.adapters.customers.insert(customer);
    (StatusCode::CREATED, Json(serde_json::json!({ "id": id.to_string() }))).into_response()
}

pub async fn set_stock_level(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StockLevelRequest>,
) -> axum::response::Response {
    if body.quantity < 0 {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_quantity",
            "stock level must not be negative",
        );
    }
    services
        .adapters
        .inventory
        .set_level(body.branch_id, body.product_id, body.quantity);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "branch_id": body.branch_id.to_string(),
            "product_id": body.product_id.to_string(),
            "quantity": services.adapters.inventory.level(body.branch_id, body.product_id),
        })),
    )
        .into_response()
}
