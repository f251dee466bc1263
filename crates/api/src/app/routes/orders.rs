use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use settle_orders::{Cart, Order, OrderId, OrderStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/payments", post(record_payment))
        .route("/:id/payments/processing", post(begin_payment_processing))
        .route("/:id/payments/processing/abort", post(abort_payment_processing))
        .route("/:id/returns", post(record_return))
        .route("/:id/void", post(void_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/credit-note", get(credit_note))
}

fn order_response(status: StatusCode, order: &Order) -> axum::response::Response {
    (status, Json(dto::order_to_json(order))).into_response()
}

/// Map a service result onto `200 OK` with the order body.
fn respond(result: Result<Order, settle_infra::SettlementError>) -> axum::response::Response {
    match result {
        Ok(order) => order_response(StatusCode::OK, &order),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

/// POST /orders - Price a cart and place the order
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(cart): Json<Cart>,
) -> axum::response::Response {
    match services.settlement.build_order(cart) {
        Ok(order) => order_response(StatusCode::CREATED, &order),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

/// GET /orders?status=&from=&to=
pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::OrdersQuery>,
) -> axum::response::Response {
    let status = match q.status.as_deref().map(str::parse::<OrderStatus>).transpose() {
        Ok(s) => s,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, e.code(), e.to_string()),
    };
    let range = match dto::date_range(q.from, q.to) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let items = services.settlement.list_orders(status, range);
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(services.settlement.get_order(order_id))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordPaymentRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(services.settlement.apply_payment(
        order_id,
        body.payment,
        dto::expected_version(body.expected_version),
    ))
}

pub async fn begin_payment_processing(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<dto::VersionRequest>>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    respond(
        services
            .settlement
            .begin_payment_processing(order_id, dto::expected_version(body.expected_version)),
    )
}

pub async fn abort_payment_processing(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Option<Json<dto::VersionRequest>>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = body.map(|Json(b)| b).unwrap_or_default();
    respond(
        services
            .settlement
            .abort_payment_processing(order_id, dto::expected_version(body.expected_version)),
    )
}

pub async fn record_return(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReturnRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(services.settlement.process_return(
        order_id,
        body.items,
        body.branch_id,
        dto::expected_version(body.expected_version),
    ))
}

pub async fn void_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(services.settlement.void_order(
        order_id,
        &body.reason,
        dto::expected_version(body.expected_version),
    ))
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(services.settlement.cancel_order(
        order_id,
        &body.reason,
        dto::expected_version(body.expected_version),
    ))
}

pub async fn credit_note(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.settlement.credit_note(order_id) {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}
