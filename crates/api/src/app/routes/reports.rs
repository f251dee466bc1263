use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use settle_core::DateRange;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/receivables", get(receivables))
        .route("/sales/daily", get(daily_sales))
        .route("/sales/monthly", get(monthly_sales))
        .route("/financial", post(financial_summary))
        .route("/closure", post(monthly_closure))
}

/// GET /reports/receivables?from=&to=
pub async fn receivables(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::RangeQuery>,
) -> axum::response::Response {
    match dto::date_range(q.from, q.to) {
        Ok(range) => (StatusCode::OK, Json(services.settlement.accounts_receivable(range))).into_response(),
        Err(resp) => resp,
    }
}

/// GET /reports/sales/daily?date=YYYY-MM-DD
pub async fn daily_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::DailyQuery>,
) -> axum::response::Response {
    let day = q.date.unwrap_or_else(|| Utc::now().date_naive());
    (StatusCode::OK, Json(services.settlement.daily_sales(day))).into_response()
}

/// GET /reports/sales/monthly?year=&month=
pub async fn monthly_sales(
    Extension(services): Extension<Arc<AppServices>>,
    Query(q): Query<dto::MonthlyQuery>,
) -> axum::response::Response {
    match services.settlement.monthly_sales(q.year, q.month) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

pub async fn financial_summary(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::FinancialRequest>,
) -> axum::response::Response {
    let range = match dto::date_range(body.from, body.to) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match services.settlement.financial_summary(range, &body.input) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}

pub async fn monthly_closure(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ClosureRequest>,
) -> axum::response::Response {
    let range = match DateRange::month(body.year, body.month) {
        Ok(r) => r,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, e.code(), e.to_string()),
    };
    match services.settlement.monthly_closure(range, &body.liquidations) {
        Ok(closure) => (StatusCode::OK, Json(closure)).into_response(),
        Err(e) => errors::settlement_error_to_response(e),
    }
}
