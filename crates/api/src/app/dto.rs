use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::Deserialize;

use settle_core::{AggregateRoot, BranchId, DateRange, ExpectedVersion, ProductId};
use settle_infra::reports::{FinancialInput, Liquidation};
use settle_orders::{Order, PaymentDraft, ReturnItem};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Optimistic-concurrency token shared by every mutation body.
///
/// Omitted means "whatever the current version is".
#[derive(Debug, Default, Deserialize)]
pub struct VersionRequest {
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    #[serde(flatten)]
    pub payment: PaymentDraft,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnRequest {
    pub items: Vec<ReturnItem>,
    /// Branch receiving the units; the order's branch when omitted.
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DailyQuery {
    /// Defaults to today (UTC).
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct MonthlyQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Deserialize)]
pub struct FinancialRequest {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(flatten)]
    pub input: FinancialInput,
}

#[derive(Debug, Deserialize)]
pub struct ClosureRequest {
    pub year: i32,
    pub month: u32,
    pub liquidations: Vec<Liquidation>,
}

#[derive(Debug, Deserialize)]
pub struct StockLevelRequest {
    pub branch_id: BranchId,
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub fn expected_version(v: Option<u64>) -> ExpectedVersion {
    v.map_or(ExpectedVersion::Any, ExpectedVersion::Exact)
}

/// Inclusive range from optional bounds; open ends are unbounded.
pub fn date_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<DateRange, axum::response::Response> {
    DateRange::new(from.unwrap_or(NaiveDate::MIN), to.unwrap_or(NaiveDate::MAX))
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, e.code(), e.to_string()))
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn order_to_json(order: &Order) -> serde_json::Value {
    serde_json::json!({
        "id": order.id_typed().to_string(),
        "order_number": order.order_number(),
        "status": order.status(),
        "version": order.version(),
        "customer": order.customer(),
        "branch_id": order.branch_id(),
        "lines": order.lines().iter().map(|l| serde_json::json!({
            "line_no": l.line_no,
            "product_id": l.product_id().to_string(),
            "name": l.product.name,
            "quantity": l.quantity,
            "unit_price": l.unit_price(),
            "discount": l.discount_amount,
            "coupon_share": l.coupon_share,
            "tax": l.tax,
            "total": l.line_total(),
        })).collect::<Vec<_>>(),
        "coupon": order.coupon(),
        "totals": order.totals(),
        "payments": order.payments(),
        "returns": order.returns(),
        "amount_paid": order.amount_paid_total(),
        "balance_due": order.balance_due(),
        "overpayment": order.overpayment(),
        "fiscal": order.fiscal_identifiers(),
        "created_at": order.created_at().to_rfc3339(),
        "completed_at": order.completed_at().map(|d| d.to_rfc3339()),
        "voided_at": order.voided_at().map(|d| d.to_rfc3339()),
        "void_reason": order.void_reason(),
        "cancelled_at": order.cancelled_at().map(|d| d.to_rfc3339()),
        "cancel_reason": order.cancel_reason(),
    })
}
