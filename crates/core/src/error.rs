//! Domain error model.

use thiserror::Error;

use crate::id::ProductId;
use crate::money::Currency;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// How a caller should react to a [`DomainError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad input; rejected before any mutation, retry after correcting it.
    Validation,
    /// The order can no longer accept this action (stale view of its status).
    State,
    /// Transient version conflict; re-read and retry.
    Concurrency,
}

/// Domain-level error.
///
/// Deterministic business failures only. Collaborator and storage failures
/// belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("order has no line items")]
    EmptyOrder,

    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i64 },

    #[error("invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error(
        "return of {requested} units of product {product_id} exceeds the {remaining} still returnable"
    )]
    ReturnExceedsPurchased {
        product_id: ProductId,
        requested: i64,
        remaining: i64,
    },

    #[error("nothing to return")]
    NothingToReturn,

    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    #[error("order in status '{status}' cannot accept payments")]
    OrderNotPayable { status: &'static str },

    #[error("order in status '{status}' cannot be voided")]
    OrderNotVoidable { status: &'static str },

    #[error("illegal status transition from '{from}' on {trigger}")]
    IllegalStatusTransition {
        from: &'static str,
        trigger: &'static str,
    },

    #[error("fiscal identifiers rejected: {0}")]
    FiscalAssignmentRejected(String),

    #[error("not found")]
    NotFound,

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),
}

impl DomainError {
    pub fn invalid_discount(msg: impl Into<String>) -> Self {
        Self::InvalidDiscount(msg.into())
    }

    pub fn invalid_price(msg: impl Into<String>) -> Self {
        Self::InvalidPrice(msg.into())
    }

    pub fn invalid_payment(msg: impl Into<String>) -> Self {
        Self::InvalidPayment(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_period(msg: impl Into<String>) -> Self {
        Self::InvalidPeriod(msg.into())
    }

    pub fn concurrent_modification(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            DomainError::EmptyOrder
            | DomainError::InvalidQuantity { .. }
            | DomainError::InvalidDiscount(_)
            | DomainError::InvalidPrice(_)
            | DomainError::InvalidPayment(_)
            | DomainError::ReturnExceedsPurchased { .. }
            | DomainError::NothingToReturn
            | DomainError::CurrencyMismatch { .. }
            | DomainError::InvalidId(_)
            | DomainError::InvalidPeriod(_) => ErrorClass::Validation,
            DomainError::OrderNotPayable { .. }
            | DomainError::OrderNotVoidable { .. }
            | DomainError::IllegalStatusTransition { .. }
            | DomainError::FiscalAssignmentRejected(_)
            | DomainError::NotFound => ErrorClass::State,
            DomainError::ConcurrentModification(_) => ErrorClass::Concurrency,
        }
    }

    /// Stable machine-readable code, used by the HTTP layer.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::EmptyOrder => "empty_order",
            DomainError::InvalidQuantity { .. } => "invalid_quantity",
            DomainError::InvalidDiscount(_) => "invalid_discount",
            DomainError::InvalidPrice(_) => "invalid_price",
            DomainError::InvalidPayment(_) => "invalid_payment",
            DomainError::ReturnExceedsPurchased { .. } => "return_exceeds_purchased",
            DomainError::NothingToReturn => "nothing_to_return",
            DomainError::CurrencyMismatch { .. } => "currency_mismatch",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::InvalidPeriod(_) => "invalid_period",
            DomainError::OrderNotPayable { .. } => "order_not_payable",
            DomainError::OrderNotVoidable { .. } => "order_not_voidable",
            DomainError::IllegalStatusTransition { .. } => "illegal_status_transition",
            DomainError::FiscalAssignmentRejected(_) => "fiscal_assignment_rejected",
            DomainError::NotFound => "not_found",
            DomainError::ConcurrentModification(_) => "concurrent_modification",
        }
    }
}
