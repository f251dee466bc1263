//! Projection implementations (read model builders).
//!
//! Projections consume order events and build query-optimized read models.
//! They are:
//! - **Rebuildable**: can be reconstructed from `EventStore::load_all`
//! - **Idempotent**: an event at or below the stream cursor is ignored
//! - **Gap-checked**: an event that skips a sequence number is an error

pub mod orders;

pub use orders::{
    OrderPaymentSummary, OrderProjectionError, OrderReturnSummary, OrderSummary,
    OrdersProjection,
};
