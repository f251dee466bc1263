//! `settle-core`: domain foundation building blocks for the settlement engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! aggregate traits, identifiers, the error taxonomy and the Money & Tax model.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod period;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, ErrorClass};
pub use id::{AggregateId, BranchId, CustomerId, PaymentId, ProductId, ReturnRecordId};
pub use money::{Currency, ExchangeRate, Money, TaxRate};
pub use period::DateRange;
