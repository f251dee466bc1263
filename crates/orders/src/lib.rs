//! Order settlement domain (event-sourced).
//!
//! Turns a cart into a priced, tax-consistent order, then tracks payments,
//! returns, voids and cancellation through a single status state machine.
//! Pure domain logic: no IO, no HTTP, no storage. External systems are
//! reached through the ports in [`collaborators`].

pub mod collaborators;
pub mod discount;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod returns;
pub mod status;

pub use collaborators::{
    Catalog, CollaboratorError, CustomerDirectory, CustomerSnapshot, FiscalIdentifiers,
    FiscalService, Inventory,
};
pub use discount::{Coupon, CouponOutcome, CouponSkipReason, DiscountKind, ItemDiscount};
pub use order::{
    AbortPaymentProcessing, AssignFiscalIdentifiers, BeginPaymentProcessing, CancelOrder,
    FiscalIdentifiersAssigned, Order, OrderCancelled, OrderCommand, OrderEvent, OrderId,
    OrderPlaced, OrderVoided, PaymentProcessingAborted, PaymentProcessingStarted, PaymentRecorded,
    PlaceOrder, RecordPayment, RecordReturn, ReturnRecorded, VoidOrder, ORDER_AGGREGATE_TYPE,
};
pub use payment::{Payment, PaymentDraft, PaymentMethod};
pub use pricing::{Cart, CartLine, LineDraft, LineItem, OrderTotals, PricedOrder, ProductSnapshot, price_order};
pub use returns::{CreditNote, CreditNoteLine, ReturnItem, ReturnRecord};
pub use status::{Lifecycle, OrderStatus, StatusTrigger};
