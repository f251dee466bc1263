//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id. The store makes no storage assumptions
//! beyond ordering: per-stream sequence numbers and a global append order.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
