//! Event mechanics: the event contract, envelopes and pub/sub distribution.
//!
//! Nothing in here knows about orders; domain crates implement [`Event`] for
//! their own event types and infrastructure moves [`EventEnvelope`]s around.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
