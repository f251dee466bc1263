//! Disposable read model storage.
//!
//! Read models are rebuilt from the event store at any time, so stores here
//! are plain key/value maps with a `clear` for rebuilds.

pub mod store;

pub use store::{InMemoryReadStore, ReadStore};
