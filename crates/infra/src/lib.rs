//! Infrastructure layer: event store, dispatch, read models, collaborator jobs
//! and the settlement service that wires them together.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod external;
pub mod jobs;
pub mod projections;
pub mod read_model;
pub mod reports;
pub mod settlement;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, EngineConfig};
pub use settlement::{Collaborators, SettlementError, SettlementService};
