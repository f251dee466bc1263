//! Order settlement: the operations callers invoke, plus the collaborator
//! side effects they queue.

mod error;
mod jobs;
mod numbering;
mod service;

pub use error::{ErrorKind, SettlementError};
pub use jobs::{FiscalPayload, StockMovementPayload};
pub use numbering::OrderNumberSequence;
pub use service::{Collaborators, SettlementService};
