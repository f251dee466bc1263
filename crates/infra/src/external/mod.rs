//! In-process adapters for the collaborator ports.
//!
//! Used by the HTTP binary and the tests. Each adapter can be told to fail
//! its next calls so the retry queue can be exercised end to end.

pub mod directory;
pub mod fiscal;
pub mod inventory;

pub use directory::{InMemoryCatalog, InMemoryCustomerDirectory};
pub use fiscal::SequentialFiscalService;
pub use inventory::{InMemoryInventory, StockMovement};

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use settle_orders::CollaboratorError;

use crate::settlement::Collaborators;

/// The in-process adapters, kept typed so callers can seed and inspect them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCollaborators {
    pub catalog: Arc<InMemoryCatalog>,
    pub customers: Arc<InMemoryCustomerDirectory>,
    pub inventory: Arc<InMemoryInventory>,
    pub fiscal: Arc<SequentialFiscalService>,
}

impl InMemoryCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same adapters behind the port traits.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            catalog: self.catalog.clone(),
            customers: self.customers.clone(),
            inventory: self.inventory.clone(),
            fiscal: self.fiscal.clone(),
        }
    }
}

/// Countdown of injected transient failures.
#[derive(Debug, Default)]
pub(crate) struct FailureBudget(AtomicU32);

impl FailureBudget {
    pub(crate) fn set(&self, calls: u32) {
        self.0.store(calls, Ordering::SeqCst);
    }

    /// Consume one injected failure, if any remain.
    pub(crate) fn take(&self, service: &str) -> Result<(), CollaboratorError> {
        let took = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(CollaboratorError::Unavailable(format!("{service} temporarily unavailable")))
        } else {
            Ok(())
        }
    }
}
