//! Ports to systems the settlement engine depends on but does not own.
//!
//! Implementations live in infrastructure. Inventory and fiscal calls are made
//! after the ledger commit and must be idempotent on the key they receive.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use settle_core::{BranchId, CustomerId, ProductId};

use crate::order::Order;
use crate::pricing::ProductSnapshot;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient; the call may be retried.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused the request; retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollaboratorError::Unavailable(_))
    }
}

/// Customer data denormalized onto the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub customer_id: CustomerId,
    pub name: String,
    #[serde(default)]
    pub identification: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Electronic-invoice identifiers issued by the tax authority integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalIdentifiers {
    pub clave: String,
    pub consecutivo: String,
}

pub trait Catalog: Send + Sync {
    fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot, CollaboratorError>;
}

pub trait CustomerDirectory: Send + Sync {
    fn get_customer(&self, customer_id: CustomerId)
    -> Result<CustomerSnapshot, CollaboratorError>;
}

pub trait Inventory: Send + Sync {
    /// Put returned units back on the shelf.
    fn restock(
        &self,
        idempotency_key: &str,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), CollaboratorError>;

    /// Take sold units off the shelf.
    fn debit_stock(
        &self,
        idempotency_key: &str,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), CollaboratorError>;
}

pub trait FiscalService: Send + Sync {
    fn assign_invoice_identifiers(&self, order: &Order)
    -> Result<FiscalIdentifiers, CollaboratorError>;
}
