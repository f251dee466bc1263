use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::Serialize;

use settle_core::{BranchId, ProductId};
use settle_orders::{CollaboratorError, Inventory};

use super::FailureBudget;

/// One applied stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    pub idempotency_key: String,
    pub branch_id: BranchId,
    pub product_id: ProductId,
    /// Positive for restocks, negative for debits.
    pub delta: i64,
}

#[derive(Debug, Default)]
struct Ledger {
    levels: HashMap<(BranchId, ProductId), i64>,
    applied: HashSet<String>,
    movements: Vec<StockMovement>,
}

/// Stock levels per branch and product.
///
/// Movements are applied at most once per idempotency key, so a retried job
/// that already went through is acknowledged without moving stock again.
#[derive(Debug, Default)]
pub struct InMemoryInventory {
    ledger: Mutex<Ledger>,
    failures: FailureBudget,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&self, branch_id: BranchId, product_id: ProductId, quantity: i64) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.levels.insert((branch_id, product_id), quantity);
        }
    }

    pub fn level(&self, branch_id: BranchId, product_id: ProductId) -> i64 {
        self.ledger
            .lock()
            .ok()
            .and_then(|l| l.levels.get(&(branch_id, product_id)).copied())
            .unwrap_or(0)
    }

    pub fn movements(&self) -> Vec<StockMovement> {
        self.ledger
            .lock()
            .map(|l| l.movements.clone())
            .unwrap_or_default()
    }

    /// Make the next `calls` movements fail as unavailable.
    pub fn fail_next(&self, calls: u32) {
        self.failures.set(calls);
    }

    fn apply(
        &self,
        idempotency_key: &str,
        branch_id: BranchId,
        product_id: ProductId,
        delta: i64,
    ) -> Result<(), CollaboratorError> {
        self.failures.take("inventory")?;
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("inventory lock poisoned".to_string()))?;

        if !ledger.applied.insert(idempotency_key.to_string()) {
            return Ok(());
        }
        *ledger.levels.entry((branch_id, product_id)).or_insert(0) += delta;
        ledger.movements.push(StockMovement {
            idempotency_key: idempotency_key.to_string(),
            branch_id,
            product_id,
            delta,
        });
        Ok(())
    }
}

fn positive(quantity: i64) -> Result<i64, CollaboratorError> {
    if quantity <= 0 {
        return Err(CollaboratorError::Rejected(format!(
            "stock movement quantity must be positive (got {quantity})"
        )));
    }
    Ok(quantity)
}

impl Inventory for InMemoryInventory {
    fn restock(
        &self,
        idempotency_key: &str,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), CollaboratorError> {
        let quantity = positive(quantity)?;
        self.apply(idempotency_key, branch_id, product_id, quantity)
    }

    fn debit_stock(
        &self,
        idempotency_key: &str,
        branch_id: BranchId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), CollaboratorError> {
        let quantity = positive(quantity)?;
        self.apply(idempotency_key, branch_id, product_id, -quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movements_are_idempotent_per_key() {
        let inventory = InMemoryInventory::new();
        let branch = BranchId::new();
        let product = ProductId::new();
        inventory.set_level(branch, product, 10);

        inventory.debit_stock("debit:o1:1", branch, product, 3).unwrap();
        inventory.debit_stock("debit:o1:1", branch, product, 3).unwrap();
        assert_eq!(inventory.level(branch, product), 7);

        inventory.restock("restock:o1:r1", branch, product, 1).unwrap();
        assert_eq!(inventory.level(branch, product), 8);
        assert_eq!(inventory.movements().len(), 2);
    }

    #[test]
    fn injected_failure_does_not_consume_the_key() {
        let inventory = InMemoryInventory::new();
        let branch = BranchId::new();
        let product = ProductId::new();

        inventory.fail_next(1);
        let err = inventory.restock("k", branch, product, 2).unwrap_err();
        assert!(err.is_retryable());

        inventory.restock("k", branch, product, 2).unwrap();
        assert_eq!(inventory.level(branch, product), 2);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let inventory = InMemoryInventory::new();
        let err = inventory
            .restock("k", BranchId::new(), ProductId::new(), 0)
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
