use std::collections::HashMap;
use std::sync::RwLock;

use settle_core::{CustomerId, ProductId};
use settle_orders::{Catalog, CollaboratorError, CustomerDirectory, CustomerSnapshot, ProductSnapshot};

use super::FailureBudget;

/// Product catalog held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, ProductSnapshot>>,
    failures: FailureBudget,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: ProductSnapshot) {
        if let Ok(mut products) = self.products.write() {
            products.insert(product.product_id, product);
        }
    }

    /// Make the next `calls` lookups fail as unavailable.
    pub fn fail_next(&self, calls: u32) {
        self.failures.set(calls);
    }
}

impl Catalog for InMemoryCatalog {
    fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot, CollaboratorError> {
        self.failures.take("catalog")?;
        let products = self
            .products
            .read()
            .map_err(|_| CollaboratorError::Unavailable("catalog lock poisoned".to_string()))?;
        products
            .get(&product_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("product {product_id}")))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashMap<CustomerId, CustomerSnapshot>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, customer: CustomerSnapshot) {
        if let Ok(mut customers) = self.customers.write() {
            customers.insert(customer.customer_id, customer);
        }
    }
}

impl CustomerDirectory for InMemoryCustomerDirectory {
    fn get_customer(&self, customer_id: CustomerId) -> Result<CustomerSnapshot, CollaboratorError> {
        let customers = self
            .customers
            .read()
            .map_err(|_| CollaboratorError::Unavailable("customer directory lock poisoned".to_string()))?;
        customers
            .get(&customer_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("customer {customer_id}")))
    }
}
