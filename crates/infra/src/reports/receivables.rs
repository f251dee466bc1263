//! Accounts receivable: open balances on unpaid and partially paid orders.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use settle_core::{CustomerId, DateRange, Money};
use settle_orders::{OrderId, OrderStatus};

use crate::projections::OrderSummary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivableOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub balance_due: Money,
}

/// Open balance of one customer. Walk-in orders share the `None` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivableCustomer {
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub order_count: usize,
    pub balance_due: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountsReceivable {
    pub period: DateRange,
    pub total: Money,
    pub order_count: usize,
    /// Largest balance first.
    pub customers: Vec<ReceivableCustomer>,
    /// Oldest first.
    pub orders: Vec<ReceivableOrder>,
}

/// `Σ balance_due` over `pending_payment` and `partially_paid` orders
/// created within `period`.
pub fn accounts_receivable(orders: &[OrderSummary], period: DateRange) -> AccountsReceivable {
    let mut open: Vec<&OrderSummary> = orders
        .iter()
        .filter(|o| o.status.is_receivable() && period.contains(o.created_at))
        .collect();
    open.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.order_number.cmp(&b.order_number))
    });

    let mut by_customer: BTreeMap<Option<CustomerId>, ReceivableCustomer> = BTreeMap::new();
    for order in &open {
        let row = by_customer
            .entry(order.customer_id)
            .or_insert_with(|| ReceivableCustomer {
                customer_id: order.customer_id,
                customer_name: order.customer_name.clone(),
                order_count: 0,
                balance_due: Money::crc(0),
            });
        row.order_count += 1;
        row.balance_due = Money::crc(row.balance_due.amount() + order.balance_due.amount());
    }

    let mut customers: Vec<ReceivableCustomer> = by_customer.into_values().collect();
    customers.sort_by(|a, b| {
        b.balance_due
            .amount()
            .cmp(&a.balance_due.amount())
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });

    AccountsReceivable {
        period,
        total: Money::crc(open.iter().map(|o| o.balance_due.amount()).sum()),
        order_count: open.len(),
        customers,
        orders: open
            .iter()
            .map(|o| ReceivableOrder {
                order_id: o.order_id,
                order_number: o.order_number.clone(),
                status: o.status,
                created_at: o.created_at,
                balance_due: o.balance_due,
            })
            .collect(),
    }
}
