//! Returns: validation against purchased quantities and credit-note values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use settle_core::money::sum_money;
use settle_core::{BranchId, DomainError, DomainResult, Money, ProductId, ReturnRecordId};

use crate::pricing::{LEDGER_CURRENCY, LineItem};

/// One product in a return request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ReturnItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A recorded return (append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub return_record_id: ReturnRecordId,
    pub product_id: ProductId,
    pub quantity_returned: i64,
    pub returned_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub branch_id: Option<BranchId>,
}

/// Units purchased per product (a product may span several lines).
pub fn ordered_quantities(lines: &[LineItem]) -> BTreeMap<ProductId, i64> {
    let mut out = BTreeMap::new();
    for line in lines {
        *out.entry(line.product_id()).or_insert(0) += line.quantity;
    }
    out
}

/// Units already returned per product.
pub fn returned_quantities(records: &[ReturnRecord]) -> BTreeMap<ProductId, i64> {
    let mut out = BTreeMap::new();
    for r in records {
        *out.entry(r.product_id).or_insert(0) += r.quantity_returned;
    }
    out
}

/// Validate a return request and merge it per product.
///
/// Items naming the same product are summed (first non-empty reason wins);
/// zero quantities are dropped. The result keeps first-appearance order.
pub fn plan_return(
    lines: &[LineItem],
    existing: &[ReturnRecord],
    items: &[ReturnItem],
) -> DomainResult<Vec<ReturnItem>> {
    let mut merged: Vec<ReturnItem> = Vec::new();
    for item in items {
        if item.quantity < 0 {
            return Err(DomainError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(m) => {
                m.quantity += item.quantity;
                if m.reason.is_none() {
                    m.reason = item.reason.clone();
                }
            }
            None => merged.push(item.clone()),
        }
    }
    merged.retain(|m| m.quantity > 0);
    if merged.is_empty() {
        return Err(DomainError::NothingToReturn);
    }

    let ordered = ordered_quantities(lines);
    let returned = returned_quantities(existing);
    for m in &merged {
        let purchased = ordered.get(&m.product_id).copied().unwrap_or(0);
        let remaining = purchased - returned.get(&m.product_id).copied().unwrap_or(0);
        if m.quantity > remaining {
            return Err(DomainError::ReturnExceedsPurchased {
                product_id: m.product_id,
                requested: m.quantity,
                remaining,
            });
        }
    }

    Ok(merged)
}

/// True when every purchased unit has come back.
pub fn is_fully_returned(lines: &[LineItem], records: &[ReturnRecord]) -> bool {
    let ordered: i64 = lines.iter().map(|l| l.quantity).sum();
    let returned: i64 = records.iter().map(|r| r.quantity_returned).sum();
    returned >= ordered
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNoteLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub amount: Money,
}

/// Value owed back for returned goods: Σ returned quantity × original unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNote {
    pub lines: Vec<CreditNoteLine>,
    pub total: Money,
}

impl CreditNote {
    pub fn from_records(lines: &[LineItem], records: &[ReturnRecord]) -> DomainResult<Self> {
        let returned = returned_quantities(records);
        let mut out = Vec::new();
        for (product_id, quantity) in returned {
            let Some(line) = lines.iter().find(|l| l.product_id() == product_id) else {
                continue;
            };
            out.push(CreditNoteLine {
                product_id,
                name: line.product.name.clone(),
                quantity,
                unit_price: line.unit_price(),
                amount: line.unit_price().times(quantity)?,
            });
        }
        let total = sum_money(LEDGER_CURRENCY, out.iter().map(|l| l.amount))?;
        Ok(Self { lines: out, total })
    }
}

/// Credit value of a single batch of return records.
pub fn credit_value(lines: &[LineItem], records: &[ReturnRecord]) -> DomainResult<Money> {
    Ok(CreditNote::from_records(lines, records)?.total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{LineDraft, ProductSnapshot, price_order};
    use proptest::prelude::*;
    use settle_core::TaxRate;

    fn lines(qtys: &[i64]) -> Vec<LineItem> {
        let drafts: Vec<LineDraft> = qtys
            .iter()
            .enumerate()
            .map(|(i, q)| {
                LineDraft::new(
                    ProductSnapshot {
                        product_id: ProductId::new(),
                        name: format!("item-{i}"),
                        sku: format!("SKU-{i}"),
                        category: None,
                        unit_price: Money::crc_major(1_000 * (i as i64 + 1)),
                        iva_rate: TaxRate::STANDARD,
                    },
                    *q,
                )
            })
            .collect();
        price_order(&drafts, None).unwrap().lines
    }

    fn record(product_id: ProductId, qty: i64) -> ReturnRecord {
        ReturnRecord {
            return_record_id: ReturnRecordId::new(),
            product_id,
            quantity_returned: qty,
            returned_at: Utc::now(),
            reason: None,
            branch_id: None,
        }
    }

    #[test]
    fn duplicate_items_are_summed_before_checking() {
        let ls = lines(&[2]);
        let pid = ls[0].product_id();
        let err = plan_return(&ls, &[], &[ReturnItem::new(pid, 2), ReturnItem::new(pid, 1)])
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::ReturnExceedsPurchased {
                product_id: pid,
                requested: 3,
                remaining: 2
            }
        );
    }

    #[test]
    fn earlier_returns_reduce_what_is_left() {
        let ls = lines(&[3]);
        let pid = ls[0].product_id();
        let existing = vec![record(pid, 2)];
        assert!(plan_return(&ls, &existing, &[ReturnItem::new(pid, 1)]).is_ok());
        assert!(plan_return(&ls, &existing, &[ReturnItem::new(pid, 2)]).is_err());
    }

    #[test]
    fn all_zero_is_nothing_to_return() {
        let ls = lines(&[1]);
        let pid = ls[0].product_id();
        assert_eq!(
            plan_return(&ls, &[], &[ReturnItem::new(pid, 0)]).unwrap_err(),
            DomainError::NothingToReturn
        );
        assert_eq!(plan_return(&ls, &[], &[]).unwrap_err(), DomainError::NothingToReturn);
    }

    #[test]
    fn negative_quantity_is_invalid() {
        let ls = lines(&[1]);
        let pid = ls[0].product_id();
        assert!(matches!(
            plan_return(&ls, &[], &[ReturnItem::new(pid, -1)]).unwrap_err(),
            DomainError::InvalidQuantity { .. }
        ));
    }

    #[test]
    fn unknown_product_has_nothing_remaining() {
        let ls = lines(&[1]);
        let err = plan_return(&ls, &[], &[ReturnItem::new(ProductId::new(), 1)]).unwrap_err();
        assert!(matches!(
            err,
            DomainError::ReturnExceedsPurchased { remaining: 0, .. }
        ));
    }

    #[test]
    fn credit_note_uses_original_unit_price() {
        let ls = lines(&[2, 1]);
        let records = vec![record(ls[0].product_id(), 1), record(ls[1].product_id(), 1)];
        let note = CreditNote::from_records(&ls, &records).unwrap();
        assert_eq!(note.total, Money::crc_major(1_000 + 2_000));
        assert_eq!(note.lines.len(), 2);
        assert!(!is_fully_returned(&ls, &records));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Whatever sequence of requests arrives, accepted returns never exceed purchases.
        #[test]
        fn returns_never_exceed_ordered(
            qtys in proptest::collection::vec(1i64..6, 1..4),
            requests in proptest::collection::vec((0usize..4, 0i64..4), 0..20),
        ) {
            let ls = lines(&qtys);
            let mut records: Vec<ReturnRecord> = Vec::new();
            for (idx, qty) in requests {
                let pid = ls[idx % ls.len()].product_id();
                if let Ok(plan) = plan_return(&ls, &records, &[ReturnItem::new(pid, qty)]) {
                    records.extend(plan.into_iter().map(|i| record(i.product_id, i.quantity)));
                }
            }
            let ordered = ordered_quantities(&ls);
            for (pid, returned) in returned_quantities(&records) {
                prop_assert!(returned <= ordered[&pid]);
            }
        }
    }
}
