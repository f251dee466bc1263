//! Order builder: cart lines + discounts + per-line IVA → frozen totals.

use serde::{Deserialize, Serialize};

use settle_core::money::{add_tax, sum_money};
use settle_core::{BranchId, Currency, CustomerId, DomainError, DomainResult, Money, ProductId, TaxRate};

use crate::discount::{Coupon, CouponOutcome, ItemDiscount, allocate};

/// Ledger currency. Every priced amount on an order is in colones.
pub const LEDGER_CURRENCY: Currency = Currency::Crc;

/// Product data copied onto the order when it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub category: Option<String>,
    pub unit_price: Money,
    pub iva_rate: TaxRate,
}

/// A cart line as submitted by the caller (product looked up later).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub discount: Option<ItemDiscount>,
}

/// What a caller asks to buy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    /// Branch whose stock is debited; falls back to the configured default.
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    pub lines: Vec<CartLine>,
    #[serde(default)]
    pub coupon: Option<Coupon>,
}

/// A cart line with its product snapshot resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub product: ProductSnapshot,
    pub quantity: i64,
    pub discount: Option<ItemDiscount>,
}

impl LineDraft {
    pub fn new(product: ProductSnapshot, quantity: i64) -> Self {
        Self {
            product,
            quantity,
            discount: None,
        }
    }

    pub fn with_discount(mut self, discount: ItemDiscount) -> Self {
        self.discount = Some(discount);
        self
    }
}

/// A priced, immutable order line.
///
/// `line_subtotal = gross - discount_amount` and
/// `taxable_base = line_subtotal - coupon_share`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_no: u32,
    pub product: ProductSnapshot,
    pub quantity: i64,
    pub discount: Option<ItemDiscount>,
    pub gross: Money,
    pub discount_amount: Money,
    pub line_subtotal: Money,
    pub coupon_share: Money,
    pub taxable_base: Money,
    pub tax: Money,
}

impl LineItem {
    pub fn product_id(&self) -> ProductId {
        self.product.product_id
    }

    pub fn unit_price(&self) -> Money {
        self.product.unit_price
    }

    pub fn line_total(&self) -> Money {
        Money::new(
            self.taxable_base.amount() + self.tax.amount(),
            self.taxable_base.currency(),
        )
    }
}

/// Frozen order totals, all in colones.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal_original: Money,
    pub items_discount: Money,
    pub subtotal_after_item_discounts: Money,
    pub order_discount: Money,
    pub base_for_tax: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    pub const fn zero() -> Self {
        let z = Money::zero(LEDGER_CURRENCY);
        Self {
            subtotal_original: z,
            items_discount: z,
            subtotal_after_item_discounts: z,
            order_discount: z,
            base_for_tax: z,
            tax: z,
            total: z,
        }
    }

    /// Discounts of both kinds combined.
    pub fn discount_total(&self) -> Money {
        Money::new(
            self.items_discount.amount() + self.order_discount.amount(),
            self.items_discount.currency(),
        )
    }
}

impl Default for OrderTotals {
    fn default() -> Self {
        Self::zero()
    }
}

/// The output of the builder: priced lines, coupon outcome and totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedOrder {
    pub lines: Vec<LineItem>,
    pub coupon: Option<CouponOutcome>,
    pub totals: OrderTotals,
}

fn validate_line(draft: &LineDraft) -> DomainResult<()> {
    if draft.quantity <= 0 {
        return Err(DomainError::InvalidQuantity {
            product_id: draft.product.product_id,
            quantity: draft.quantity,
        });
    }
    draft.product.unit_price.ensure_currency(LEDGER_CURRENCY)?;
    if draft.product.unit_price.is_negative() {
        return Err(DomainError::invalid_price(format!(
            "product {} has a negative unit price",
            draft.product.product_id
        )));
    }
    Ok(())
}

/// Price a set of lines with an optional coupon.
///
/// Deterministic: the same input always yields the same lines and totals.
pub fn price_order(drafts: &[LineDraft], coupon: Option<&Coupon>) -> DomainResult<PricedOrder> {
    if drafts.is_empty() {
        return Err(DomainError::EmptyOrder);
    }
    for draft in drafts {
        validate_line(draft)?;
    }

    // 1) per-item discounts
    let mut partial = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let gross = draft.product.unit_price.times(draft.quantity)?;
        let discount_amount = match &draft.discount {
            Some(d) => d.amount_for(gross)?,
            None => Money::zero(LEDGER_CURRENCY),
        };
        let line_subtotal = gross.checked_sub(discount_amount)?;
        partial.push((gross, discount_amount, line_subtotal));
    }

    let subtotal_original = sum_money(LEDGER_CURRENCY, partial.iter().map(|p| p.0))?;
    let items_discount = sum_money(LEDGER_CURRENCY, partial.iter().map(|p| p.1))?;
    let subtotal_after_item_discounts = subtotal_original.checked_sub(items_discount)?;

    // 2) + 3) coupon, clamped
    let coupon = coupon
        .map(|c| c.resolve(subtotal_after_item_discounts))
        .transpose()?;
    let order_discount = coupon
        .as_ref()
        .map(|c| c.amount(LEDGER_CURRENCY))
        .unwrap_or(Money::zero(LEDGER_CURRENCY));

    let weights: Vec<Money> = partial.iter().map(|p| p.2).collect();
    let shares = allocate(order_discount, &weights);

    let mut lines = Vec::with_capacity(drafts.len());
    for (idx, (draft, ((gross, discount_amount, line_subtotal), coupon_share))) in
        drafts.iter().zip(partial.into_iter().zip(shares)).enumerate()
    {
        let taxable_base = line_subtotal.checked_sub(coupon_share)?;
        let tax = add_tax(taxable_base, draft.product.iva_rate)?;
        lines.push(LineItem {
            line_no: idx as u32 + 1,
            product: draft.product.clone(),
            quantity: draft.quantity,
            discount: draft.discount.clone(),
            gross,
            discount_amount,
            line_subtotal,
            coupon_share,
            taxable_base,
            tax,
        });
    }

    let base_for_tax = subtotal_after_item_discounts.checked_sub(order_discount)?;
    let tax = sum_money(LEDGER_CURRENCY, lines.iter().map(|l| l.tax))?;
    let total = base_for_tax.checked_add(tax)?;

    Ok(PricedOrder {
        lines,
        coupon,
        totals: OrderTotals {
            subtotal_original,
            items_discount,
            subtotal_after_item_discounts,
            order_discount,
            base_for_tax,
            tax,
            total,
        },
    })
}
