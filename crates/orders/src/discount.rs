//! Discount resolver.
//!
//! Resolution order is fixed:
//! 1. per-item discounts, line by line;
//! 2. the (single) coupon against the post-item subtotal, if its minimum
//!    purchase is met;
//! 3. the coupon amount clamped to what is left of the subtotal.
//!
//! The applied coupon is then apportioned across lines (largest remainder) so
//! each line has its own taxable base.

use serde::{Deserialize, Serialize};

use settle_core::money::BPS_SCALE;
use settle_core::{Currency, DomainError, DomainResult, Money};

/// How a discount value is interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is basis points (0..=10000).
    Percentage,
    /// `value` is CRC minor units.
    Fixed,
}

fn validate_value(kind: DiscountKind, value: i64) -> DomainResult<()> {
    if value < 0 {
        return Err(DomainError::invalid_discount(format!(
            "discount value must not be negative (got {value})"
        )));
    }
    if kind == DiscountKind::Percentage && value > BPS_SCALE {
        return Err(DomainError::invalid_discount(format!(
            "percentage discount above 100% ({value} bps)"
        )));
    }
    Ok(())
}

/// Discount attached to a single line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDiscount {
    pub kind: DiscountKind,
    pub value: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ItemDiscount {
    pub fn percentage(bps: i64) -> Self {
        Self {
            kind: DiscountKind::Percentage,
            value: bps,
            reason: None,
        }
    }

    pub fn fixed(amount: Money) -> Self {
        Self {
            kind: DiscountKind::Fixed,
            value: amount.amount(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Discount amount for a line whose gross (unit price × quantity) is `gross`.
    ///
    /// A fixed discount larger than the gross is rejected rather than clamped.
    pub fn amount_for(&self, gross: Money) -> DomainResult<Money> {
        validate_value(self.kind, self.value)?;
        match self.kind {
            DiscountKind::Percentage => gross.percentage(self.value),
            DiscountKind::Fixed => {
                if self.value > gross.amount() {
                    return Err(DomainError::invalid_discount(format!(
                        "fixed discount {} exceeds line gross {gross}",
                        Money::new(self.value, gross.currency())
                    )));
                }
                Ok(Money::new(self.value, gross.currency()))
            }
        }
    }
}

/// Order-level coupon. At most one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub kind: DiscountKind,
    pub value: i64,
    /// Post-item subtotal required for the coupon to apply.
    pub min_purchase: Money,
}

impl Coupon {
    pub fn validate(&self) -> DomainResult<()> {
        if self.code.trim().is_empty() {
            return Err(DomainError::invalid_discount("coupon code is empty"));
        }
        validate_value(self.kind, self.value)?;
        self.min_purchase.ensure_currency(Currency::Crc)?;
        if self.min_purchase.is_negative() {
            return Err(DomainError::invalid_discount(
                "coupon minimum purchase must not be negative",
            ));
        }
        Ok(())
    }

    /// Resolve against the subtotal left after per-item discounts.
    pub fn resolve(&self, subtotal_after_items: Money) -> DomainResult<CouponOutcome> {
        self.validate()?;
        subtotal_after_items.ensure_currency(self.min_purchase.currency())?;

        if subtotal_after_items.amount() < self.min_purchase.amount() {
            return Ok(CouponOutcome::Skipped {
                code: self.code.clone(),
                reason: CouponSkipReason::MinimumNotMet {
                    required: self.min_purchase,
                    subtotal: subtotal_after_items,
                },
            });
        }

        let raw = match self.kind {
            DiscountKind::Percentage => subtotal_after_items.percentage(self.value)?,
            DiscountKind::Fixed => Money::new(self.value, subtotal_after_items.currency()),
        };
        let amount = Money::new(
            raw.amount().min(subtotal_after_items.amount()),
            subtotal_after_items.currency(),
        );

        Ok(CouponOutcome::Applied {
            code: self.code.clone(),
            amount,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouponSkipReason {
    MinimumNotMet { required: Money, subtotal: Money },
}

/// What happened to the coupon presented with the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CouponOutcome {
    Applied { code: String, amount: Money },
    Skipped { code: String, reason: CouponSkipReason },
}

impl CouponOutcome {
    pub fn code(&self) -> &str {
        match self {
            CouponOutcome::Applied { code, .. } | CouponOutcome::Skipped { code, .. } => code,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, CouponOutcome::Applied { .. })
    }

    /// Applied amount, zero when skipped.
    pub fn amount(&self, currency: Currency) -> Money {
        match self {
            CouponOutcome::Applied { amount, .. } => *amount,
            CouponOutcome::Skipped { .. } => Money::zero(currency),
        }
    }
}

/// Split `amount` across `weights` proportionally; shares sum exactly to `amount`.
///
/// Largest-remainder apportionment: every share gets its floor, leftover
/// minor units go to the largest fractional parts (earlier lines win ties).
/// All-zero weights yield all-zero shares.
pub fn allocate(amount: Money, weights: &[Money]) -> Vec<Money> {
    let currency = amount.currency();
    let total: i128 = weights.iter().map(|w| w.amount().max(0) as i128).sum();
    if total == 0 || amount.is_zero() {
        return vec![Money::zero(currency); weights.len()];
    }

    let target = amount.amount() as i128;
    let mut shares: Vec<i128> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(weights.len());
    for (idx, w) in weights.iter().enumerate() {
        let scaled = target * w.amount().max(0) as i128;
        shares.push(scaled / total);
        remainders.push((idx, scaled % total));
    }

    let mut leftover = target - shares.iter().sum::<i128>();
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (idx, _) in remainders {
        if leftover == 0 {
            break;
        }
        shares[idx] += 1;
        leftover -= 1;
    }

    shares
        .into_iter()
        .map(|s| Money::new(s as i64, currency))
        .collect()
}
