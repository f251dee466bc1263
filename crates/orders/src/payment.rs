//! Payment ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use settle_core::{Currency, DomainError, DomainResult, ExchangeRate, Money, PaymentId};

use crate::pricing::LEDGER_CURRENCY;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    /// Costa Rican instant mobile transfer.
    Sinpe,
    Transfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Sinpe,
        PaymentMethod::Transfer,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Sinpe => "sinpe",
            PaymentMethod::Transfer => "transfer",
        }
    }
}

/// A payment as tendered, before conversion to the ledger currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub method: PaymentMethod,
    /// Amount in the currency actually paid.
    pub amount: Money,
    /// Colones per unit of `amount`'s currency; required for foreign payments.
    #[serde(default)]
    pub exchange_rate: Option<ExchangeRate>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub cash_received: Option<Money>,
    #[serde(default)]
    pub cash_change: Option<Money>,
}

impl PaymentDraft {
    pub fn cash(amount: Money) -> Self {
        Self::new(PaymentMethod::Cash, amount)
    }

    pub fn new(method: PaymentMethod, amount: Money) -> Self {
        Self {
            method,
            amount,
            exchange_rate: None,
            reference: None,
            cash_received: None,
            cash_change: None,
        }
    }

    pub fn with_exchange_rate(mut self, rate: ExchangeRate) -> Self {
        self.exchange_rate = Some(rate);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_cash_received(mut self, received: Money) -> Self {
        self.cash_received = Some(received);
        self
    }

    /// Convert into a ledger [`Payment`], validating the tender.
    ///
    /// Foreign amounts are converted at `exchange_rate` with banker's rounding.
    /// When only `cash_received` is given the change is derived.
    pub fn into_payment(
        self,
        payment_id: PaymentId,
        recorded_at: DateTime<Utc>,
    ) -> DomainResult<Payment> {
        if self.amount.is_negative() {
            return Err(DomainError::invalid_payment(format!(
                "amount must not be negative (got {})",
                self.amount
            )));
        }

        let currency_paid = self.amount.currency();
        let (amount_crc, amount_in_currency, exchange_rate_applied) =
            if currency_paid == LEDGER_CURRENCY {
                if self.exchange_rate.is_some() {
                    return Err(DomainError::invalid_payment(
                        "exchange rate given for a colón payment",
                    ));
                }
                (self.amount, None, None)
            } else {
                let rate = self.exchange_rate.ok_or_else(|| {
                    DomainError::invalid_payment(format!(
                        "exchange rate required for a {currency_paid} payment"
                    ))
                })?;
                (rate.convert(self.amount)?, Some(self.amount), Some(rate))
            };

        let cash_change = match (self.cash_received, self.cash_change) {
            (Some(received), None) => Some(received.checked_sub(self.amount)?),
            (_, change) => change,
        };

        let payment = Payment {
            payment_id,
            method: self.method,
            amount_crc,
            currency_paid,
            amount_in_currency,
            exchange_rate_applied,
            reference: self.reference.filter(|r| !r.trim().is_empty()),
            cash_received: self.cash_received,
            cash_change,
            recorded_at,
        };
        payment.validate()?;
        Ok(payment)
    }
}

/// A recorded payment (append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub method: PaymentMethod,
    pub amount_crc: Money,
    pub currency_paid: Currency,
    pub amount_in_currency: Option<Money>,
    pub exchange_rate_applied: Option<ExchangeRate>,
    pub reference: Option<String>,
    pub cash_received: Option<Money>,
    pub cash_change: Option<Money>,
    pub recorded_at: DateTime<Utc>,
}

impl Payment {
    /// Check the ledger invariants of a payment on its own.
    ///
    /// - `amount_crc` is in colones and not negative;
    /// - foreign payments carry the original amount and rate, and
    ///   `amount_crc == round(amount_in_currency × rate)`;
    /// - cash details only on cash payments, with
    ///   `cash_change == cash_received - amount` when both are present.
    pub fn validate(&self) -> DomainResult<()> {
        self.amount_crc.ensure_currency(LEDGER_CURRENCY)?;
        if self.amount_crc.is_negative() {
            return Err(DomainError::invalid_payment("amount must not be negative"));
        }

        let tendered = if self.currency_paid == LEDGER_CURRENCY {
            if self.amount_in_currency.is_some() || self.exchange_rate_applied.is_some() {
                return Err(DomainError::invalid_payment(
                    "colón payments carry no conversion",
                ));
            }
            self.amount_crc
        } else {
            let (Some(amount), Some(rate)) = (self.amount_in_currency, self.exchange_rate_applied)
            else {
                return Err(DomainError::invalid_payment(format!(
                    "{} payment without amount or exchange rate",
                    self.currency_paid
                )));
            };
            amount.ensure_currency(self.currency_paid)?;
            let expected = rate.convert(amount)?;
            if expected != self.amount_crc {
                return Err(DomainError::invalid_payment(format!(
                    "converted amount {} does not match {amount} at {rate} ({expected})",
                    self.amount_crc
                )));
            }
            amount
        };

        if self.method != PaymentMethod::Cash
            && (self.cash_received.is_some() || self.cash_change.is_some())
        {
            return Err(DomainError::invalid_payment(
                "cash details on a non-cash payment",
            ));
        }

        if let Some(received) = self.cash_received {
            received.ensure_currency(tendered.currency())?;
            if received.amount() < tendered.amount() {
                return Err(DomainError::invalid_payment(format!(
                    "cash received {received} is less than the amount {tendered}"
                )));
            }
            if let Some(change) = self.cash_change {
                change.ensure_currency(tendered.currency())?;
                if change.amount() != received.amount() - tendered.amount() {
                    return Err(DomainError::invalid_payment(format!(
                        "change {change} should be {}",
                        Money::new(received.amount() - tendered.amount(), received.currency())
                    )));
                }
            }
        } else if self.cash_change.is_some() {
            return Err(DomainError::invalid_payment(
                "cash change without cash received",
            ));
        }

        Ok(())
    }
}

/// `Σ amount_crc` over a payment history.
pub fn amount_paid_total(payments: &[Payment]) -> Money {
    Money::new(
        payments.iter().map(|p| p.amount_crc.amount()).sum(),
        LEDGER_CURRENCY,
    )
}
