//! Money & Tax model.
//!
//! All amounts are integer minor units (céntimos for CRC, cents for USD) tagged
//! with their currency. Arithmetic across currencies is rejected; the only way
//! to move between them is an explicit [`ExchangeRate::convert`].
//!
//! Rounding always uses banker's rounding (round half to even) so that many
//! per-line roundings do not drift systematically in one direction.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Basis points in 100%.
pub const BPS_SCALE: i64 = 10_000;

/// Supported settlement currencies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Costa Rican colón, the ledger currency.
    Crc,
    Usd,
}

impl Currency {
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Crc => "CRC",
            Currency::Usd => "USD",
        }
    }

    /// Minor units in one major unit.
    pub const fn minor_per_major(&self) -> i64 {
        100
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CRC" => Ok(Currency::Crc),
            "USD" => Ok(Currency::Usd),
            other => Err(DomainError::invalid_price(format!(
                "unsupported currency '{other}'"
            ))),
        }
    }
}

/// Round `numerator / denominator` to the nearest integer, ties to even.
///
/// `denominator` must be positive.
pub fn round_half_even(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let quotient = numerator.div_euclid(denominator);
    let remainder = numerator.rem_euclid(denominator);
    let twice = remainder * 2;
    if twice > denominator || (twice == denominator && quotient % 2 != 0) {
        quotient + 1
    } else {
        quotient
    }
}

/// A currency-tagged amount in minor units.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    #[inline]
    pub const fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Colones in minor units (céntimos).
    #[inline]
    pub const fn crc(minor: i64) -> Self {
        Self::new(minor, Currency::Crc)
    }

    /// Whole colones.
    #[inline]
    pub const fn crc_major(major: i64) -> Self {
        Self::new(major * 100, Currency::Crc)
    }

    #[inline]
    pub const fn usd(cents: i64) -> Self {
        Self::new(cents, Currency::Usd)
    }

    #[inline]
    pub const fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Amount in minor units.
    #[inline]
    pub const fn amount(&self) -> i64 {
        self.amount
    }

    #[inline]
    pub const fn currency(&self) -> Currency {
        self.currency
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.amount == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.amount > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.amount < 0
    }

    pub fn ensure_currency(&self, expected: Currency) -> DomainResult<()> {
        if self.currency == expected {
            Ok(())
        } else {
            Err(DomainError::CurrencyMismatch {
                expected,
                found: self.currency,
            })
        }
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        other.ensure_currency(self.currency)?;
        self.amount
            .checked_add(other.amount)
            .map(|amount| Money::new(amount, self.currency))
            .ok_or_else(out_of_range)
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        other.ensure_currency(self.currency)?;
        self.amount
            .checked_sub(other.amount)
            .map(|amount| Money::new(amount, self.currency))
            .ok_or_else(out_of_range)
    }

    /// Multiply by a quantity (unit price × units).
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        self.amount
            .checked_mul(quantity)
            .map(|amount| Money::new(amount, self.currency))
            .ok_or_else(out_of_range)
    }

    /// Clamp negative amounts to zero.
    #[inline]
    pub const fn floor_zero(self) -> Money {
        if self.amount < 0 {
            Money::new(0, self.currency)
        } else {
            self
        }
    }

    /// `bps` basis points of this amount, banker's rounded.
    pub fn percentage(self, bps: i64) -> DomainResult<Money> {
        let scaled = round_half_even(self.amount as i128 * bps as i128, BPS_SCALE as i128);
        let amount = i64::try_from(scaled).map_err(|_| out_of_range())?;
        Ok(Money::new(amount, self.currency))
    }
}

fn out_of_range() -> DomainError {
    DomainError::invalid_price("amount out of range")
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let per = self.currency.minor_per_major();
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        write!(
            f,
            "{} {sign}{}.{:02}",
            self.currency,
            abs / per as u64,
            abs % per as u64
        )
    }
}

/// Sum a sequence of amounts that must all be in `currency`.
///
/// Fails with [`DomainError::CurrencyMismatch`] on the first foreign amount.
pub fn sum_money<I>(currency: Currency, amounts: I) -> DomainResult<Money>
where
    I: IntoIterator<Item = Money>,
{
    amounts
        .into_iter()
        .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
}

/// IVA (value-added tax) rate in basis points.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(u32);

impl TaxRate {
    pub const EXEMPT: TaxRate = TaxRate(0);
    pub const REDUCED: TaxRate = TaxRate(400);
    pub const STANDARD: TaxRate = TaxRate(1300);

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Tax owed on `base` at `rate`, rounded to the minor unit (ties to even).
pub fn add_tax(base: Money, rate: TaxRate) -> DomainResult<Money> {
    base.percentage(rate.bps() as i64)
}

/// Colones per one unit of a foreign currency, fixed-point with four decimals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRate(i64);

impl ExchangeRate {
    pub const SCALE: i64 = 10_000;
    const DECIMALS: usize = 4;

    /// Build from a value already multiplied by [`Self::SCALE`].
    pub fn from_scaled(scaled: i64) -> DomainResult<Self> {
        if scaled <= 0 {
            return Err(DomainError::invalid_payment(
                "exchange rate must be positive",
            ));
        }
        Ok(Self(scaled))
    }

    #[inline]
    pub const fn scaled(&self) -> i64 {
        self.0
    }

    /// Convert a foreign amount into colones, banker's rounded.
    pub fn convert(&self, amount: Money) -> DomainResult<Money> {
        if amount.currency() == Currency::Crc {
            return Err(DomainError::CurrencyMismatch {
                expected: Currency::Usd,
                found: Currency::Crc,
            });
        }
        let crc = round_half_even(amount.amount() as i128 * self.0 as i128, Self::SCALE as i128);
        i64::try_from(crc)
            .map(Money::crc)
            .map_err(|_| DomainError::invalid_payment("converted amount out of range"))
    }
}

impl FromStr for ExchangeRate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DomainError::invalid_payment(format!("invalid exchange rate '{s}'"));
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() || frac.len() > Self::DECIMALS {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let mut frac_scaled: i64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        for _ in frac.len()..Self::DECIMALS {
            frac_scaled *= 10;
        }
        let scaled = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac_scaled))
            .ok_or_else(invalid)?;
        Self::from_scaled(scaled)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}
