//! Monthly cash closure over petty-cash liquidations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use settle_core::money::sum_money;
use settle_core::{Currency, DateRange, DomainResult, Money};

/// One petty-cash liquidation as counted by the cashier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liquidation {
    pub date: NaiveDate,
    pub initial_amount: Money,
    pub total_expenses: Money,
    pub final_balance: Money,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureOutcome {
    Shortage,
    Surplus,
    Balanced,
}

impl ClosureOutcome {
    fn of(difference: i64) -> Self {
        match difference {
            d if d < 0 => ClosureOutcome::Shortage,
            d if d > 0 => ClosureOutcome::Surplus,
            _ => ClosureOutcome::Balanced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationResult {
    pub date: NaiveDate,
    pub initial_amount: Money,
    pub total_expenses: Money,
    /// `initial_amount - total_expenses`
    pub expected_balance: Money,
    pub final_balance: Money,
    /// `final_balance - expected_balance`
    pub difference: Money,
    pub outcome: ClosureOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyClosure {
    pub period: DateRange,
    /// In date order.
    pub liquidations: Vec<LiquidationResult>,
    pub total_initial: Money,
    pub total_expenses: Money,
    pub total_expected: Money,
    pub total_final: Money,
    pub total_difference: Money,
    pub outcome: ClosureOutcome,
}

pub fn monthly_closure(liquidations: &[Liquidation], period: DateRange) -> DomainResult<MonthlyClosure> {
    let mut results = Vec::new();
    for l in liquidations.iter().filter(|l| period.contains_date(l.date)) {
        l.initial_amount.ensure_currency(Currency::Crc)?;
        l.total_expenses.ensure_currency(Currency::Crc)?;
        l.final_balance.ensure_currency(Currency::Crc)?;

        let expected = l.initial_amount.checked_sub(l.total_expenses)?;
        let difference = l.final_balance.checked_sub(expected)?;
        results.push(LiquidationResult {
            date: l.date,
            initial_amount: l.initial_amount,
            total_expenses: l.total_expenses,
            expected_balance: expected,
            final_balance: l.final_balance,
            difference,
            outcome: ClosureOutcome::of(difference.amount()),
        });
    }
    results.sort_by_key(|r| r.date);

    let total = |f: fn(&LiquidationResult) -> Money| sum_money(Currency::Crc, results.iter().map(f));
    let total_difference = total(|r| r.difference)?;

    Ok(MonthlyClosure {
        period,
        total_initial: total(|r| r.initial_amount)?,
        total_expenses: total(|r| r.total_expenses)?,
        total_expected: total(|r| r.expected_balance)?,
        total_final: total(|r| r.final_balance)?,
        outcome: ClosureOutcome::of(total_difference.amount()),
        total_difference,
        liquidations: results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::DomainError;

    fn liquidation(day: u32, initial: i64, expenses: i64, final_balance: i64) -> Liquidation {
        Liquidation {
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            initial_amount: Money::crc_major(initial),
            total_expenses: Money::crc_major(expenses),
            final_balance: Money::crc_major(final_balance),
        }
    }

    #[test]
    fn classifies_each_liquidation_and_the_month() {
        let input = vec![
            liquidation(20, 50_000, 12_000, 38_000),
            liquidation(3, 50_000, 10_000, 39_500),
            liquidation(10, 50_000, 5_000, 45_250),
        ];
        let closure = monthly_closure(&input, DateRange::month(2025, 3).unwrap()).unwrap();

        let outcomes: Vec<_> = closure.liquidations.iter().map(|l| l.outcome).collect();
        assert_eq!(
            outcomes,
            vec![ClosureOutcome::Shortage, ClosureOutcome::Surplus, ClosureOutcome::Balanced]
        );
        assert_eq!(closure.liquidations[0].difference, Money::crc_major(-500));
        assert_eq!(closure.total_expected, Money::crc_major(123_000));
        assert_eq!(closure.total_difference, Money::crc_major(-250));
        assert_eq!(closure.outcome, ClosureOutcome::Shortage);
    }

    #[test]
    fn other_months_are_ignored() {
        let mut april = liquidation(1, 10_000, 0, 0);
        april.date = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        let closure = monthly_closure(&[april], DateRange::month(2025, 3).unwrap()).unwrap();
        assert!(closure.liquidations.is_empty());
        assert_eq!(closure.outcome, ClosureOutcome::Balanced);
    }

    #[test]
    fn dollar_amounts_are_rejected() {
        let mut l = liquidation(1, 10_000, 0, 10_000);
        l.final_balance = Money::usd(100);
        assert!(matches!(
            monthly_closure(&[l], DateRange::unbounded()),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }
}
