//! Budget versus actual for a period.
//!
//! Income has a single actual figure, net sales for the period, reported on
//! the `sales` row against the sum of all income budget lines. Expenses are
//! compared per category; categories with spending but no budget still show.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use settle_core::money::sum_money;
use settle_core::{Currency, DateRange, DomainError, DomainResult, Money};

use crate::projections::OrderSummary;
use crate::reports::sales::sales_summary;

/// Category that carries actual income.
pub const SALES_CATEGORY: &str = "sales";

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub category: String,
    pub kind: BudgetKind,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub category: String,
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialInput {
    #[serde(default)]
    pub budget: Vec<BudgetLine>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryVariance {
    pub category: String,
    pub kind: BudgetKind,
    pub budget: Money,
    pub actual: Money,
    /// `actual - budget`
    pub variance: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinancialSummary {
    pub period: DateRange,
    pub lines: Vec<CategoryVariance>,
    pub income_budget: Money,
    pub income_actual: Money,
    pub expense_budget: Money,
    pub expense_actual: Money,
    /// Income minus expenses, budgeted.
    pub net_budget: Money,
    /// Income minus expenses, actual.
    pub net_actual: Money,
}

fn ensure_amount(amount: Money, what: &str) -> DomainResult<()> {
    amount.ensure_currency(Currency::Crc)?;
    if amount.is_negative() {
        return Err(DomainError::invalid_price(format!("{what} must not be negative")));
    }
    Ok(())
}

pub fn financial_summary(
    orders: &[OrderSummary],
    period: DateRange,
    input: &FinancialInput,
) -> DomainResult<FinancialSummary> {
    for line in &input.budget {
        ensure_amount(line.amount, "budget amount")?;
    }
    for expense in &input.expenses {
        ensure_amount(expense.amount, "expense amount")?;
    }

    let income_budget = sum_money(
        Currency::Crc,
        input
            .budget
            .iter()
            .filter(|l| l.kind == BudgetKind::Income)
            .map(|l| l.amount),
    )?;
    let income_actual = sales_summary(orders, period).net_sales;

    // category -> (budget, actual)
    let zero = Money::zero(Currency::Crc);
    let mut expenses: BTreeMap<&str, (Money, Money)> = BTreeMap::new();
    for line in input.budget.iter().filter(|l| l.kind == BudgetKind::Expense) {
        let entry = expenses.entry(line.category.as_str()).or_insert((zero, zero));
        entry.0 = entry.0.checked_add(line.amount)?;
    }
    for expense in input.expenses.iter().filter(|e| period.contains_date(e.date)) {
        let entry = expenses.entry(expense.category.as_str()).or_insert((zero, zero));
        entry.1 = entry.1.checked_add(expense.amount)?;
    }

    let mut lines = vec![variance(SALES_CATEGORY, BudgetKind::Income, income_budget, income_actual)?];
    for (category, (budget, actual)) in &expenses {
        lines.push(variance(category, BudgetKind::Expense, *budget, *actual)?);
    }

    let expense_budget = sum_money(Currency::Crc, expenses.values().map(|(b, _)| *b))?;
    let expense_actual = sum_money(Currency::Crc, expenses.values().map(|(_, a)| *a))?;

    Ok(FinancialSummary {
        period,
        lines,
        income_budget,
        income_actual,
        expense_budget,
        expense_actual,
        net_budget: income_budget.checked_sub(expense_budget)?,
        net_actual: income_actual.checked_sub(expense_actual)?,
    })
}

fn variance(
    category: &str,
    kind: BudgetKind,
    budget: Money,
    actual: Money,
) -> DomainResult<CategoryVariance> {
    Ok(CategoryVariance {
        category: category.to_string(),
        kind,
        budget,
        actual,
        variance: actual.checked_sub(budget)?,
    })
}
