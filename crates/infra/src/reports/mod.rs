//! Read-only reports over the orders projection.
//!
//! Every report is a pure function of a snapshot of [`OrderSummary`] rows
//! (plus caller-supplied inputs for budget and cash closure); none of them
//! can touch an order. All amounts are in colones.
//!
//! [`OrderSummary`]: crate::projections::OrderSummary

pub mod closure;
pub mod financial;
pub mod receivables;
pub mod sales;

pub use closure::{ClosureOutcome, Liquidation, LiquidationResult, MonthlyClosure, monthly_closure};
pub use financial::{
    BudgetKind, BudgetLine, CategoryVariance, Expense, FinancialInput, FinancialSummary,
    financial_summary,
};
pub use receivables::{AccountsReceivable, ReceivableCustomer, ReceivableOrder, accounts_receivable};
pub use sales::{SalesSummary, sales_summary};
