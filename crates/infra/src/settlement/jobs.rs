//! Collaborator side effects of committed orders, run through the retry queue.
//!
//! | job                          | key                                    | enqueued when            |
//! |------------------------------|----------------------------------------|--------------------------|
//! | `inventory.debit_stock`      | `debit:{order}:{line_no}`              | order placed with branch |
//! | `inventory.restock`          | `restock:{order}:{product}:{record}`   | return recorded          |
//! | `fiscal.assign_identifiers`  | `fiscal:{order}`                       | order first completes    |

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use settle_core::{AggregateRoot, BranchId, DomainError, ExpectedVersion, ProductId};
use settle_orders::{
    AssignFiscalIdentifiers, CollaboratorError, OrderCommand, OrderId, ReturnRecord,
};

use super::error::SettlementError;
use super::service::Ledger;
use crate::jobs::{Job, JobExecutor, JobKind, JobResult, JobStore, RetryPolicy};

/// Payload of stock debit and restock jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementPayload {
    pub order_id: OrderId,
    pub branch_id: BranchId,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Payload of fiscal identifier jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalPayload {
    pub order_id: OrderId,
}

pub(crate) fn debit_stock_job(
    order_id: OrderId,
    line_no: u32,
    movement: StockMovementPayload,
    policy: RetryPolicy,
) -> Result<Job, SettlementError> {
    payload_job(JobKind::DebitStock, format!("debit:{order_id}:{line_no}"), &movement, policy)
}

pub(crate) fn restock_job(
    order_id: OrderId,
    record: &ReturnRecord,
    branch_id: BranchId,
    policy: RetryPolicy,
) -> Result<Job, SettlementError> {
    let movement = StockMovementPayload {
        order_id,
        branch_id,
        product_id: record.product_id,
        quantity: record.quantity_returned,
    };
    payload_job(
        JobKind::Restock,
        format!("restock:{order_id}:{}:{}", record.product_id, record.return_record_id),
        &movement,
        policy,
    )
}

pub(crate) fn fiscal_job(order_id: OrderId, policy: RetryPolicy) -> Result<Job, SettlementError> {
    payload_job(
        JobKind::AssignFiscalIdentifiers,
        format!("fiscal:{order_id}"),
        &FiscalPayload { order_id },
        policy,
    )
}

fn payload_job<T: Serialize>(
    kind: JobKind,
    key: String,
    payload: &T,
    policy: RetryPolicy,
) -> Result<Job, SettlementError> {
    let payload = serde_json::to_value(payload)
        .map_err(|e| SettlementError::Infrastructure(format!("job payload: {e}")))?;
    Ok(Job::new(kind, key, payload).with_retry_policy(policy))
}

/// Map a collaborator outcome onto the retry queue's vocabulary.
fn outcome(result: Result<(), CollaboratorError>) -> JobResult {
    match result {
        Ok(()) => JobResult::Success,
        Err(e) if e.is_retryable() => JobResult::Failure(e.to_string()),
        Err(e) => JobResult::Abandon(e.to_string()),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(job: &Job) -> Result<T, JobResult> {
    serde_json::from_value(job.payload.clone())
        .map_err(|e| JobResult::Abandon(format!("malformed payload: {e}")))
}

/// Register the handlers for every collaborator job kind.
pub(crate) fn register_handlers<S>(executor: &mut JobExecutor<S>, ledger: Arc<Ledger>)
where
    S: JobStore + 'static,
{
    let inventory = ledger.collaborators.inventory.clone();
    executor.register_handler(JobKind::DebitStock.type_name(), move |job| {
        match decode::<StockMovementPayload>(job) {
            Ok(m) => outcome(inventory.debit_stock(
                &job.idempotency_key,
                m.branch_id,
                m.product_id,
                m.quantity,
            )),
            Err(abandon) => abandon,
        }
    });

    let inventory = ledger.collaborators.inventory.clone();
    executor.register_handler(JobKind::Restock.type_name(), move |job| {
        match decode::<StockMovementPayload>(job) {
            Ok(m) => outcome(inventory.restock(
                &job.idempotency_key,
                m.branch_id,
                m.product_id,
                m.quantity,
            )),
            Err(abandon) => abandon,
        }
    });

    executor.register_handler(JobKind::AssignFiscalIdentifiers.type_name(), move |job| {
        match decode::<FiscalPayload>(job) {
            Ok(p) => assign_fiscal_identifiers(&ledger, p.order_id),
            Err(abandon) => abandon,
        }
    });
}

fn assign_fiscal_identifiers(ledger: &Ledger, order_id: OrderId) -> JobResult {
    let order = match ledger.load(order_id) {
        Ok(order) => order,
        Err(e @ SettlementError::Domain(DomainError::NotFound)) => {
            return JobResult::Abandon(e.to_string());
        }
        Err(e) => return JobResult::Failure(e.to_string()),
    };
    if order.fiscal_identifiers().is_some() {
        return JobResult::Success;
    }

    let identifiers = match ledger.collaborators.fiscal.assign_invoice_identifiers(&order) {
        Ok(ids) => ids,
        Err(e) if e.is_retryable() => return JobResult::Failure(e.to_string()),
        Err(e) => return JobResult::Abandon(e.to_string()),
    };

    let cmd = OrderCommand::AssignFiscalIdentifiers(AssignFiscalIdentifiers {
        order_id,
        identifiers,
        occurred_at: Utc::now(),
    });
    match ledger.execute(order_id, &cmd, ExpectedVersion::Exact(order.version())) {
        Ok(order) => {
            info!(
                order_id = %order_id,
                order_number = order.order_number(),
                "fiscal identifiers assigned"
            );
            JobResult::Success
        }
        Err(SettlementError::Concurrency(msg)) => JobResult::Failure(msg),
        Err(SettlementError::Domain(DomainError::FiscalAssignmentRejected(msg))) => {
            // Another attempt may have won the race.
            match ledger.load(order_id) {
                Ok(o) if o.fiscal_identifiers().is_some() => JobResult::Success,
                _ => {
                    warn!(order_id = %order_id, reason = %msg, "fiscal identifiers rejected");
                    JobResult::Abandon(msg)
                }
            }
        }
        Err(e) => JobResult::Failure(e.to_string()),
    }
}
