//! Settlement service: the exposed operations of the engine.
//!
//! Wiring (in-memory):
//!
//! ```text
//! command ──► CommandDispatcher ──► InMemoryEventStore ──► InMemoryEventBus
//!                    │                                           │
//!                    │                        OrdersProjection ◄─┘ (resync from the store on gaps)
//!                    └──► InMemoryJobStore ──► JobExecutor ──► inventory / fiscal
//! ```
//!
//! Every mutation is one command producing one event, appended with an
//! optimistic version check. Collaborator side effects are queued only after
//! the append succeeded and never fail the mutation.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, instrument, warn};

use settle_core::{BranchId, DateRange, DomainError, ExpectedVersion, PaymentId};
use settle_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use settle_orders::{
    AbortPaymentProcessing, BeginPaymentProcessing, CancelOrder, Cart, Catalog, CreditNote,
    CustomerDirectory, FiscalService, Inventory, LineDraft, ORDER_AGGREGATE_TYPE, Order,
    OrderCommand, OrderId, OrderStatus, PaymentDraft, PlaceOrder, RecordPayment, RecordReturn,
    ReturnItem, VoidOrder,
};

use super::error::SettlementError;
use super::jobs::{StockMovementPayload, debit_stock_job, fiscal_job, register_handlers, restock_job};
use super::numbering::OrderNumberSequence;
use crate::command_dispatcher::CommandDispatcher;
use crate::config::EngineConfig;
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use crate::external::InMemoryCollaborators;
use crate::jobs::{
    DeadLetterEntry, Enqueued, InMemoryJobStore, Job, JobExecutor, JobExecutorConfig,
    JobExecutorHandle, JobId, JobStats, JobStore, RunReport,
};
use crate::projections::{OrderSummary, OrdersProjection};
use crate::read_model::InMemoryReadStore;
use crate::reports::{
    AccountsReceivable, FinancialInput, FinancialSummary, Liquidation, MonthlyClosure,
    SalesSummary, accounts_receivable, financial_summary, monthly_closure, sales_summary,
};

type OrderDispatcher =
    CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;
type OrderSummaries = OrdersProjection<Arc<InMemoryReadStore<OrderId, OrderSummary>>>;
type CollaboratorJobs = JobExecutor<Arc<InMemoryJobStore>>;

/// Systems the engine calls but does not own.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub inventory: Arc<dyn Inventory>,
    pub fiscal: Arc<dyn FiscalService>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Shared state behind the service and the job handlers.
#[derive(Debug)]
pub(crate) struct Ledger {
    dispatcher: OrderDispatcher,
    orders: OrderSummaries,
    /// Committed events published by the dispatcher, consumed by `orders`.
    feed: Mutex<Subscription<EventEnvelope<JsonValue>>>,
    jobs: Arc<InMemoryJobStore>,
    numbers: OrderNumberSequence,
    config: EngineConfig,
    pub(crate) collaborators: Collaborators,
}

impl Ledger {
    pub(crate) fn load(&self, order_id: OrderId) -> Result<Order, SettlementError> {
        let order = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        if !order.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(order)
    }

    /// Dispatch one command and bring the orders projection up to date.
    pub(crate) fn execute(
        &self,
        order_id: OrderId,
        command: &OrderCommand,
        expected: ExpectedVersion,
    ) -> Result<Order, SettlementError> {
        let out = self.dispatcher.dispatch(
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            command,
            expected,
            |id| Order::empty(OrderId::new(id)),
        )?;

        for stored in &out.committed {
            info!(
                order_id = %order_id,
                event_type = %stored.event_type,
                version = stored.sequence_number,
                status = %out.aggregate.status(),
                "order event committed"
            );
        }

        self.project_published();
        Ok(out.aggregate)
    }

    /// Apply everything published since the last call to the orders
    /// projection. An envelope that arrives ahead of its stream (concurrent
    /// publishers) triggers a resync of that order from the store; the
    /// skipped envelope is then ignored as already applied.
    ///
    /// The commit stands even if the read side lags; the next call catches up.
    fn project_published(&self) {
        let feed = match self.feed.lock() {
            Ok(feed) => feed,
            Err(_) => {
                error!("orders projection feed lock poisoned");
                return;
            }
        };
        for envelope in feed.drain() {
            let Err(e) = self.orders.apply_envelope(&envelope) else {
                continue;
            };
            let order_id = OrderId::new(envelope.aggregate_id());
            debug!(order_id = %order_id, error = %e, "published event out of order, resyncing");
            if let Err(e) = self.orders.sync_stream(self.dispatcher.store(), order_id) {
                error!(order_id = %order_id, error = %e, "orders projection sync failed");
            }
        }
    }

    /// Queue a collaborator call. Failures are logged, never returned: the
    /// ledger commit has already happened.
    fn enqueue(&self, job: Result<Job, SettlementError>) {
        let job = match job {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "failed to build collaborator job");
                return;
            }
        };
        let kind = job.kind.type_name();
        let key = job.idempotency_key.clone();
        match self.jobs.enqueue(job) {
            Ok(Enqueued::New(id)) => debug!(job_id = %id, kind, key = %key, "collaborator job queued"),
            Ok(Enqueued::Duplicate(_)) => {}
            Err(e) => error!(kind, key = %key, error = %e, "failed to queue collaborator job"),
        }
    }
}

/// Facade over the event-sourced order ledger, its read side and the
/// collaborator retry queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SettlementService {
    ledger: Arc<Ledger>,
    executor: Arc<CollaboratorJobs>,
}

impl SettlementService {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let jobs = InMemoryJobStore::arc();

        let feed = Mutex::new(bus.subscribe());

        let ledger = Arc::new(Ledger {
            dispatcher: CommandDispatcher::new(store, bus),
            orders: OrdersProjection::new(Arc::new(InMemoryReadStore::new())),
            feed,
            jobs: jobs.clone(),
            numbers: OrderNumberSequence::new(config.order_number_prefix.clone()),
            config,
            collaborators,
        });

        let mut executor = JobExecutor::new(jobs);
        register_handlers(&mut executor, ledger.clone());

        Self {
            ledger,
            executor: Arc::new(executor),
        }
    }

    /// Service wired to the in-process adapters, which are returned for
    /// seeding and inspection.
    pub fn in_memory(config: EngineConfig) -> (Self, InMemoryCollaborators) {
        let adapters = InMemoryCollaborators::new();
        (Self::new(config, adapters.collaborators()), adapters)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ledger.config
    }

    /// Price a cart and place it as a new order in `pending_payment`.
    #[instrument(skip_all, fields(lines = cart.lines.len()))]
    pub fn build_order(&self, cart: Cart) -> Result<Order, SettlementError> {
        let collaborators = &self.ledger.collaborators;

        let customer = cart
            .customer_id
            .map(|id| {
                collaborators
                    .customers
                    .get_customer(id)
                    .map_err(|e| SettlementError::collaborator("customer directory", e))
            })
            .transpose()?;

        let mut lines = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let product = collaborators
                .catalog
                .get_product(line.product_id)
                .map_err(|e| SettlementError::collaborator("catalog", e))?;
            let draft = LineDraft::new(product, line.quantity);
            lines.push(match &line.discount {
                Some(discount) => draft.with_discount(discount.clone()),
                None => draft,
            });
        }

        let now = Utc::now();
        let order_id = OrderId::generate();
        let branch_id = cart.branch_id.or(self.ledger.config.default_branch);
        let cmd = OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            order_number: self.ledger.numbers.next(now)?,
            customer,
            branch_id,
            lines,
            coupon: cart.coupon,
            occurred_at: now,
        });
        let order = self.ledger.execute(order_id, &cmd, ExpectedVersion::Exact(0))?;

        if let Some(coupon) = order.coupon().filter(|c| !c.is_applied()) {
            info!(order_id = %order_id, code = coupon.code(), "coupon not applied");
        }

        match branch_id {
            Some(branch_id) => {
                for line in order.lines() {
                    let movement = StockMovementPayload {
                        order_id,
                        branch_id,
                        product_id: line.product_id(),
                        quantity: line.quantity,
                    };
                    self.ledger.enqueue(debit_stock_job(
                        order_id,
                        line.line_no,
                        movement,
                        self.ledger.config.retry_policy(),
                    ));
                }
            }
            None => warn!(order_id = %order_id, "no branch for order; stock not debited"),
        }

        info!(
            order_id = %order_id,
            order_number = order.order_number(),
            total = %order.totals().total,
            "order placed"
        );
        Ok(order)
    }

    #[instrument(skip_all, fields(order_id = %order_id, method = ?draft.method))]
    pub fn apply_payment(
        &self,
        order_id: OrderId,
        draft: PaymentDraft,
        expected: ExpectedVersion,
    ) -> Result<Order, SettlementError> {
        let tendered = draft.amount;
        let payment = draft.into_payment(PaymentId::new(), Utc::now())?;
        if let Some(rate) = payment.exchange_rate_applied {
            debug!(
                tendered = %tendered,
                rate = ?rate,
                converted = %payment.amount_crc,
                "payment converted to colones"
            );
        }

        let cmd = OrderCommand::RecordPayment(RecordPayment { order_id, payment });
        let order = self.ledger.execute(order_id, &cmd, expected)?;

        let overpayment = order.overpayment();
        if overpayment.is_positive() {
            warn!(
                order_id = %order_id,
                overpayment = %overpayment,
                total = %order.totals().total,
                "order overpaid"
            );
        }
        if order.status() == OrderStatus::Completed && order.fiscal_identifiers().is_none() {
            self.ledger
                .enqueue(fiscal_job(order_id, self.ledger.config.retry_policy()));
        }
        Ok(order)
    }

    /// Hold the order while a card-terminal authorization is in flight.
    #[instrument(skip(self))]
    pub fn begin_payment_processing(
        &self,
        order_id: OrderId,
        expected: ExpectedVersion,
    ) -> Result<Order, SettlementError> {
        let cmd = OrderCommand::BeginPaymentProcessing(BeginPaymentProcessing {
            order_id,
            occurred_at: Utc::now(),
        });
        self.ledger.execute(order_id, &cmd, expected)
    }

    #[instrument(skip(self))]
    pub fn abort_payment_processing(
        &self,
        order_id: OrderId,
        expected: ExpectedVersion,
    ) -> Result<Order, SettlementError> {
        let cmd = OrderCommand::AbortPaymentProcessing(AbortPaymentProcessing {
            order_id,
            occurred_at: Utc::now(),
        });
        self.ledger.execute(order_id, &cmd, expected)
    }

    /// Record returned units and queue their restock.
    ///
    /// Units go back to `branch_id`, or to the order's branch when omitted.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub fn process_return(
        &self,
        order_id: OrderId,
        items: Vec<ReturnItem>,
        branch_id: Option<BranchId>,
        expected: ExpectedVersion,
    ) -> Result<Order, SettlementError> {
        let branch_id = match branch_id {
            Some(branch) => Some(branch),
            None => self.ledger.load(order_id)?.branch_id(),
        };
        let cmd = OrderCommand::RecordReturn(RecordReturn {
            order_id,
            items,
            branch_id,
            occurred_at: Utc::now(),
        });
        let order = self.ledger.execute(order_id, &cmd, expected)?;

        // Keys are per return record, so earlier records are deduplicated.
        for record in order.returns() {
            match record.branch_id.or(self.ledger.config.default_branch) {
                Some(branch) => self.ledger.enqueue(restock_job(
                    order_id,
                    record,
                    branch,
                    self.ledger.config.retry_policy(),
                )),
                None => warn!(
                    order_id = %order_id,
                    product_id = %record.product_id,
                    "no branch for returned units; not restocked"
                ),
            }
        }
        Ok(order)
    }

    #[instrument(skip(self))]
    pub fn void_order(
        &self,
        order_id: OrderId,
        reason: &str,
        expected: ExpectedVersion,
    ) -> Result<Order, SettlementError> {
        let cmd = OrderCommand::VoidOrder(VoidOrder {
            order_id,
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        self.ledger.execute(order_id, &cmd, expected)
    }

    /// Cancel an unpaid order that is still pending payment.
    #[instrument(skip(self))]
    pub fn cancel_order(
        &self,
        order_id: OrderId,
        reason: &str,
        expected: ExpectedVersion,
    ) -> Result<Order, SettlementError> {
        let cmd = OrderCommand::CancelOrder(CancelOrder {
            order_id,
            reason: reason.to_string(),
            occurred_at: Utc::now(),
        });
        self.ledger.execute(order_id, &cmd, expected)
    }

    /// Current state, rehydrated from the order's event stream.
    pub fn get_order(&self, order_id: OrderId) -> Result<Order, SettlementError> {
        self.ledger.load(order_id)
    }

    pub fn order_summary(&self, order_id: OrderId) -> Result<OrderSummary, SettlementError> {
        self.ledger
            .orders
            .get(&order_id)
            .ok_or_else(|| DomainError::not_found().into())
    }

    /// Orders created in `range`, optionally filtered by status.
    pub fn list_orders(&self, status: Option<OrderStatus>, range: DateRange) -> Vec<OrderSummary> {
        self.ledger.orders.list(status, &range)
    }

    /// Credit note for everything returned so far, at original unit prices.
    pub fn credit_note(&self, order_id: OrderId) -> Result<CreditNote, SettlementError> {
        Ok(self.ledger.load(order_id)?.credit_note()?)
    }

    pub fn accounts_receivable(&self, range: DateRange) -> AccountsReceivable {
        accounts_receivable(&self.ledger.orders.list_all(), range)
    }

    pub fn sales_summary(&self, range: DateRange) -> SalesSummary {
        sales_summary(&self.ledger.orders.list_all(), range)
    }

    pub fn daily_sales(&self, day: NaiveDate) -> SalesSummary {
        self.sales_summary(DateRange::day(day))
    }

    pub fn monthly_sales(&self, year: i32, month: u32) -> Result<SalesSummary, SettlementError> {
        Ok(self.sales_summary(DateRange::month(year, month)?))
    }

    pub fn financial_summary(
        &self,
        range: DateRange,
        input: &FinancialInput,
    ) -> Result<FinancialSummary, SettlementError> {
        Ok(financial_summary(&self.ledger.orders.list_all(), range, input)?)
    }

    pub fn monthly_closure(
        &self,
        range: DateRange,
        liquidations: &[Liquidation],
    ) -> Result<MonthlyClosure, SettlementError> {
        Ok(monthly_closure(liquidations, range)?)
    }

    /// Run every collaborator job that is due now, on the calling thread.
    #[instrument(skip(self))]
    pub fn run_collaborator_jobs(&self) -> Result<RunReport, SettlementError> {
        let report = self.executor.run_due()?;
        if report.processed > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                retried = report.retried,
                dead_lettered = report.dead_lettered,
                "collaborator jobs run"
            );
        }
        Ok(report)
    }

    /// Run collaborator jobs on a background thread until the handle is shut down.
    pub fn spawn_job_worker(&self) -> std::io::Result<JobExecutorHandle> {
        let config = JobExecutorConfig::default().with_poll_interval(self.ledger.config.job_poll_interval);
        self.executor.clone().spawn(config)
    }

    pub fn job_stats(&self) -> Result<JobStats, SettlementError> {
        Ok(self.ledger.jobs.stats()?)
    }

    pub fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, SettlementError> {
        Ok(self.ledger.jobs.list_dead_letters(limit)?)
    }

    /// Requeue a dead-lettered job with a fresh attempt budget.
    pub fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, SettlementError> {
        let job = self.ledger.jobs.retry_dead_letter(job_id)?;
        info!(job_id = %job_id, kind = job.kind.type_name(), "dead-lettered job requeued");
        Ok(job)
    }

    /// Rebuild the orders projection from the full event history.
    #[instrument(skip(self))]
    pub fn rebuild_projections(&self) -> Result<usize, SettlementError> {
        let history = self
            .ledger
            .dispatcher
            .store()
            .load_all()
            .map_err(|e| SettlementError::Infrastructure(e.to_string()))?;
        let count = history.len();
        self.ledger
            .orders
            .rebuild_from_scratch(history.iter().map(StoredEvent::to_envelope))?;
        info!(events = count, "orders projection rebuilt");
        Ok(count)
    }
}
