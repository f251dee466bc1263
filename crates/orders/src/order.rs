use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use settle_core::{
    Aggregate, AggregateId, AggregateRoot, BranchId, DomainError, DomainResult, Money, ProductId, ReturnRecordId,
};
use settle_events::Event;

use crate::collaborators::{CustomerSnapshot, FiscalIdentifiers};
use crate::discount::{Coupon, CouponOutcome};
use crate::payment::{Payment, amount_paid_total};
use crate::pricing::{LEDGER_CURRENCY, LineDraft, LineItem, OrderTotals, price_order};
use crate::returns::{
    CreditNote, ReturnItem, ReturnRecord, credit_value, is_fully_returned, plan_return,
    returned_quantities,
};
use crate::status::{Lifecycle, OrderStatus, StatusTrigger};

/// Aggregate type of order streams in the event store.
pub const ORDER_AGGREGATE_TYPE: &str = "settlement.order";

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for OrderId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Aggregate root: Order.
///
/// Lines, coupon outcome and totals are frozen when the order is placed.
/// Payments and returns are append-only. The status only moves through
/// [`Lifecycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    created: bool,
    order_number: String,
    customer: Option<CustomerSnapshot>,
    branch_id: Option<BranchId>,
    lines: Vec<LineItem>,
    coupon: Option<CouponOutcome>,
    totals: OrderTotals,
    payments: Vec<Payment>,
    returns: Vec<ReturnRecord>,
    lifecycle: Lifecycle,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    voided_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    fiscal: Option<FiscalIdentifiers>,
    version: u64,
}

impl Order {
    /// Create an empty, not-yet-placed aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            created: false,
            order_number: String::new(),
            customer: None,
            branch_id: None,
            lines: Vec::new(),
            coupon: None,
            totals: OrderTotals::zero(),
            payments: Vec::new(),
            returns: Vec::new(),
            lifecycle: Lifecycle::new(),
            created_at: DateTime::<Utc>::default(),
            completed_at: None,
            voided_at: None,
            void_reason: None,
            cancelled_at: None,
            cancel_reason: None,
            fiscal: None,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn customer(&self) -> Option<&CustomerSnapshot> {
        self.customer.as_ref()
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn coupon(&self) -> Option<&CouponOutcome> {
        self.coupon.as_ref()
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn returns(&self) -> &[ReturnRecord] {
        &self.returns
    }

    pub fn status(&self) -> OrderStatus {
        self.lifecycle.status()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn voided_at(&self) -> Option<DateTime<Utc>> {
        self.voided_at
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn fiscal_identifiers(&self) -> Option<&FiscalIdentifiers> {
        self.fiscal.as_ref()
    }

    /// `Σ amount_crc` over recorded payments.
    pub fn amount_paid_total(&self) -> Money {
        amount_paid_total(&self.payments)
    }

    /// `max(0, total - paid)`.
    pub fn balance_due(&self) -> Money {
        Money::new(
            self.totals.total.amount() - self.amount_paid_total().amount(),
            LEDGER_CURRENCY,
        )
        .floor_zero()
    }

    /// Amount paid beyond the total, if any.
    pub fn overpayment(&self) -> Money {
        Money::new(
            self.amount_paid_total().amount() - self.totals.total.amount(),
            LEDGER_CURRENCY,
        )
        .floor_zero()
    }

    pub fn returned_quantity(&self, product_id: ProductId) -> i64 {
        returned_quantities(&self.returns)
            .get(&product_id)
            .copied()
            .unwrap_or(0)
    }

    /// Stored events were decided by the same status table, so a
    /// disagreement here means a corrupt stream.
    fn replay_status(&mut self, trigger: StatusTrigger, recorded: OrderStatus) {
        let replayed = self.lifecycle.replay(trigger, recorded);
        debug_assert!(
            replayed.is_ok(),
            "stored event disagrees with the status table: {replayed:?}"
        );
    }

    /// Credit-note view derived from the returns recorded so far.
    pub fn credit_note(&self) -> DomainResult<CreditNote> {
        CreditNote::from_records(&self.lines, &self.returns)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder (build and freeze a priced order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer: Option<CustomerSnapshot>,
    pub branch_id: Option<BranchId>,
    pub lines: Vec<LineDraft>,
    pub coupon: Option<Coupon>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BeginPaymentProcessing (card authorization in flight).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginPaymentProcessing {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AbortPaymentProcessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortPaymentProcessing {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub order_id: OrderId,
    pub payment: Payment,
}

/// Command: RecordReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReturn {
    pub order_id: OrderId,
    pub items: Vec<ReturnItem>,
    /// Branch receiving the goods (restock target).
    pub branch_id: Option<BranchId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidOrder {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignFiscalIdentifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignFiscalIdentifiers {
    pub order_id: OrderId,
    pub identifiers: FiscalIdentifiers,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    BeginPaymentProcessing(BeginPaymentProcessing),
    AbortPaymentProcessing(AbortPaymentProcessing),
    RecordPayment(RecordPayment),
    RecordReturn(RecordReturn),
    VoidOrder(VoidOrder),
    CancelOrder(CancelOrder),
    AssignFiscalIdentifiers(AssignFiscalIdentifiers),
}

impl OrderCommand {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderCommand::PlaceOrder(c) => c.order_id,
            OrderCommand::BeginPaymentProcessing(c) => c.order_id,
            OrderCommand::AbortPaymentProcessing(c) => c.order_id,
            OrderCommand::RecordPayment(c) => c.order_id,
            OrderCommand::RecordReturn(c) => c.order_id,
            OrderCommand::VoidOrder(c) => c.order_id,
            OrderCommand::CancelOrder(c) => c.order_id,
            OrderCommand::AssignFiscalIdentifiers(c) => c.order_id,
        }
    }
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer: Option<CustomerSnapshot>,
    pub branch_id: Option<BranchId>,
    pub lines: Vec<LineItem>,
    pub coupon: Option<CouponOutcome>,
    pub totals: OrderTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentProcessingStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProcessingStarted {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentProcessingAborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProcessingAborted {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
///
/// Carries the ledger figures after the payment so read models need no replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub order_id: OrderId,
    pub payment: Payment,
    pub amount_paid_total: Money,
    pub balance_due: Money,
    pub overpayment: Money,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRecorded {
    pub order_id: OrderId,
    pub records: Vec<ReturnRecord>,
    pub branch_id: Option<BranchId>,
    /// Credit-note value of this batch.
    pub credit_value: Money,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderVoided {
    pub order_id: OrderId,
    pub reason: String,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub reason: String,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FiscalIdentifiersAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalIdentifiersAssigned {
    pub order_id: OrderId,
    pub identifiers: FiscalIdentifiers,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    PaymentProcessingStarted(PaymentProcessingStarted),
    PaymentProcessingAborted(PaymentProcessingAborted),
    PaymentRecorded(PaymentRecorded),
    ReturnRecorded(ReturnRecorded),
    OrderVoided(OrderVoided),
    OrderCancelled(OrderCancelled),
    FiscalIdentifiersAssigned(FiscalIdentifiersAssigned),
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::OrderPlaced(e) => e.order_id,
            OrderEvent::PaymentProcessingStarted(e) => e.order_id,
            OrderEvent::PaymentProcessingAborted(e) => e.order_id,
            OrderEvent::PaymentRecorded(e) => e.order_id,
            OrderEvent::ReturnRecorded(e) => e.order_id,
            OrderEvent::OrderVoided(e) => e.order_id,
            OrderEvent::OrderCancelled(e) => e.order_id,
            OrderEvent::FiscalIdentifiersAssigned(e) => e.order_id,
        }
    }
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "settlement.order.placed",
            OrderEvent::PaymentProcessingStarted(_) => "settlement.order.payment_processing_started",
            OrderEvent::PaymentProcessingAborted(_) => "settlement.order.payment_processing_aborted",
            OrderEvent::PaymentRecorded(_) => "settlement.order.payment_recorded",
            OrderEvent::ReturnRecorded(_) => "settlement.order.return_recorded",
            OrderEvent::OrderVoided(_) => "settlement.order.voided",
            OrderEvent::OrderCancelled(_) => "settlement.order.cancelled",
            OrderEvent::FiscalIdentifiersAssigned(_) => {
                "settlement.order.fiscal_identifiers_assigned"
            }
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::PaymentProcessingStarted(e) => e.occurred_at,
            OrderEvent::PaymentProcessingAborted(e) => e.occurred_at,
            OrderEvent::PaymentRecorded(e) => e.occurred_at,
            OrderEvent::ReturnRecorded(e) => e.occurred_at,
            OrderEvent::OrderVoided(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::FiscalIdentifiersAssigned(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.created = true;
                self.order_number = e.order_number.clone();
                self.customer = e.customer.clone();
                self.branch_id = e.branch_id;
                self.lines = e.lines.clone();
                self.coupon = e.coupon.clone();
                self.totals = e.totals;
                self.lifecycle = Lifecycle::new();
                self.created_at = e.occurred_at;
            }
            OrderEvent::PaymentProcessingStarted(e) => {
                self.replay_status(StatusTrigger::BeginProcessing, e.status);
            }
            OrderEvent::PaymentProcessingAborted(e) => {
                let has_payments = !self.payments.is_empty();
                self.replay_status(StatusTrigger::AbortProcessing { has_payments }, e.status);
            }
            OrderEvent::PaymentRecorded(e) => {
                self.payments.push(e.payment.clone());
                let settled = self.balance_due().is_zero();
                self.replay_status(StatusTrigger::PaymentRecorded { settled }, e.status);
                if self.status() == OrderStatus::Completed && self.completed_at.is_none() {
                    self.completed_at = Some(e.occurred_at);
                }
            }
            OrderEvent::ReturnRecorded(e) => {
                self.returns.extend(e.records.iter().cloned());
                let full = is_fully_returned(&self.lines, &self.returns);
                self.replay_status(StatusTrigger::ReturnRecorded { full }, e.status);
            }
            OrderEvent::OrderVoided(e) => {
                self.replay_status(StatusTrigger::Void, e.status);
                self.voided_at = Some(e.occurred_at);
                self.void_reason = Some(e.reason.clone());
            }
            OrderEvent::OrderCancelled(e) => {
                self.replay_status(StatusTrigger::Cancel, e.status);
                self.cancelled_at = Some(e.occurred_at);
                self.cancel_reason = Some(e.reason.clone());
            }
            OrderEvent::FiscalIdentifiersAssigned(e) => {
                self.fiscal = Some(e.identifiers.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if !matches!(command, OrderCommand::PlaceOrder(_)) {
            self.ensure_exists(command.order_id())?;
        }
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::BeginPaymentProcessing(cmd) => self.handle_begin_processing(cmd),
            OrderCommand::AbortPaymentProcessing(cmd) => self.handle_abort_processing(cmd),
            OrderCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            OrderCommand::RecordReturn(cmd) => self.handle_return(cmd),
            OrderCommand::VoidOrder(cmd) => self.handle_void(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::AssignFiscalIdentifiers(cmd) => self.handle_fiscal(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invalid_id(format!(
                "command for order {order_id} sent to order {}",
                self.id
            )));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::concurrent_modification(format!(
                "order {} already exists",
                self.id
            )));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::invalid_id("order number is empty"));
        }

        let priced = price_order(&cmd.lines, cmd.coupon.as_ref())?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            customer: cmd.customer.clone(),
            branch_id: cmd.branch_id,
            lines: priced.lines,
            coupon: priced.coupon,
            totals: priced.totals,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_begin_processing(
        &self,
        cmd: &BeginPaymentProcessing,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        let status = self.lifecycle.peek(StatusTrigger::BeginProcessing)?;
        Ok(vec![OrderEvent::PaymentProcessingStarted(
            PaymentProcessingStarted {
                order_id: cmd.order_id,
                status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_abort_processing(
        &self,
        cmd: &AbortPaymentProcessing,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        let status = self.lifecycle.peek(StatusTrigger::AbortProcessing {
            has_payments: !self.payments.is_empty(),
        })?;
        Ok(vec![OrderEvent::PaymentProcessingAborted(
            PaymentProcessingAborted {
                order_id: cmd.order_id,
                status,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<OrderEvent>, DomainError> {
        let current = self.status();
        if !current.accepts_payments() {
            return Err(DomainError::OrderNotPayable {
                status: current.as_str(),
            });
        }

        let payment = &cmd.payment;
        payment.validate()?;
        if self
            .payments
            .iter()
            .any(|p| p.payment_id == payment.payment_id)
        {
            return Err(DomainError::invalid_payment(format!(
                "payment {} already recorded",
                payment.payment_id
            )));
        }

        let balance = self.balance_due();
        if payment.amount_crc.is_zero() && !balance.is_zero() {
            return Err(DomainError::invalid_payment(format!(
                "zero payment against an open balance of {balance}"
            )));
        }

        let total = self.totals.total;
        let paid = self
            .amount_paid_total()
            .checked_add(payment.amount_crc)
            .map_err(|_| DomainError::invalid_payment("amount paid out of range"))?;
        let balance_due = total.checked_sub(paid)?.floor_zero();
        let overpayment = paid.checked_sub(total)?.floor_zero();

        let status = self.lifecycle.peek(StatusTrigger::PaymentRecorded {
            settled: balance_due.is_zero(),
        })?;

        Ok(vec![OrderEvent::PaymentRecorded(PaymentRecorded {
            order_id: cmd.order_id,
            payment: payment.clone(),
            amount_paid_total: paid,
            balance_due,
            overpayment,
            status,
            occurred_at: payment.recorded_at,
        })])
    }

    fn handle_return(&self, cmd: &RecordReturn) -> Result<Vec<OrderEvent>, DomainError> {
        // State first: a return against a non-returnable order is a stale view.
        self.lifecycle
            .peek(StatusTrigger::ReturnRecorded { full: false })?;

        let plan = plan_return(&self.lines, &self.returns, &cmd.items)?;
        let records: Vec<ReturnRecord> = plan
            .into_iter()
            .map(|item| ReturnRecord {
                return_record_id: ReturnRecordId::new(),
                product_id: item.product_id,
                quantity_returned: item.quantity,
                returned_at: cmd.occurred_at,
                reason: item.reason,
                branch_id: cmd.branch_id,
            })
            .collect();

        let mut all = self.returns.clone();
        all.extend(records.iter().cloned());
        let full = is_fully_returned(&self.lines, &all);
        let status = self
            .lifecycle
            .peek(StatusTrigger::ReturnRecorded { full })?;

        Ok(vec![OrderEvent::ReturnRecorded(ReturnRecorded {
            order_id: cmd.order_id,
            credit_value: credit_value(&self.lines, &records)?,
            records,
            branch_id: cmd.branch_id,
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidOrder) -> Result<Vec<OrderEvent>, DomainError> {
        let status = self.lifecycle.peek(StatusTrigger::Void)?;
        Ok(vec![OrderEvent::OrderVoided(OrderVoided {
            order_id: cmd.order_id,
            reason: cmd.reason.trim().to_string(),
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.payments.is_empty() {
            return Err(DomainError::IllegalStatusTransition {
                from: self.status().as_str(),
                trigger: StatusTrigger::Cancel.name(),
            });
        }
        let status = self.lifecycle.peek(StatusTrigger::Cancel)?;
        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            reason: cmd.reason.trim().to_string(),
            status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fiscal(&self, cmd: &AssignFiscalIdentifiers) -> Result<Vec<OrderEvent>, DomainError> {
        if self.completed_at.is_none() {
            return Err(DomainError::FiscalAssignmentRejected(format!(
                "order {} has not completed",
                self.order_number
            )));
        }
        if self.fiscal.is_some() {
            return Err(DomainError::FiscalAssignmentRejected(format!(
                "order {} already has fiscal identifiers",
                self.order_number
            )));
        }
        if cmd.identifiers.clave.trim().is_empty() || cmd.identifiers.consecutivo.trim().is_empty()
        {
            return Err(DomainError::FiscalAssignmentRejected(
                "clave and consecutivo are required".to_string(),
            ));
        }

        Ok(vec![OrderEvent::FiscalIdentifiersAssigned(
            FiscalIdentifiersAssigned {
                order_id: cmd.order_id,
                identifiers: cmd.identifiers.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
