//! Orders projection: one summary row per order.
//!
//! Feeds order listing, accounts receivable and the sales reports. Rows are
//! built purely from `settlement.order.*` events; the aggregate is never
//! consulted.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use settle_core::{AggregateId, BranchId, CustomerId, DateRange, Money, PaymentId};
use settle_events::EventEnvelope;
use settle_orders::{
    FiscalIdentifiers, ORDER_AGGREGATE_TYPE, OrderEvent, OrderId, OrderStatus, PaymentMethod,
};

use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::ReadStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPaymentSummary {
    pub payment_id: PaymentId,
    pub method: PaymentMethod,
    pub amount_crc: Money,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReturnSummary {
    pub returned_at: DateTime<Utc>,
    pub units: i64,
    /// Credit-note value of this return (returned units × original unit price).
    pub credit_value: Money,
}

/// Read model: order header, frozen totals and running ledger figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub branch_id: Option<BranchId>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub units: i64,
    pub subtotal: Money,
    /// Item discounts plus the applied coupon.
    pub discount_total: Money,
    pub tax: Money,
    pub total: Money,
    pub amount_paid: Money,
    pub balance_due: Money,
    pub overpayment: Money,
    pub payments: Vec<OrderPaymentSummary>,
    pub returns: Vec<OrderReturnSummary>,
    pub returned_value: Money,
    pub fiscal: Option<FiscalIdentifiers>,
    /// Sequence number of the last applied event.
    pub version: u64,
}

#[derive(Debug, Error)]
pub enum OrderProjectionError {
    #[error("failed to deserialize order event: {0}")]
    Deserialize(String),

    #[error("stream mismatch: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown order {0}")]
    UnknownOrder(OrderId),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("projection cursor lock poisoned")]
    Poisoned,
}

/// Orders projection over any [`ReadStore`].
///
/// Cursors hold the last applied sequence number per order stream. The
/// cursor lock is held while an event is applied, so concurrent syncs of the
/// same stream never interleave.
#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderSummary>,
{
    store: S,
    cursors: Mutex<HashMap<AggregateId, u64>>,
}

impl<S> OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<OrderSummary> {
        self.store.get(order_id)
    }

    /// Every order, oldest first.
    pub fn list_all(&self) -> Vec<OrderSummary> {
        let mut rows = self.store.list();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.order_number.cmp(&b.order_number))
        });
        rows
    }

    /// Orders created within `range`, optionally in one status, oldest first.
    pub fn list(&self, status: Option<OrderStatus>, range: &DateRange) -> Vec<OrderSummary> {
        self.list_all()
            .into_iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .filter(|o| range.contains(o.created_at))
            .collect()
    }

    /// Last applied sequence number for an order stream (0 when unseen).
    pub fn cursor(&self, order_id: OrderId) -> Result<u64, OrderProjectionError> {
        let cursors = self.cursors.lock().map_err(|_| OrderProjectionError::Poisoned)?;
        Ok(cursors.get(&order_id.0).copied().unwrap_or(0))
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderProjectionError> {
        let mut cursors = self.cursors.lock().map_err(|_| OrderProjectionError::Poisoned)?;
        self.apply_locked(&mut cursors, envelope)
    }

    /// Catch one order up with its stream in the event store.
    ///
    /// Events already applied are skipped, so calling this after every
    /// command (or twice for the same command) is safe.
    pub fn sync_stream<E: EventStore + ?Sized>(
        &self,
        events: &E,
        order_id: OrderId,
    ) -> Result<Option<OrderSummary>, OrderProjectionError> {
        let mut cursors = self.cursors.lock().map_err(|_| OrderProjectionError::Poisoned)?;
        let last = cursors.get(&order_id.0).copied().unwrap_or(0);

        for stored in events.load_stream(order_id.0)? {
            if stored.sequence_number > last {
                self.apply_locked(&mut cursors, &stored.to_envelope())?;
            }
        }
        Ok(self.store.get(&order_id))
    }

    /// Drop every row and replay the given history.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), OrderProjectionError> {
        let mut cursors = self.cursors.lock().map_err(|_| OrderProjectionError::Poisoned)?;
        self.store.clear();
        cursors.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_locked(&mut cursors, env)?;
        }
        Ok(())
    }

    fn apply_locked(
        &self,
        cursors: &mut HashMap<AggregateId, u64>,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderProjectionError> {
        if envelope.aggregate_type() != ORDER_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(OrderProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(OrderProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OrderProjectionError::Deserialize(e.to_string()))?;

        let order_id = ev.order_id();
        if order_id.0 != aggregate_id {
            return Err(OrderProjectionError::StreamMismatch(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut row = match &ev {
            OrderEvent::OrderPlaced(e) => {
                let items_discount = e.totals.items_discount.amount();
                let order_discount = e.totals.order_discount.amount();
                let zero = Money::zero(e.totals.total.currency());
                OrderSummary {
                    order_id,
                    order_number: e.order_number.clone(),
                    customer_id: e.customer.as_ref().map(|c| c.customer_id),
                    customer_name: e.customer.as_ref().map(|c| c.name.clone()),
                    branch_id: e.branch_id,
                    status: OrderStatus::PendingPayment,
                    created_at: e.occurred_at,
                    completed_at: None,
                    voided_at: None,
                    cancelled_at: None,
                    units: e.lines.iter().map(|l| l.quantity).sum(),
                    subtotal: e.totals.subtotal_original,
                    discount_total: Money::new(
                        items_discount + order_discount,
                        e.totals.total.currency(),
                    ),
                    tax: e.totals.tax,
                    total: e.totals.total,
                    amount_paid: zero,
                    balance_due: e.totals.total,
                    overpayment: zero,
                    payments: vec![],
                    returns: vec![],
                    returned_value: zero,
                    fiscal: None,
                    version: 0,
                }
            }
            _ => self
                .store
                .get(&order_id)
                .ok_or(OrderProjectionError::UnknownOrder(order_id))?,
        };

        match ev {
            OrderEvent::OrderPlaced(_) => {}
            OrderEvent::PaymentProcessingStarted(e) => row.status = e.status,
            OrderEvent::PaymentProcessingAborted(e) => row.status = e.status,
            OrderEvent::PaymentRecorded(e) => {
                row.payments.push(OrderPaymentSummary {
                    payment_id: e.payment.payment_id,
                    method: e.payment.method,
                    amount_crc: e.payment.amount_crc,
                    recorded_at: e.payment.recorded_at,
                });
                row.amount_paid = e.amount_paid_total;
                row.balance_due = e.balance_due;
                row.overpayment = e.overpayment;
                row.status = e.status;
                if e.status == OrderStatus::Completed && row.completed_at.is_none() {
                    row.completed_at = Some(e.occurred_at);
                }
            }
            OrderEvent::ReturnRecorded(e) => {
                row.returns.push(OrderReturnSummary {
                    returned_at: e.occurred_at,
                    units: e.records.iter().map(|r| r.quantity_returned).sum(),
                    credit_value: e.credit_value,
                });
                row.returned_value = Money::new(
                    row.returned_value.amount() + e.credit_value.amount(),
                    row.returned_value.currency(),
                );
                row.status = e.status;
            }
            OrderEvent::OrderVoided(e) => {
                row.status = e.status;
                row.voided_at = Some(e.occurred_at);
            }
            OrderEvent::OrderCancelled(e) => {
                row.status = e.status;
                row.cancelled_at = Some(e.occurred_at);
            }
            OrderEvent::FiscalIdentifiersAssigned(e) => row.fiscal = Some(e.identifiers),
        }

        row.version = seq;
        self.store.upsert(order_id, row);
        cursors.insert(aggregate_id, seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone};
    use proptest::prelude::*;
    use settle_core::{AggregateRoot, ExpectedVersion, ProductId, TaxRate};
    use settle_events::InMemoryEventBus;
    use settle_orders::{
        LineDraft, Order, OrderCommand, PaymentDraft, PlaceOrder, ProductSnapshot, RecordPayment,
        RecordReturn, ReturnItem,
    };
    use uuid::Uuid;

    use crate::command_dispatcher::CommandDispatcher;
    use crate::event_store::{InMemoryEventStore, StoredEvent};
    use crate::read_model::InMemoryReadStore;

    type Store = Arc<InMemoryEventStore>;
    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn projection() -> OrdersProjection<InMemoryReadStore<OrderId, OrderSummary>> {
        OrdersProjection::new(InMemoryReadStore::new())
    }

    fn dispatcher() -> CommandDispatcher<Store, Bus> {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 15, 0, 0).unwrap()
    }

    fn send(d: &CommandDispatcher<Store, Bus>, order_id: OrderId, cmd: OrderCommand) -> Vec<StoredEvent> {
        d.dispatch(order_id.0, ORDER_AGGREGATE_TYPE, &cmd, ExpectedVersion::Any, |id| {
            Order::empty(OrderId::new(id))
        })
        .unwrap()
        .committed
    }

    /// 2 × ¢10,000 @ 13% = ¢22,600, placed on 2025-03-`day`.
    fn place(d: &CommandDispatcher<Store, Bus>, day: u32) -> (OrderId, ProductId) {
        let order_id = OrderId::generate();
        let product = ProductSnapshot {
            product_id: ProductId::new(),
            name: "Lentes".to_string(),
            sku: "LEN-01".to_string(),
            category: None,
            unit_price: Money::crc_major(10_000),
            iva_rate: TaxRate::STANDARD,
        };
        let pid = product.product_id;
        send(
            d,
            order_id,
            OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                order_number: format!("ORD-202503{day:02}-00001"),
                customer: None,
                branch_id: None,
                lines: vec![LineDraft::new(product, 2)],
                coupon: None,
                occurred_at: at(day),
            }),
        );
        (order_id, pid)
    }

    fn pay(d: &CommandDispatcher<Store, Bus>, order_id: OrderId, major: i64, day: u32) {
        let payment = PaymentDraft::cash(Money::crc_major(major))
            .into_payment(PaymentId::new(), at(day))
            .unwrap();
        send(d, order_id, OrderCommand::RecordPayment(RecordPayment { order_id, payment }));
    }

    #[test]
    fn sync_builds_the_summary_and_is_idempotent() {
        let d = dispatcher();
        let proj = projection();
        let (order_id, pid) = place(&d, 1);
        pay(&d, order_id, 22_600, 2);
        send(
            &d,
            order_id,
            OrderCommand::RecordReturn(RecordReturn {
                order_id,
                items: vec![ReturnItem::new(pid, 1)],
                branch_id: None,
                occurred_at: at(3),
            }),
        );

        let row = proj.sync_stream(d.store(), order_id).unwrap().unwrap();
        assert_eq!(row.status, OrderStatus::PartiallyReturned);
        assert_eq!(row.total, Money::crc_major(22_600));
        assert_eq!(row.amount_paid, Money::crc_major(22_600));
        assert!(row.balance_due.is_zero());
        assert_eq!(row.completed_at, Some(at(2)));
        assert_eq!(row.returned_value, Money::crc_major(10_000));
        assert_eq!(row.units, 2);
        assert_eq!(row.version, 3);

        let again = proj.sync_stream(d.store(), order_id).unwrap().unwrap();
        assert_eq!(again, row);
        assert_eq!(proj.cursor(order_id).unwrap(), 3);
    }

    #[test]
    fn duplicate_delivery_is_ignored_and_gaps_are_rejected() {
        let d = dispatcher();
        let proj = projection();
        let (order_id, _) = place(&d, 1);
        pay(&d, order_id, 1_000, 1);
        pay(&d, order_id, 1_000, 1);

        let stream = d.store().load_stream(order_id.0).unwrap();
        proj.apply_envelope(&stream[0].to_envelope()).unwrap();
        proj.apply_envelope(&stream[0].to_envelope()).unwrap();
        assert_eq!(proj.cursor(order_id).unwrap(), 1);

        let err = proj.apply_envelope(&stream[2].to_envelope()).unwrap_err();
        assert!(matches!(
            err,
            OrderProjectionError::NonMonotonicSequence { last: 1, found: 3 }
        ));
    }

    #[test]
    fn event_without_a_placed_order_is_an_error() {
        let proj = projection();
        let order_id = OrderId::generate();
        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            1,
            "settlement.order.voided",
            at(1),
            serde_json::to_value(OrderEvent::OrderVoided(settle_orders::OrderVoided {
                order_id,
                reason: "x".to_string(),
                status: OrderStatus::Voided,
                occurred_at: at(1),
            }))
            .unwrap(),
        );
        assert!(matches!(
            proj.apply_envelope(&envelope),
            Err(OrderProjectionError::UnknownOrder(id)) if id == order_id
        ));
    }

    #[test]
    fn rebuild_matches_incremental_state() {
        let d = dispatcher();
        let incremental = projection();
        let (a, _) = place(&d, 1);
        let (b, _) = place(&d, 2);
        pay(&d, a, 5_000, 3);
        incremental.sync_stream(d.store(), a).unwrap();
        incremental.sync_stream(d.store(), b).unwrap();

        let rebuilt = projection();
        let history = d.store().load_all().unwrap();
        rebuilt
            .rebuild_from_scratch(history.iter().map(StoredEvent::to_envelope))
            .unwrap();

        assert_eq!(rebuilt.list_all(), incremental.list_all());
        // rebuilding twice does not double-count
        rebuilt
            .rebuild_from_scratch(history.iter().map(StoredEvent::to_envelope))
            .unwrap();
        assert_eq!(rebuilt.get(&a).unwrap().amount_paid, Money::crc_major(5_000));
    }

    #[test]
    fn list_filters_by_status_and_created_date() {
        let d = dispatcher();
        let proj = projection();
        let (a, _) = place(&d, 1);
        let (b, _) = place(&d, 5);
        pay(&d, b, 1_000, 5);
        proj.sync_stream(d.store(), a).unwrap();
        proj.sync_stream(d.store(), b).unwrap();

        let march = DateRange::month(2025, 3).unwrap();
        assert_eq!(proj.list(None, &march).len(), 2);
        assert_eq!(proj.list(Some(OrderStatus::PartiallyPaid), &march)[0].order_id, b);

        let first = DateRange::day(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let rows = proj.list(None, &first);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order_id, a);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// The summary row always agrees with the rehydrated aggregate,
        /// whichever payments were accepted or refused.
        #[test]
        fn summary_tracks_the_aggregate(payments in proptest::collection::vec(0i64..15_000, 0..6)) {
            let d = dispatcher();
            let proj = projection();
            let (order_id, _) = place(&d, 1);

            for major in payments {
                let payment = PaymentDraft::cash(Money::crc_major(major))
                    .into_payment(PaymentId::new(), at(2))
                    .unwrap();
                let cmd = OrderCommand::RecordPayment(RecordPayment { order_id, payment });
                let _ = d.dispatch(order_id.0, ORDER_AGGREGATE_TYPE, &cmd, ExpectedVersion::Any, |id| {
                    Order::empty(OrderId::new(id))
                });
            }

            let row = proj.sync_stream(d.store(), order_id).unwrap().unwrap();
            let order: Order = d.load(order_id.0, |id| Order::empty(OrderId::new(id))).unwrap();

            prop_assert_eq!(row.status, order.status());
            prop_assert_eq!(row.amount_paid, order.amount_paid_total());
            prop_assert_eq!(row.balance_due, order.balance_due());
            prop_assert_eq!(row.overpayment, order.overpayment());
            prop_assert_eq!(row.payments.len(), order.payments().len());
            prop_assert_eq!(row.version, order.version());
        }
    }
}
