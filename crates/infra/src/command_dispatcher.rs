//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate stream
//!   ↓
//! 2. Validate stream ordering and rehydrate
//!   ↓
//! 3. Check the caller's expected version (if any)
//!   ↓
//! 4. Handle the command (pure decision, produces events)
//!   ↓
//! 5. Append with `Exact(loaded_version)` (optimistic concurrency)
//!   ↓
//! 6. Publish committed events to the bus
//! ```
//!
//! Publication happens only after the append succeeded. This module contains
//! no IO itself; it composes the `EventStore` and `EventBus` traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use settle_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use settle_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The aggregate rejected the command (validation or state rule).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure: the stream moved since it was read.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// Historical payloads could not be decoded into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; the
    /// events are durable and consumers can catch up from the store).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A> {
    /// Aggregate state after the committed events were applied.
    pub aggregate: A,
    /// Events as persisted, with their sequence numbers.
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine.
///
/// Aggregates used here must be deterministic (same events, same state) and
/// must bump their version once per applied event.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream without handling a command.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command through the full pipeline.
    ///
    /// `expected` is the version the caller last observed; `Any` skips the
    /// check. Independently of it, the append always expects the version that
    /// was just loaded, so an interleaved writer fails with
    /// [`DispatchError::Concurrency`] and the caller re-reads.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: &A::Command,
        expected: ExpectedVersion,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: settle_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let loaded_version = stream_version(&history);

        expected.check(loaded_version).map_err(|e| match e {
            DomainError::ConcurrentModification(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Domain(other),
        })?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                committed: vec![],
            });
        }

        let uncommitted = decided
            .iter()
            .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(loaded_version))?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(Dispatched {
            aggregate,
            committed,
        })
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-contiguous sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use settle_core::{AggregateRoot, Money, TaxRate};
    use settle_events::InMemoryEventBus;
    use settle_orders::{
        LineDraft, ORDER_AGGREGATE_TYPE, Order, OrderCommand, OrderId, OrderStatus, PlaceOrder,
        ProductSnapshot, VoidOrder,
    };

    use crate::event_store::InMemoryEventStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn dispatcher() -> (CommandDispatcher<Arc<InMemoryEventStore>, Bus>, Bus) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        (
            CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus.clone()),
            bus,
        )
    }

    fn place(order_id: OrderId) -> OrderCommand {
        OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            order_number: "ORD-20250301-00001".to_string(),
            customer: None,
            branch_id: None,
            lines: vec![LineDraft::new(
                ProductSnapshot {
                    product_id: settle_core::ProductId::new(),
                    name: "Estuche".to_string(),
                    sku: "EST-01".to_string(),
                    category: None,
                    unit_price: Money::crc_major(5_000),
                    iva_rate: TaxRate::STANDARD,
                },
                1,
            )],
            coupon: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_publishes_and_returns_new_state() {
        let (dispatcher, bus) = dispatcher();
        let sub = bus.subscribe();
        let order_id = OrderId::generate();

        let out = dispatcher
            .dispatch(
                order_id.0,
                ORDER_AGGREGATE_TYPE,
                &place(order_id),
                ExpectedVersion::Exact(0),
                |id| Order::empty(OrderId::new(id)),
            )
            .unwrap();

        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.committed[0].sequence_number, 1);
        assert_eq!(out.committed[0].event_type, "settlement.order.placed");
        assert_eq!(out.aggregate.version(), 1);
        assert_eq!(out.aggregate.status(), OrderStatus::PendingPayment);

        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].aggregate_id(), order_id.0);
    }

    #[test]
    fn domain_rejection_appends_nothing() {
        let (dispatcher, _bus) = dispatcher();
        let order_id = OrderId::generate();
        dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, &place(order_id), ExpectedVersion::Any, |id| {
                Order::empty(OrderId::new(id))
            })
            .unwrap();

        let void = OrderCommand::VoidOrder(VoidOrder {
            order_id,
            reason: "mistake".to_string(),
            occurred_at: Utc::now(),
        });
        let err = dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, &void, ExpectedVersion::Any, |id| {
                Order::empty(OrderId::new(id))
            })
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Domain(DomainError::OrderNotVoidable { .. })
        ));
        assert_eq!(dispatcher.store().load_stream(order_id.0).unwrap().len(), 1);
    }

    #[test]
    fn stale_caller_version_is_rejected_before_handling() {
        let (dispatcher, _bus) = dispatcher();
        let order_id = OrderId::generate();
        dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, &place(order_id), ExpectedVersion::Any, |id| {
                Order::empty(OrderId::new(id))
            })
            .unwrap();

        let again = dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, &place(order_id), ExpectedVersion::Exact(0), |id| {
                Order::empty(OrderId::new(id))
            })
            .unwrap_err();
        assert!(matches!(again, DispatchError::Concurrency(_)));
    }

    #[test]
    fn load_rehydrates_the_committed_state() {
        let (dispatcher, _bus) = dispatcher();
        let order_id = OrderId::generate();
        dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE_TYPE, &place(order_id), ExpectedVersion::Any, |id| {
                Order::empty(OrderId::new(id))
            })
            .unwrap();

        let order = dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))
            .unwrap();
        assert!(order.is_created());
        assert_eq!(order.totals().total, Money::crc_major(5_650));

        let missing = dispatcher
            .load(AggregateId::new(), |id| Order::empty(OrderId::new(id)))
            .unwrap();
        assert!(!missing.is_created());
    }
}
