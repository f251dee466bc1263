//! Order status state machine.
//!
//! [`OrderStatus`] is a closed enum and [`transition`] is the only place that
//! decides which status follows which. The payment ledger and the returns/void
//! processor both go through it (via [`Lifecycle`]), so the table below is the
//! single source of truth:
//!
//! | from \ trigger      | begin      | abort              | pay, partial   | pay, settled | return, partial    | return, full   | void   | cancel    |
//! |----------------------|------------|--------------------|----------------|--------------|--------------------|----------------|--------|-----------|
//! | `pending_payment`    | processing | -                  | partially_paid | completed    | -                  | -              | -      | cancelled |
//! | `processing_payment` | -          | pending or partial | partially_paid | completed    | -                  | -              | -      | -         |
//! | `partially_paid`     | processing | -                  | partially_paid | completed    | partially_returned | fully_returned | -      | -         |
//! | `completed`          | -          | -                  | -              | -            | partially_returned | fully_returned | voided | -         |
//! | `partially_returned` | -          | -                  | -              | -            | partially_returned | fully_returned | voided | -         |
//! | terminal             | -          | -                  | -              | -            | -                  | -              | -      | -         |
//!
//! Terminal statuses are `fully_returned`, `voided` and `cancelled`.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use settle_core::{DomainError, DomainResult};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingPayment,
    /// A card-terminal authorization is in flight.
    ProcessingPayment,
    PartiallyPaid,
    Completed,
    PartiallyReturned,
    FullyReturned,
    Voided,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::PendingPayment,
        OrderStatus::ProcessingPayment,
        OrderStatus::PartiallyPaid,
        OrderStatus::Completed,
        OrderStatus::PartiallyReturned,
        OrderStatus::FullyReturned,
        OrderStatus::Voided,
        OrderStatus::Cancelled,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::ProcessingPayment => "processing_payment",
            OrderStatus::PartiallyPaid => "partially_paid",
            OrderStatus::Completed => "completed",
            OrderStatus::PartiallyReturned => "partially_returned",
            OrderStatus::FullyReturned => "fully_returned",
            OrderStatus::Voided => "voided",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::FullyReturned | OrderStatus::Voided | OrderStatus::Cancelled
        )
    }

    pub const fn accepts_payments(&self) -> bool {
        matches!(
            self,
            OrderStatus::PendingPayment
                | OrderStatus::ProcessingPayment
                | OrderStatus::PartiallyPaid
        )
    }

    /// Statuses that still carry an open balance for receivables.
    pub const fn is_receivable(&self) -> bool {
        matches!(
            self,
            OrderStatus::PendingPayment | OrderStatus::PartiallyPaid
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::invalid_id(format!("unknown order status '{s}'")))
    }
}

/// Something that happened to an order and may move its status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StatusTrigger {
    BeginProcessing,
    AbortProcessing { has_payments: bool },
    PaymentRecorded { settled: bool },
    ReturnRecorded { full: bool },
    Void,
    Cancel,
}

impl StatusTrigger {
    pub const fn name(&self) -> &'static str {
        match self {
            StatusTrigger::BeginProcessing => "begin_processing",
            StatusTrigger::AbortProcessing { .. } => "abort_processing",
            StatusTrigger::PaymentRecorded { .. } => "payment",
            StatusTrigger::ReturnRecorded { .. } => "return",
            StatusTrigger::Void => "void",
            StatusTrigger::Cancel => "cancel",
        }
    }
}

/// The transition function. Any pair not in the table is rejected.
///
/// Payments against a non-payable order fail with `OrderNotPayable` and voids
/// of a non-voidable order with `OrderNotVoidable`; everything else that is
/// not listed fails with `IllegalStatusTransition`.
pub fn transition(from: OrderStatus, trigger: StatusTrigger) -> DomainResult<OrderStatus> {
    use OrderStatus::*;
    use StatusTrigger::*;

    let next = match (from, trigger) {
        (PendingPayment | PartiallyPaid, BeginProcessing) => Some(ProcessingPayment),

        (ProcessingPayment, AbortProcessing { has_payments: true }) => Some(PartiallyPaid),
        (ProcessingPayment, AbortProcessing { has_payments: false }) => Some(PendingPayment),

        (PendingPayment | ProcessingPayment | PartiallyPaid, PaymentRecorded { settled: true }) => {
            Some(Completed)
        }
        (PendingPayment | ProcessingPayment | PartiallyPaid, PaymentRecorded { settled: false }) => {
            Some(PartiallyPaid)
        }
        (_, PaymentRecorded { .. }) => {
            return Err(DomainError::OrderNotPayable {
                status: from.as_str(),
            });
        }

        (PartiallyPaid | Completed | PartiallyReturned, ReturnRecorded { full: true }) => {
            Some(FullyReturned)
        }
        (PartiallyPaid | Completed | PartiallyReturned, ReturnRecorded { full: false }) => {
            Some(PartiallyReturned)
        }

        (Completed | PartiallyReturned, Void) => Some(Voided),
        (_, Void) => {
            return Err(DomainError::OrderNotVoidable {
                status: from.as_str(),
            });
        }

        (PendingPayment, Cancel) => Some(Cancelled),

        _ => None,
    };

    next.ok_or(DomainError::IllegalStatusTransition {
        from: from.as_str(),
        trigger: trigger.name(),
    })
}

/// Owner of an order's current status.
///
/// The status can only change through [`Lifecycle::advance`] or
/// [`Lifecycle::replay`], both of which consult [`transition`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    status: OrderStatus,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            status: OrderStatus::PendingPayment,
        }
    }

    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// What the status would become, without changing anything.
    pub fn peek(&self, trigger: StatusTrigger) -> DomainResult<OrderStatus> {
        transition(self.status, trigger)
    }

    pub fn advance(&mut self, trigger: StatusTrigger) -> DomainResult<OrderStatus> {
        let next = transition(self.status, trigger)?;
        self.status = next;
        Ok(next)
    }

    /// Replay a recorded transition through the same table as [`advance`].
    ///
    /// The event's recorded status must be the one the table yields; on
    /// disagreement the status is left untouched and an
    /// [`DomainError::IllegalStatusTransition`] is returned.
    ///
    /// [`advance`]: Lifecycle::advance
    pub fn replay(
        &mut self,
        trigger: StatusTrigger,
        recorded: OrderStatus,
    ) -> DomainResult<OrderStatus> {
        let next = transition(self.status, trigger)?;
        if next != recorded {
            return Err(DomainError::IllegalStatusTransition {
                from: self.status.as_str(),
                trigger: trigger.name(),
            });
        }
        self.status = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIGGERS: [StatusTrigger; 9] = [
        StatusTrigger::BeginProcessing,
        StatusTrigger::AbortProcessing { has_payments: false },
        StatusTrigger::AbortProcessing { has_payments: true },
        StatusTrigger::PaymentRecorded { settled: false },
        StatusTrigger::PaymentRecorded { settled: true },
        StatusTrigger::ReturnRecorded { full: false },
        StatusTrigger::ReturnRecorded { full: true },
        StatusTrigger::Void,
        StatusTrigger::Cancel,
    ];

    fn expected(from: OrderStatus, trigger: StatusTrigger) -> Option<OrderStatus> {
        use OrderStatus::*;
        use StatusTrigger::*;
        match (from, trigger) {
            (PendingPayment, BeginProcessing) => Some(ProcessingPayment),
            (PendingPayment, PaymentRecorded { settled: false }) => Some(PartiallyPaid),
            (PendingPayment, PaymentRecorded { settled: true }) => Some(Completed),
            (PendingPayment, Cancel) => Some(Cancelled),

            (ProcessingPayment, AbortProcessing { has_payments: false }) => Some(PendingPayment),
            (ProcessingPayment, AbortProcessing { has_payments: true }) => Some(PartiallyPaid),
            (ProcessingPayment, PaymentRecorded { settled: false }) => Some(PartiallyPaid),
            (ProcessingPayment, PaymentRecorded { settled: true }) => Some(Completed),

            (PartiallyPaid, BeginProcessing) => Some(ProcessingPayment),
            (PartiallyPaid, PaymentRecorded { settled: false }) => Some(PartiallyPaid),
            (PartiallyPaid, PaymentRecorded { settled: true }) => Some(Completed),
            (PartiallyPaid, ReturnRecorded { full: false }) => Some(PartiallyReturned),
            (PartiallyPaid, ReturnRecorded { full: true }) => Some(FullyReturned),

            (Completed, ReturnRecorded { full: false }) => Some(PartiallyReturned),
            (Completed, ReturnRecorded { full: true }) => Some(FullyReturned),
            (Completed, Void) => Some(Voided),

            (PartiallyReturned, ReturnRecorded { full: false }) => Some(PartiallyReturned),
            (PartiallyReturned, ReturnRecorded { full: true }) => Some(FullyReturned),
            (PartiallyReturned, Void) => Some(Voided),

            _ => None,
        }
    }

    #[test]
    fn exhaustive_state_trigger_table() {
        for from in OrderStatus::ALL {
            for trigger in TRIGGERS {
                let got = transition(from, trigger);
                match (expected(from, trigger), got) {
                    (Some(want), Ok(next)) => assert_eq!(next, want, "{from} on {trigger:?}"),
                    (None, Err(err)) => match trigger {
                        StatusTrigger::PaymentRecorded { .. } => {
                            assert!(matches!(err, DomainError::OrderNotPayable { .. }))
                        }
                        StatusTrigger::Void => {
                            assert!(matches!(err, DomainError::OrderNotVoidable { .. }))
                        }
                        _ => assert!(
                            matches!(err, DomainError::IllegalStatusTransition { .. }),
                            "{from} on {trigger:?}: {err:?}"
                        ),
                    },
                    (want, got) => panic!("{from} on {trigger:?}: expected {want:?}, got {got:?}"),
                }
            }
        }
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for from in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            for trigger in TRIGGERS {
                assert!(transition(from, trigger).is_err(), "{from} on {trigger:?}");
            }
        }
    }

    #[test]
    fn payable_statuses_match_the_table() {
        for status in OrderStatus::ALL {
            let pays = transition(status, StatusTrigger::PaymentRecorded { settled: false }).is_ok();
            assert_eq!(pays, status.accepts_payments(), "{status}");
        }
    }

    #[test]
    fn lifecycle_only_moves_through_the_table() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.status(), OrderStatus::PendingPayment);

        assert_eq!(
            lc.peek(StatusTrigger::BeginProcessing).unwrap(),
            OrderStatus::ProcessingPayment
        );
        assert_eq!(lc.status(), OrderStatus::PendingPayment);

        lc.advance(StatusTrigger::BeginProcessing).unwrap();
        let err = lc.advance(StatusTrigger::Cancel).unwrap_err();
        assert!(matches!(err, DomainError::IllegalStatusTransition { .. }));
        assert_eq!(lc.status(), OrderStatus::ProcessingPayment);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn replay_rejects_a_recorded_status_the_table_disagrees_with() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle
            .replay(
                StatusTrigger::PaymentRecorded { settled: false },
                OrderStatus::Completed,
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::IllegalStatusTransition { .. }));
        assert_eq!(lifecycle.status(), OrderStatus::PendingPayment);

        let err = lifecycle
            .replay(StatusTrigger::Void, OrderStatus::Voided)
            .unwrap_err();
        assert!(matches!(err, DomainError::OrderNotVoidable { .. }));
        assert_eq!(lifecycle.status(), OrderStatus::PendingPayment);

        assert_eq!(
            lifecycle.replay(
                StatusTrigger::PaymentRecorded { settled: true },
                OrderStatus::Completed
            ),
            Ok(OrderStatus::Completed)
        );
        assert_eq!(lifecycle.status(), OrderStatus::Completed);
    }
}
