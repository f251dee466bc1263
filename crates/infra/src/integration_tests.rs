//! Integration tests for the full settlement pipeline.
//!
//! Tests: Cart → PlaceOrder → EventStore → OrdersProjection → reports,
//! plus the collaborator jobs queued after each commit.
//!
//! Verifies:
//! - Pricing, payment and return scenarios end to end
//! - Collaborator failures are retried, then dead-lettered, never lost
//! - Optimistic concurrency conflicts are detected

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use chrono::Utc;

    use settle_core::{
        AggregateRoot, BranchId, CustomerId, DateRange, DomainError, ExpectedVersion, Money,
        ProductId, TaxRate,
    };
    use settle_orders::{
        Cart, CartLine, Coupon, CustomerSnapshot, DiscountKind, OrderStatus, PaymentDraft,
        PaymentMethod, ProductSnapshot, ReturnItem,
    };

    use crate::config::EngineConfig;
    use crate::external::InMemoryCollaborators;
    use crate::settlement::{ErrorKind, SettlementError, SettlementService};

    struct Fixture {
        service: SettlementService,
        adapters: InMemoryCollaborators,
        branch: BranchId,
        product: ProductId,
        customer: CustomerId,
    }

    fn setup() -> Fixture {
        let branch = BranchId::new();
        let config = EngineConfig {
            job_max_attempts: 3,
            job_base_delay: Duration::ZERO,
            job_max_delay: Duration::ZERO,
            default_branch: Some(branch),
            ..EngineConfig::default()
        };
        let (service, adapters) = SettlementService::in_memory(config);

        let product = ProductId::new();
        adapters.catalog.insert(ProductSnapshot {
            product_id: product,
            name: "Café molido 500g".to_string(),
            sku: "CAF-500".to_string(),
            category: Some("abarrotes".to_string()),
            unit_price: Money::crc_major(10_000),
            iva_rate: TaxRate::STANDARD,
        });
        adapters.inventory.set_level(branch, product, 50);

        let customer = CustomerId::new();
        adapters.customers.insert(CustomerSnapshot {
            customer_id: customer,
            name: "Ana Solís".to_string(),
            identification: Some("1-1111-1111".to_string()),
            email: None,
        });

        Fixture {
            service,
            adapters,
            branch,
            product,
            customer,
        }
    }

    fn two_units(f: &Fixture) -> Cart {
        Cart {
            customer_id: Some(f.customer),
            branch_id: None,
            lines: vec![CartLine {
                product_id: f.product,
                quantity: 2,
                discount: None,
            }],
            coupon: None,
        }
    }

    fn cash(major: i64) -> PaymentDraft {
        PaymentDraft::cash(Money::crc_major(major))
    }

    #[test]
    fn plain_order_is_priced_with_iva() {
        let f = setup();
        let order = f.service.build_order(two_units(&f)).unwrap();

        assert_eq!(order.status(), OrderStatus::PendingPayment);
        assert_eq!(order.totals().subtotal_original, Money::crc_major(20_000));
        assert_eq!(order.totals().tax, Money::crc_major(2_600));
        assert_eq!(order.totals().total, Money::crc_major(22_600));
        assert!(order.order_number().starts_with("ORD-"));

        let summary = f.service.order_summary(order.id_typed()).unwrap();
        assert_eq!(summary.total, Money::crc_major(22_600));
        assert_eq!(summary.balance_due, Money::crc_major(22_600));
        assert_eq!(summary.customer_name.as_deref(), Some("Ana Solís"));
    }

    #[test]
    fn coupon_above_minimum_reduces_the_taxable_base() {
        let f = setup();
        let mut cart = two_units(&f);
        cart.coupon = Some(Coupon {
            code: "DIEZ".to_string(),
            kind: DiscountKind::Percentage,
            value: 1_000,
            min_purchase: Money::crc_major(15_000),
        });

        let order = f.service.build_order(cart).unwrap();
        assert_eq!(order.totals().order_discount, Money::crc_major(2_000));
        assert_eq!(order.totals().base_for_tax, Money::crc_major(18_000));
        assert_eq!(order.totals().tax, Money::crc_major(2_340));
        assert_eq!(order.totals().total, Money::crc_major(20_340));
    }

    #[test]
    fn exact_cash_payment_completes_the_order() {
        let f = setup();
        let order = f.service.build_order(two_units(&f)).unwrap();

        let order = f
            .service
            .apply_payment(order.id_typed(), cash(22_600), ExpectedVersion::Exact(1))
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert!(order.balance_due().is_zero());
        assert!(order.completed_at().is_some());
    }

    #[test]
    fn split_payments_move_through_partially_paid() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();

        let order = f.service.apply_payment(id, cash(10_000), ExpectedVersion::Any).unwrap();
        assert_eq!(order.status(), OrderStatus::PartiallyPaid);
        assert_eq!(order.balance_due(), Money::crc_major(12_600));

        let order = f.service.apply_payment(id, cash(12_600), ExpectedVersion::Any).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);

        let summary = f.service.order_summary(id).unwrap();
        assert_eq!(summary.payments.len(), 2);
        assert_eq!(summary.amount_paid, Money::crc_major(22_600));
        assert_eq!(summary.status, OrderStatus::Completed);
    }

    #[test]
    fn returns_walk_to_fully_returned_and_block_payments() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(22_600), ExpectedVersion::Any).unwrap();

        let order = f
            .service
            .process_return(id, vec![ReturnItem::new(f.product, 1)], None, ExpectedVersion::Any)
            .unwrap();
        assert_eq!(order.status(), OrderStatus::PartiallyReturned);

        let order = f
            .service
            .process_return(id, vec![ReturnItem::new(f.product, 1)], None, ExpectedVersion::Any)
            .unwrap();
        assert_eq!(order.status(), OrderStatus::FullyReturned);

        let err = f
            .service
            .apply_payment(id, cash(1_000), ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Domain(DomainError::OrderNotPayable { .. })
        ));
        assert_eq!(err.kind(), ErrorKind::State);

        let note = f.service.credit_note(id).unwrap();
        assert_eq!(note.total, Money::crc_major(20_000));
    }

    #[test]
    fn returning_more_than_purchased_is_rejected() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(22_600), ExpectedVersion::Any).unwrap();

        let err = f
            .service
            .process_return(id, vec![ReturnItem::new(f.product, 3)], None, ExpectedVersion::Any)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            f.service.get_order(id).unwrap().status(),
            OrderStatus::Completed
        );
    }

    #[test]
    fn stale_version_is_a_concurrency_error() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(10_000), ExpectedVersion::Exact(1)).unwrap();

        let err = f
            .service
            .apply_payment(id, cash(10_000), ExpectedVersion::Exact(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Concurrency);
        assert_eq!(
            f.service.get_order(id).unwrap().amount_paid_total(),
            Money::crc_major(10_000)
        );
    }

    #[test]
    fn racing_payments_never_interleave() {
        const WRITERS: usize = 16;

        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        let start = Barrier::new(WRITERS);

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|_| {
                    scope.spawn(|| {
                        start.wait();
                        f.service.apply_payment(id, cash(1_000), ExpectedVersion::Any)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert!(accepted >= 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), ErrorKind::Concurrency);
        }

        let order = f.service.get_order(id).unwrap();
        assert_eq!(order.payments().len(), accepted);
        assert_eq!(order.amount_paid_total(), Money::crc_major(1_000 * accepted as i64));
        assert_eq!(order.version(), 1 + accepted as u64);

        // The read side saw every committed payment exactly once, whatever
        // order the racing writers published in.
        let summary = f.service.order_summary(id).unwrap();
        assert_eq!(summary.amount_paid, order.amount_paid_total());
        assert_eq!(summary.payments.len(), accepted);
        assert_eq!(summary.version, order.version());
    }

    #[test]
    fn unknown_product_is_a_bad_request() {
        let f = setup();
        let mut cart = two_units(&f);
        cart.lines[0].product_id = ProductId::new();

        let err = f.service.build_order(cart).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.service.list_orders(None, DateRange::unbounded()).is_empty());
    }

    #[test]
    fn missing_order_is_not_found() {
        let f = setup();
        let err = f.service.get_order(settle_orders::OrderId::generate()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn stock_is_debited_then_restocked_through_jobs() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(22_600), ExpectedVersion::Any).unwrap();

        f.service.run_collaborator_jobs().unwrap();
        assert_eq!(f.adapters.inventory.level(f.branch, f.product), 48);

        f.service
            .process_return(id, vec![ReturnItem::new(f.product, 1)], None, ExpectedVersion::Any)
            .unwrap();
        f.service.run_collaborator_jobs().unwrap();
        assert_eq!(f.adapters.inventory.level(f.branch, f.product), 49);

        // Re-running never moves stock twice.
        f.service.run_collaborator_jobs().unwrap();
        assert_eq!(f.adapters.inventory.level(f.branch, f.product), 49);
        assert_eq!(f.adapters.inventory.movements().len(), 2);
    }

    #[test]
    fn completed_order_gets_fiscal_identifiers() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(22_600), ExpectedVersion::Any).unwrap();

        f.service.run_collaborator_jobs().unwrap();

        let order = f.service.get_order(id).unwrap();
        let ids = order.fiscal_identifiers().unwrap();
        assert_eq!(ids.clave.len(), 50);
        assert_eq!(order.status(), OrderStatus::Completed);
        assert!(f.service.order_summary(id).unwrap().fiscal.is_some());
        assert_eq!(f.adapters.fiscal.issued(), 1);
    }

    #[test]
    fn transient_failures_are_retried() {
        let f = setup();
        f.adapters.inventory.fail_next(2);
        f.service.build_order(two_units(&f)).unwrap();

        let report = f.service.run_collaborator_jobs().unwrap();
        assert_eq!(report.retried, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(f.adapters.inventory.level(f.branch, f.product), 48);
        assert!(f.service.dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn exhausted_jobs_are_dead_lettered_and_can_be_retried() {
        let f = setup();
        f.adapters.fiscal.fail_next(10);
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(22_600), ExpectedVersion::Any).unwrap();

        let report = f.service.run_collaborator_jobs().unwrap();
        assert_eq!(report.dead_lettered, 1);

        // The order itself is untouched by the failed side effect.
        let order = f.service.get_order(id).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert!(order.fiscal_identifiers().is_none());

        let dead = f.service.dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(f.service.job_stats().unwrap().dead_lettered, 1);

        f.adapters.fiscal.fail_next(0);
        f.service.retry_dead_letter(dead[0].job.id).unwrap();
        f.service.run_collaborator_jobs().unwrap();
        assert!(f.service.get_order(id).unwrap().fiscal_identifiers().is_some());
    }

    #[test]
    fn rejected_fiscal_request_is_not_retried() {
        let f = setup();
        f.adapters.fiscal.set_rejecting(true);
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(22_600), ExpectedVersion::Any).unwrap();

        let report = f.service.run_collaborator_jobs().unwrap();
        assert_eq!(report.retried, 0);
        assert_eq!(report.dead_lettered, 1);
    }

    #[test]
    fn partially_paid_order_cannot_be_voided() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(5_000), ExpectedVersion::Any).unwrap();

        let err = f
            .service
            .void_order(id, "duplicada", ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Domain(DomainError::OrderNotVoidable { .. })
        ));
    }

    #[test]
    fn void_and_cancel_reach_terminal_states() {
        let f = setup();
        let paid = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(paid, cash(22_600), ExpectedVersion::Any).unwrap();
        let voided = f
            .service
            .void_order(paid, "error de digitación", ExpectedVersion::Any)
            .unwrap();
        assert_eq!(voided.status(), OrderStatus::Voided);

        let unpaid = f.service.build_order(two_units(&f)).unwrap().id_typed();
        let cancelled = f
            .service
            .cancel_order(unpaid, "cliente se retiró", ExpectedVersion::Any)
            .unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);

        let err = f
            .service
            .apply_payment(unpaid, cash(1_000), ExpectedVersion::Any)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);

        let voided_rows = f.service.list_orders(Some(OrderStatus::Voided), DateRange::unbounded());
        assert_eq!(voided_rows.len(), 1);
        assert_eq!(voided_rows[0].order_id, paid);
    }

    #[test]
    fn card_processing_can_be_aborted() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();

        let order = f.service.begin_payment_processing(id, ExpectedVersion::Any).unwrap();
        assert_eq!(order.status(), OrderStatus::ProcessingPayment);

        let order = f.service.abort_payment_processing(id, ExpectedVersion::Any).unwrap();
        assert_eq!(order.status(), OrderStatus::PendingPayment);
    }

    #[test]
    fn reports_read_the_projection() {
        let f = setup();
        let paid = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(paid, cash(22_600), ExpectedVersion::Any).unwrap();
        let open = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(open, cash(2_600), ExpectedVersion::Any).unwrap();

        let today = Utc::now().date_naive();
        let sales = f.service.daily_sales(today);
        assert_eq!(sales.orders_settled, 1);
        assert_eq!(sales.gross_sales, Money::crc_major(22_600));
        assert_eq!(
            sales.payments_by_method.get(&PaymentMethod::Cash).copied(),
            Some(Money::crc_major(25_200))
        );

        let receivables = f.service.accounts_receivable(DateRange::unbounded());
        assert_eq!(receivables.order_count, 1);
        assert_eq!(receivables.total, Money::crc_major(20_000));
        assert_eq!(receivables.orders[0].order_id, open);
    }

    #[test]
    fn rebuild_reproduces_the_projection() {
        let f = setup();
        let id = f.service.build_order(two_units(&f)).unwrap().id_typed();
        f.service.apply_payment(id, cash(10_000), ExpectedVersion::Any).unwrap();
        let before = f.service.order_summary(id).unwrap();

        let events = f.service.rebuild_projections().unwrap();
        assert_eq!(events, 2);
        assert_eq!(f.service.order_summary(id).unwrap(), before);
    }
}
