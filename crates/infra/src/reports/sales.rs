//! Daily and monthly sales summaries.

use std::collections::BTreeMap;

use serde::Serialize;

use settle_core::{DateRange, Money};
use settle_orders::PaymentMethod;

use crate::projections::OrderSummary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub period: DateRange,
    /// Orders whose `completed_at` falls in the period.
    pub orders_settled: usize,
    pub gross_sales: Money,
    pub tax: Money,
    pub discounts: Money,
    /// Collected per method, dated by `recorded_at`.
    pub payments_by_method: BTreeMap<PaymentMethod, Money>,
    pub payments_total: Money,
    /// Credit-note value of returns dated in the period.
    pub returns_value: Money,
    pub voided_count: usize,
    /// Voided value not already credited by returns.
    pub voided_total: Money,
    /// `gross_sales - returns_value - voided_total`
    pub net_sales: Money,
}

pub fn sales_summary(orders: &[OrderSummary], period: DateRange) -> SalesSummary {
    let mut orders_settled = 0;
    let (mut gross, mut tax, mut discounts) = (0i64, 0i64, 0i64);
    let mut by_method: BTreeMap<PaymentMethod, i64> = BTreeMap::new();
    let mut returns_value = 0i64;
    let (mut voided_count, mut voided_total) = (0, 0i64);

    for order in orders {
        if order.completed_at.is_some_and(|at| period.contains(at)) {
            orders_settled += 1;
            gross += order.total.amount();
            tax += order.tax.amount();
            discounts += order.discount_total.amount();
        }

        for payment in order.payments.iter().filter(|p| period.contains(p.recorded_at)) {
            *by_method.entry(payment.method).or_default() += payment.amount_crc.amount();
        }

        returns_value += order
            .returns
            .iter()
            .filter(|r| period.contains(r.returned_at))
            .map(|r| r.credit_value.amount())
            .sum::<i64>();

        if order.voided_at.is_some_and(|at| period.contains(at)) {
            voided_count += 1;
            voided_total += order.total.amount() - order.returned_value.amount();
        }
    }

    let payments_total: i64 = by_method.values().sum();
    SalesSummary {
        period,
        orders_settled,
        gross_sales: Money::crc(gross),
        tax: Money::crc(tax),
        discounts: Money::crc(discounts),
        payments_by_method: by_method
            .into_iter()
            .map(|(method, amount)| (method, Money::crc(amount)))
            .collect(),
        payments_total: Money::crc(payments_total),
        returns_value: Money::crc(returns_value),
        voided_count,
        voided_total: Money::crc(voided_total),
        net_sales: Money::crc(gross - returns_value - voided_total),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use settle_core::PaymentId;
    use settle_orders::{OrderId, OrderStatus};

    use crate::projections::{OrderPaymentSummary, OrderReturnSummary};

    pub(crate) fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    /// Pending order for ¢22,600 (tax 2,600) created on 2025-03-`day`.
    pub(crate) fn summary(day: u32) -> OrderSummary {
        OrderSummary {
            order_id: OrderId::generate(),
            order_number: format!("ORD-202503{day:02}-00001"),
            customer_id: None,
            customer_name: None,
            branch_id: None,
            status: OrderStatus::PendingPayment,
            created_at: at(day),
            completed_at: None,
            voided_at: None,
            cancelled_at: None,
            units: 2,
            subtotal: Money::crc_major(20_000),
            discount_total: Money::crc(0),
            tax: Money::crc_major(2_600),
            total: Money::crc_major(22_600),
            amount_paid: Money::crc(0),
            balance_due: Money::crc_major(22_600),
            overpayment: Money::crc(0),
            payments: vec![],
            returns: vec![],
            returned_value: Money::crc(0),
            fiscal: None,
            version: 1,
        }
    }

    pub(crate) fn paid(mut order: OrderSummary, method: PaymentMethod, day: u32) -> OrderSummary {
        order.payments.push(OrderPaymentSummary {
            payment_id: PaymentId::new(),
            method,
            amount_crc: order.balance_due,
            recorded_at: at(day),
        });
        order.amount_paid = order.total;
        order.balance_due = Money::crc(0);
        order.status = OrderStatus::Completed;
        order.completed_at = Some(at(day));
        order
    }

    fn march(day: u32) -> DateRange {
        DateRange::day(NaiveDate::from_ymd_opt(2025, 3, day).unwrap())
    }

    #[test]
    fn settled_orders_count_by_completion_day() {
        let orders = vec![
            paid(summary(1), PaymentMethod::Cash, 2),
            paid(summary(2), PaymentMethod::Card, 2),
            summary(2),
        ];

        let day = sales_summary(&orders, march(2));
        assert_eq!(day.orders_settled, 2);
        assert_eq!(day.gross_sales, Money::crc_major(45_200));
        assert_eq!(day.tax, Money::crc_major(5_200));
        assert_eq!(day.payments_total, Money::crc_major(45_200));
        assert_eq!(day.payments_by_method[&PaymentMethod::Card], Money::crc_major(22_600));
        assert_eq!(day.net_sales, Money::crc_major(45_200));

        assert_eq!(sales_summary(&orders, march(1)).orders_settled, 0);
    }

    #[test]
    fn returns_and_voids_reduce_net_sales() {
        let mut returned = paid(summary(1), PaymentMethod::Cash, 1);
        returned.returns.push(OrderReturnSummary {
            returned_at: at(1),
            units: 1,
            credit_value: Money::crc_major(10_000),
        });
        returned.returned_value = Money::crc_major(10_000);
        returned.status = OrderStatus::PartiallyReturned;

        let mut voided = paid(summary(1), PaymentMethod::Sinpe, 1);
        voided.status = OrderStatus::Voided;
        voided.voided_at = Some(at(1));

        let day = sales_summary(&[returned.clone(), voided], march(1));
        assert_eq!(day.gross_sales, Money::crc_major(45_200));
        assert_eq!(day.returns_value, Money::crc_major(10_000));
        assert_eq!(day.voided_count, 1);
        assert_eq!(day.voided_total, Money::crc_major(22_600));
        assert_eq!(day.net_sales, Money::crc_major(12_600));

        // voiding after a partial return only removes what was not credited yet
        returned.status = OrderStatus::Voided;
        returned.voided_at = Some(at(1));
        let day = sales_summary(&[returned], march(1));
        assert_eq!(day.voided_total, Money::crc_major(12_600));
        assert!(day.net_sales.is_zero());
    }

    #[test]
    fn monthly_range_covers_every_day() {
        let orders: Vec<_> = (1..=3)
            .map(|d| paid(summary(d), PaymentMethod::Transfer, d))
            .collect();
        let month = sales_summary(&orders, DateRange::month(2025, 3).unwrap());
        assert_eq!(month.orders_settled, 3);
        assert_eq!(month.payments_by_method.len(), 1);
        assert_eq!(month.gross_sales, Money::crc_major(67_800));
    }
}
