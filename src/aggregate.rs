//! Line valuation, invoice totals and per-customer metrics

use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

use crate::data::{
    date_values, f64_values, i64_values, string_values, CUSTOMER_ID, INVOICE_DATE, INVOICE_ID,
    QUANTITY, UNIT_PRICE,
};
use crate::error::{RfmError, Stage};

pub const AMOUNT: &str = "amount";
pub const TOTAL: &str = "total";
pub const FIRST_PURCHASE: &str = "first_purchase";
pub const LAST_PURCHASE: &str = "last_purchase";
pub const ORDER_COUNT: &str = "order_count";
pub const MONETARY: &str = "monetary";

/// Raw purchase metrics for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: String,
    pub first_purchase: NaiveDate,
    pub last_purchase: NaiveDate,
    /// Distinct invoice dates
    pub order_count: i64,
    /// Sum of the customer's invoice totals
    pub monetary: f64,
}

impl CustomerMetrics {
    /// Collect the rows of a customer metrics frame in frame order
    pub fn from_frame(frame: &DataFrame) -> crate::Result<Vec<CustomerMetrics>> {
        let stage = Stage::CustomerAggregation;
        let ids = string_values(frame, CUSTOMER_ID, stage)?;
        let firsts = date_values(frame, FIRST_PURCHASE, stage)?;
        let lasts = date_values(frame, LAST_PURCHASE, stage)?;
        let orders = i64_values(frame, ORDER_COUNT, stage)?;
        let monetary = f64_values(frame, MONETARY, stage)?;

        let mut metrics = Vec::with_capacity(ids.len());
        for (i, customer_id) in ids.into_iter().enumerate() {
            if firsts[i] > lasts[i] {
                return Err(RfmError::integrity(
                    stage,
                    format!("customer {customer_id}"),
                    "first purchase is after last purchase",
                ));
            }
            metrics.push(CustomerMetrics {
                customer_id,
                first_purchase: firsts[i],
                last_purchase: lasts[i],
                order_count: orders[i],
                monetary: monetary[i],
            });
        }
        Ok(metrics)
    }
}

/// Stage 1: attach `amount = quantity * unit_price` to every line
pub fn value_lines(sales: LazyFrame) -> LazyFrame {
    sales.with_column((col(QUANTITY).cast(DataType::Float64) * col(UNIT_PRICE)).alias(AMOUNT))
}

/// Stage 2: one total per invoice
pub fn invoice_totals(valued: LazyFrame) -> LazyFrame {
    valued
        .group_by([col(INVOICE_ID)])
        .agg([col(AMOUNT).sum().alias(TOTAL)])
}

/// Materialize the bill table for a sales frame
pub fn bill_frame(sales: &DataFrame) -> crate::Result<DataFrame> {
    Ok(invoice_totals(value_lines(sales.clone().lazy())).collect()?)
}

/// Stage 3: aggregate sales lines into one metrics row per customer
///
/// Lines are first reduced to one order per (customer, invoice) so each
/// invoice total counts once, then left-joined with the bill table.
pub fn customer_metrics(sales: &DataFrame) -> crate::Result<DataFrame> {
    let valued = value_lines(sales.clone().lazy());
    let bills = invoice_totals(valued.clone());

    let orders = valued
        .group_by([col(CUSTOMER_ID), col(INVOICE_ID)])
        .agg([col(INVOICE_DATE).min().alias(INVOICE_DATE)])
        .left_join(bills, col(INVOICE_ID), col(INVOICE_ID))
        .collect()?;

    debug!(orders = orders.height(), "joined orders with invoice totals");
    check_orders(&orders)?;

    let metrics = orders
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_DATE).min().alias(FIRST_PURCHASE),
            col(INVOICE_DATE).max().alias(LAST_PURCHASE),
            col(INVOICE_DATE).n_unique().cast(DataType::Int64).alias(ORDER_COUNT),
            col(TOTAL).sum().alias(MONETARY),
        ])
        .collect()?;

    if metrics.height() == 0 {
        return Err(RfmError::EmptyDataset {
            stage: Stage::CustomerAggregation,
        });
    }

    debug!(customers = metrics.height(), "aggregated customer metrics");
    Ok(metrics)
}

/// Every order must carry an invoice total and belong to a single customer
fn check_orders(orders: &DataFrame) -> crate::Result<()> {
    let invoices = string_values(orders, INVOICE_ID, Stage::InvoiceAggregation)?;
    let customers = string_values(orders, CUSTOMER_ID, Stage::CustomerAggregation)?;
    let totals = orders.column(TOTAL)?.cast(&DataType::Float64)?;
    let totals = totals.as_materialized_series().f64()?;

    let mut owners: HashMap<&str, &str> = HashMap::with_capacity(invoices.len());
    for ((invoice, customer), total) in invoices.iter().zip(&customers).zip(totals.into_iter()) {
        if total.is_none() {
            return Err(RfmError::integrity(
                Stage::InvoiceAggregation,
                format!("invoice {invoice}"),
                format!("no invoice total for customer {customer}"),
            ));
        }
        if let Some(owner) = owners.insert(invoice.as_str(), customer.as_str()) {
            if owner != customer.as_str() {
                return Err(RfmError::integrity(
                    Stage::CustomerAggregation,
                    format!("invoice {invoice}"),
                    format!("invoice is shared by customers {owner} and {customer}"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{sales_frame, SalesLine};

    fn line(invoice: &str, customer: &str, quantity: i64, price: f64, day: u32) -> SalesLine {
        SalesLine {
            invoice_id: invoice.to_string(),
            customer_id: customer.to_string(),
            stock_code: "85123A".to_string(),
            quantity,
            unit_price: price,
            invoice_date: NaiveDate::from_ymd_opt(2011, 1, day).unwrap(),
        }
    }

    fn collect_sorted(sales: &DataFrame) -> Vec<CustomerMetrics> {
        let mut metrics = CustomerMetrics::from_frame(&customer_metrics(sales).unwrap()).unwrap();
        metrics.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
        metrics
    }

    #[test]
    fn test_bill_totals() {
        let sales = sales_frame(&[
            line("A1", "C1", 2, 10.0, 1),
            line("A1", "C1", 1, 5.5, 1),
            line("A2", "C2", 3, 1.0, 2),
        ])
        .unwrap();

        let bills = bill_frame(&sales).unwrap();
        let ids = string_values(&bills, INVOICE_ID, Stage::InvoiceAggregation).unwrap();
        let totals = f64_values(&bills, TOTAL, Stage::InvoiceAggregation).unwrap();
        let by_invoice: HashMap<_, _> = ids.into_iter().zip(totals).collect();

        assert_eq!(by_invoice.len(), 2);
        assert!((by_invoice["A1"] - 25.5).abs() < 1e-9);
        assert!((by_invoice["A2"] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_customer_metrics_counts_each_invoice_once() {
        let sales = sales_frame(&[
            line("A1", "C1", 1, 50.0, 1),
            line("A1", "C1", 1, 50.0, 1),
            line("A2", "C1", 3, 100.0, 31),
            line("B1", "C2", 1, 7.0, 15),
        ])
        .unwrap();

        let metrics = collect_sorted(&sales);
        assert_eq!(metrics.len(), 2);

        let c1 = &metrics[0];
        assert_eq!(c1.customer_id, "C1");
        assert_eq!(c1.first_purchase, NaiveDate::from_ymd_opt(2011, 1, 1).unwrap());
        assert_eq!(c1.last_purchase, NaiveDate::from_ymd_opt(2011, 1, 31).unwrap());
        assert_eq!(c1.order_count, 2);
        assert!((c1.monetary - 400.0).abs() < 1e-9);

        let c2 = &metrics[1];
        assert_eq!(c2.order_count, 1);
        assert_eq!(c2.first_purchase, c2.last_purchase);
    }

    #[test]
    fn test_order_count_uses_distinct_dates() {
        let sales = sales_frame(&[line("A1", "C1", 1, 1.0, 5), line("A2", "C1", 1, 1.0, 5)]).unwrap();

        let metrics = collect_sorted(&sales);
        assert_eq!(metrics[0].order_count, 1);
        assert!((metrics[0].monetary - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_shared_invoice_is_rejected() {
        let sales = sales_frame(&[line("A1", "C1", 1, 1.0, 5), line("A1", "C2", 1, 1.0, 5)]).unwrap();

        let err = customer_metrics(&sales).unwrap_err();
        assert!(matches!(
            err,
            RfmError::DataIntegrity {
                stage: Stage::CustomerAggregation,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_invoice_total_names_invoice() {
        let orders = df!(
            INVOICE_ID => ["A1", "A2"],
            CUSTOMER_ID => ["C1", "C2"],
            TOTAL => [Some(12.5), None]
        )
        .unwrap();

        match check_orders(&orders) {
            Err(RfmError::DataIntegrity { stage, entity, reason }) => {
                assert_eq!(stage, Stage::InvoiceAggregation);
                assert_eq!(entity, "invoice A2");
                assert!(reason.contains("C2"));
            }
            other => panic!("expected data integrity error, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_quantities_are_kept() {
        let sales = sales_frame(&[line("A1", "C1", 4, 2.0, 1), line("C2", "C1", -1, 2.0, 2)]).unwrap();

        let metrics = collect_sorted(&sales);
        assert!((metrics[0].monetary - 6.0).abs() < 1e-9);
    }
}
