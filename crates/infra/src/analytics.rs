//! Read-only rollups over a seller's customers and invoices.
//!
//! Customer rankings only count `paid` invoices created inside the window.
//! "Most" rankings consider customers with at least one such invoice; "least"
//! rankings consider every customer of the seller, counting zero for those
//! without one. Ties keep the first customer in id order.

use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;

use billbook_core::{CustomerId, DateRange, DomainError, Money, SellerId};
use billbook_events::Activity;
use billbook_invoicing::InvoiceStatus;
use billbook_parties::Customer;

use crate::engine::BillingEngine;
use crate::error::EngineError;
use crate::store::{BillingStore, InvoiceSummary};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerStat {
    pub customer_id: CustomerId,
    pub name: String,
    pub email: String,
    /// Paid invoices in the window.
    pub invoice_count: u64,
    /// Sum of those invoices' amounts.
    pub total_purchased: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerAnalytics {
    pub range: DateRange,
    pub most_invoices: Option<CustomerStat>,
    pub least_invoices: Option<CustomerStat>,
    pub most_purchased: Option<CustomerStat>,
    pub least_purchased: Option<CustomerStat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SellerDashboard {
    pub product_count: u64,
    pub customer_count: u64,
    pub invoice_count: u64,
    pub paid_count: u64,
    pub pending_count: u64,
    pub overdue_count: u64,
    pub cancelled_count: u64,
    /// Sum of paid invoice amounts.
    pub revenue_collected: Money,
    /// Sum of pending and overdue invoice amounts.
    pub revenue_due: Money,
}

fn pick<'a>(
    stats: &'a [CustomerStat],
    eligible: impl Fn(&CustomerStat) -> bool,
    better: impl Fn(&CustomerStat, &CustomerStat) -> bool,
) -> Option<CustomerStat> {
    let mut best: Option<&'a CustomerStat> = None;
    for stat in stats.iter().filter(|s| eligible(s)) {
        match best {
            Some(current) if !better(stat, current) => {}
            _ => best = Some(stat),
        }
    }
    best.cloned()
}

/// Rank customers by paid invoices in `range`.
pub fn aggregate(
    customers: &[Customer],
    invoices: &[InvoiceSummary],
    range: DateRange,
) -> Result<CustomerAnalytics, DomainError> {
    let mut paid: HashMap<CustomerId, (u64, Money)> = HashMap::new();
    for invoice in invoices
        .iter()
        .filter(|i| i.status == InvoiceStatus::Paid && range.contains(i.created_at))
    {
        let (count, total) = paid.entry(invoice.customer_id).or_insert((0, Money::ZERO));
        *count += 1;
        *total = total.checked_add(invoice.amount)?;
    }

    let mut stats: Vec<CustomerStat> = customers
        .iter()
        .map(|customer| {
            let (invoice_count, total_purchased) =
                paid.get(&customer.id).copied().unwrap_or((0, Money::ZERO));
            CustomerStat {
                customer_id: customer.id,
                name: customer.name.clone(),
                email: customer.email.clone(),
                invoice_count,
                total_purchased,
            }
        })
        .collect();
    stats.sort_by_key(|s| s.customer_id);

    let has_paid = |s: &CustomerStat| s.invoice_count > 0;
    let any = |_: &CustomerStat| true;
    Ok(CustomerAnalytics {
        range,
        most_invoices: pick(&stats, has_paid, |a, b| a.invoice_count > b.invoice_count),
        least_invoices: pick(&stats, any, |a, b| a.invoice_count < b.invoice_count),
        most_purchased: pick(&stats, has_paid, |a, b| a.total_purchased > b.total_purchased),
        least_purchased: pick(&stats, any, |a, b| a.total_purchased < b.total_purchased),
    })
}

/// Counts and revenue over all of a seller's invoices.
pub fn dashboard(
    product_count: u64,
    customer_count: u64,
    invoices: &[InvoiceSummary],
) -> Result<SellerDashboard, DomainError> {
    let mut board = SellerDashboard {
        product_count,
        customer_count,
        invoice_count: invoices.len() as u64,
        ..SellerDashboard::default()
    };
    for invoice in invoices {
        match invoice.status {
            InvoiceStatus::Paid => {
                board.paid_count += 1;
                board.revenue_collected = board.revenue_collected.checked_add(invoice.amount)?;
            }
            InvoiceStatus::Pending | InvoiceStatus::Overdue => {
                if invoice.status == InvoiceStatus::Pending {
                    board.pending_count += 1;
                } else {
                    board.overdue_count += 1;
                }
                board.revenue_due = board.revenue_due.checked_add(invoice.amount)?;
            }
            InvoiceStatus::Cancelled => board.cancelled_count += 1,
        }
    }
    Ok(board)
}

impl<S: BillingStore> BillingEngine<S> {
    /// Customer rankings for a seller. Sweeps first so statuses are current.
    #[instrument(skip(self), err)]
    pub async fn analytics(
        &self,
        seller_id: SellerId,
        range: DateRange,
    ) -> Result<CustomerAnalytics, EngineError> {
        self.sweep_overdue(self.today()).await?;
        self.run("analytics", move || self.analytics_once(seller_id, range))
            .await
    }

    async fn analytics_once(
        &self,
        seller_id: SellerId,
        range: DateRange,
    ) -> Result<CustomerAnalytics, EngineError> {
        let mut tx = self.store().begin_read().await?;
        let customers = tx.list_customers(seller_id).await?;
        let invoices = tx.invoice_summaries(seller_id).await?;
        Ok(aggregate(&customers, &invoices, range)?)
    }

    #[instrument(skip(self), err)]
    pub async fn dashboard(&self, seller_id: SellerId) -> Result<SellerDashboard, EngineError> {
        self.sweep_overdue(self.today()).await?;
        self.run("dashboard", move || self.dashboard_once(seller_id))
            .await
    }

    async fn dashboard_once(&self, seller_id: SellerId) -> Result<SellerDashboard, EngineError> {
        let mut tx = self.store().begin_read().await?;
        let products = tx.list_products(seller_id).await?.len() as u64;
        let customers = tx.list_customers(seller_id).await?.len() as u64;
        let invoices = tx.invoice_summaries(seller_id).await?;
        Ok(dashboard(products, customers, &invoices)?)
    }

    /// Latest activity records of one actor, newest first.
    #[instrument(skip(self), err)]
    pub async fn recent_activities(
        &self,
        actor_id: &str,
        limit: usize,
    ) -> Result<Vec<Activity>, EngineError> {
        self.run("recent_activities", move || {
            self.recent_activities_once(actor_id, limit)
        })
        .await
    }

    async fn recent_activities_once(
        &self,
        actor_id: &str,
        limit: usize,
    ) -> Result<Vec<Activity>, EngineError> {
        let mut tx = self.store().begin_read().await?;
        Ok(tx.recent_activities(actor_id, limit).await?)
    }
}
