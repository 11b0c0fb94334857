use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use billbook_core::{CustomerId, EntityKind, InvoiceId, Money, ProductId, SellerId};
use billbook_events::Activity;
use billbook_inventory::Product;
use billbook_invoicing::{Invoice, InvoiceFilter, InvoiceStatus};
use billbook_parties::{Customer, Seller};

/// Storage operation error.
///
/// These are **infrastructure errors** (availability, isolation conflicts,
/// corrupt rows) as opposed to domain errors (validation, invariants).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached (pool exhausted, connection refused, offline).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A concurrent transaction won (serialization failure or unique race).
    /// Safe to retry the whole transaction.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A schema constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A stored row could not be decoded into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result of a compare-and-swap stock decrement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { remaining: i64 },
    Insufficient { available: i64 },
    UnknownProduct,
}

/// Lightweight invoice row used by rollups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: InvoiceId,
    pub customer_id: CustomerId,
    pub status: InvoiceStatus,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&Invoice> for InvoiceSummary {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id(),
            customer_id: invoice.customer_id(),
            status: invoice.status(),
            amount: invoice.amount(),
            created_at: invoice.created_at(),
        }
    }
}

/// Transactional billing store.
///
/// Every engine operation opens exactly one transaction, performs all of its
/// reads and writes through it, and commits once. Implementations must:
/// - give read-write transactions serializable semantics
/// - roll back anything not committed when the transaction is dropped
/// - make stock reservation a single compare-and-swap (never read-then-write)
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Begin a read-write transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Begin a transaction used only for reads (listings, analytics).
    async fn begin_read(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        self.begin().await
    }
}

#[async_trait]
impl<S> BillingStore for Arc<S>
where
    S: BillingStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        (**self).begin().await
    }

    async fn begin_read(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        (**self).begin_read().await
    }
}

/// An open transaction. Dropping it without [`StoreTx::commit`] rolls back.
#[async_trait]
pub trait StoreTx: Send {
    // identifier counters

    /// Current counter value for `kind`, locking it for the rest of the transaction.
    async fn counter_value(&mut self, kind: EntityKind) -> Result<Option<u32>, StoreError>;
    async fn store_counter(&mut self, kind: EntityKind, value: u32) -> Result<(), StoreError>;
    /// Highest numeric suffix among existing ids of `kind` (legacy reconciliation).
    async fn max_allocated_suffix(&mut self, kind: EntityKind) -> Result<Option<u32>, StoreError>;
    async fn id_exists(&mut self, kind: EntityKind, number: u32) -> Result<bool, StoreError>;

    // sellers

    async fn insert_seller(&mut self, seller: &Seller) -> Result<(), StoreError>;
    async fn get_seller(&mut self, id: SellerId) -> Result<Option<Seller>, StoreError>;
    async fn find_seller_by_email(&mut self, email: &str) -> Result<Option<Seller>, StoreError>;
    async fn update_seller(&mut self, seller: &Seller) -> Result<(), StoreError>;
    /// Delete a seller together with its customers and products.
    async fn delete_seller(&mut self, id: SellerId) -> Result<(), StoreError>;
    async fn seller_invoice_count(&mut self, id: SellerId) -> Result<u64, StoreError>;

    // customers

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;
    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;
    async fn delete_customer(&mut self, id: CustomerId) -> Result<(), StoreError>;
    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError>;
    async fn find_customer_by_email(&mut self, email: &str) -> Result<Option<Customer>, StoreError>;
    /// Customers of a seller in id order.
    async fn list_customers(&mut self, seller_id: SellerId) -> Result<Vec<Customer>, StoreError>;
    async fn customer_invoice_count(&mut self, id: CustomerId) -> Result<u64, StoreError>;

    // products

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;
    /// Persist name/price/description. Stock is never written here.
    async fn update_product_details(&mut self, product: &Product) -> Result<(), StoreError>;
    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError>;
    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    /// Products of a seller in id order.
    async fn list_products(&mut self, seller_id: SellerId) -> Result<Vec<Product>, StoreError>;
    /// Number of invoice line items that reference the product.
    async fn product_reference_count(&mut self, id: ProductId) -> Result<u64, StoreError>;

    // stock

    /// Decrement stock by `quantity` only if at least `quantity` is on hand.
    async fn reserve_stock(
        &mut self,
        id: ProductId,
        quantity: i64,
    ) -> Result<ReserveOutcome, StoreError>;
    /// Increment stock; `None` when the product does not exist.
    async fn release_stock(&mut self, id: ProductId, quantity: i64)
    -> Result<Option<i64>, StoreError>;

    // invoices

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;
    /// Replace the header and the full item list.
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;
    /// Delete an invoice and (cascade) its items.
    async fn delete_invoice(&mut self, id: InvoiceId) -> Result<(), StoreError>;
    async fn get_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;
    /// Matching invoices of a seller, newest first.
    async fn list_invoices(
        &mut self,
        seller_id: SellerId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, StoreError>;
    async fn invoice_summaries(
        &mut self,
        seller_id: SellerId,
    ) -> Result<Vec<InvoiceSummary>, StoreError>;
    /// Set `overdue` on every `pending` invoice due strictly before `as_of`.
    async fn mark_overdue(&mut self, as_of: NaiveDate) -> Result<Vec<InvoiceId>, StoreError>;

    // activity log

    async fn append_activity(&mut self, activity: &Activity) -> Result<(), StoreError>;
    /// Newest first.
    async fn recent_activities(
        &mut self,
        actor_id: &str,
        limit: usize,
    ) -> Result<Vec<Activity>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
