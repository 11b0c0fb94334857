use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use billbook_core::{CustomerId, EntityKind, InvoiceId, ProductId, SellerId};
use billbook_events::Activity;
use billbook_inventory::Product;
use billbook_invoicing::{Invoice, InvoiceFilter, InvoiceStatus};
use billbook_parties::{Customer, Seller};

use super::r#trait::{BillingStore, InvoiceSummary, ReserveOutcome, StoreError, StoreTx};

#[derive(Debug, Clone, Default)]
struct StoreState {
    sellers: BTreeMap<SellerId, Seller>,
    customers: BTreeMap<CustomerId, Customer>,
    products: BTreeMap<ProductId, Product>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    counters: BTreeMap<EntityKind, u32>,
}

/// Everything behind the store lock. The activity log is append-only, so it
/// lives beside the copyable state instead of inside it.
#[derive(Debug, Default)]
struct Shared {
    state: StoreState,
    activities: Vec<Activity>,
}

/// In-memory transactional store.
///
/// Intended for tests/dev. A transaction holds the single store lock, so
/// every transaction is trivially serializable. Reads go straight to the
/// shared state; the first write takes a private copy, which replaces the
/// shared state on commit. Appended activities are buffered the same way.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Mutex<Shared>>,
    offline: Arc<AtomicBool>,
    commit_delay_ms: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable backend: `begin` fails while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every commit (for exercising operation deadlines).
    pub fn set_commit_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.commit_delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".into()));
        }
        let guard = self.shared.clone().lock_owned().await;
        Ok(Box::new(InMemoryTx {
            guard,
            working: None,
            appended: Vec::new(),
            commit_delay_ms: self.commit_delay_ms.clone(),
        }))
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<Shared>,
    /// Private copy, taken on the first write.
    working: Option<StoreState>,
    appended: Vec<Activity>,
    commit_delay_ms: Arc<AtomicU64>,
}

impl InMemoryTx {
    fn state(&self) -> &StoreState {
        self.working.as_ref().unwrap_or(&self.guard.state)
    }

    fn state_mut(&mut self) -> &mut StoreState {
        let shared = &self.guard.state;
        self.working.get_or_insert_with(|| shared.clone())
    }
}

fn missing(what: &str, id: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{what} {id} does not exist"))
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn counter_value(&mut self, kind: EntityKind) -> Result<Option<u32>, StoreError> {
        Ok(self.state().counters.get(&kind).copied())
    }

    async fn store_counter(&mut self, kind: EntityKind, value: u32) -> Result<(), StoreError> {
        self.state_mut().counters.insert(kind, value);
        Ok(())
    }

    async fn max_allocated_suffix(&mut self, kind: EntityKind) -> Result<Option<u32>, StoreError> {
        let s = self.state();
        let max = match kind {
            EntityKind::Seller => s.sellers.keys().map(|k| k.number()).max(),
            EntityKind::Customer => s.customers.keys().map(|k| k.number()).max(),
            EntityKind::Product => s.products.keys().map(|k| k.number()).max(),
            EntityKind::Invoice => s.invoices.keys().map(|k| k.number()).max(),
        };
        Ok(max)
    }

    async fn id_exists(&mut self, kind: EntityKind, number: u32) -> Result<bool, StoreError> {
        let s = self.state();
        Ok(match kind {
            EntityKind::Seller => s.sellers.contains_key(&SellerId::from_number(number)),
            EntityKind::Customer => s.customers.contains_key(&CustomerId::from_number(number)),
            EntityKind::Product => s.products.contains_key(&ProductId::from_number(number)),
            EntityKind::Invoice => s.invoices.contains_key(&InvoiceId::from_number(number)),
        })
    }

    async fn insert_seller(&mut self, seller: &Seller) -> Result<(), StoreError> {
        if self.state().sellers.contains_key(&seller.id) {
            return Err(StoreError::Conflict(format!("seller {} already exists", seller.id)));
        }
        if self.state().sellers.values().any(|s| s.email == seller.email) {
            return Err(StoreError::Conflict("seller email already exists".into()));
        }
        self.state_mut().sellers.insert(seller.id, seller.clone());
        Ok(())
    }

    async fn get_seller(&mut self, id: SellerId) -> Result<Option<Seller>, StoreError> {
        Ok(self.state().sellers.get(&id).cloned())
    }

    async fn find_seller_by_email(&mut self, email: &str) -> Result<Option<Seller>, StoreError> {
        Ok(self
            .state()
            .sellers
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn update_seller(&mut self, seller: &Seller) -> Result<(), StoreError> {
        if self
            .state()
            .sellers
            .values()
            .any(|s| s.id != seller.id && s.email == seller.email)
        {
            return Err(StoreError::Conflict("seller email already exists".into()));
        }
        match self.state_mut().sellers.get_mut(&seller.id) {
            Some(slot) => {
                *slot = seller.clone();
                Ok(())
            }
            None => Err(missing("seller", seller.id)),
        }
    }

    async fn delete_seller(&mut self, id: SellerId) -> Result<(), StoreError> {
        if self.state().invoices.values().any(|i| i.seller_id() == id) {
            return Err(StoreError::Constraint(format!("seller {id} is referenced")));
        }
        let state = self.state_mut();
        state.customers.retain(|_, c| c.seller_id != id);
        state.products.retain(|_, p| p.seller_id != id);
        state.sellers.remove(&id);
        Ok(())
    }

    async fn seller_invoice_count(&mut self, id: SellerId) -> Result<u64, StoreError> {
        Ok(self
            .state()
            .invoices
            .values()
            .filter(|i| i.seller_id() == id)
            .count() as u64)
    }

    async fn insert_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        if self.state().customers.contains_key(&customer.id) {
            return Err(StoreError::Conflict(format!(
                "customer {} already exists",
                customer.id
            )));
        }
        if self.state().customers.values().any(|c| c.email == customer.email) {
            return Err(StoreError::Conflict("customer email already exists".into()));
        }
        self.state_mut().customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn update_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        if self
            .state()
            .customers
            .values()
            .any(|c| c.id != customer.id && c.email == customer.email)
        {
            return Err(StoreError::Conflict("customer email already exists".into()));
        }
        match self.state_mut().customers.get_mut(&customer.id) {
            Some(slot) => {
                *slot = customer.clone();
                Ok(())
            }
            None => Err(missing("customer", customer.id)),
        }
    }

    async fn delete_customer(&mut self, id: CustomerId) -> Result<(), StoreError> {
        if self.state().invoices.values().any(|i| i.customer_id() == id) {
            return Err(StoreError::Constraint(format!("customer {id} is referenced")));
        }
        self.state_mut().customers.remove(&id);
        Ok(())
    }

    async fn get_customer(&mut self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.state().customers.get(&id).cloned())
    }

    async fn find_customer_by_email(&mut self, email: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self
            .state()
            .customers
            .values()
            .find(|c| c.email == email)
            .cloned())
    }

    async fn list_customers(&mut self, seller_id: SellerId) -> Result<Vec<Customer>, StoreError> {
        Ok(self
            .state()
            .customers
            .values()
            .filter(|c| c.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn customer_invoice_count(&mut self, id: CustomerId) -> Result<u64, StoreError> {
        Ok(self
            .state()
            .invoices
            .values()
            .filter(|i| i.customer_id() == id)
            .count() as u64)
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        if product.stock < 0 {
            return Err(StoreError::Constraint("stock must be non-negative".into()));
        }
        if self.state().products.contains_key(&product.id) {
            return Err(StoreError::Conflict(format!(
                "product {} already exists",
                product.id
            )));
        }
        self.state_mut().products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product_details(&mut self, product: &Product) -> Result<(), StoreError> {
        let slot = self
            .state_mut()
            .products
            .get_mut(&product.id)
            .ok_or_else(|| missing("product", product.id))?;
        slot.name = product.name.clone();
        slot.price = product.price;
        slot.description = product.description.clone();
        Ok(())
    }

    async fn delete_product(&mut self, id: ProductId) -> Result<(), StoreError> {
        let referenced = self
            .state()
            .invoices
            .values()
            .any(|i| i.items().iter().any(|item| item.product_id == id));
        if referenced {
            return Err(StoreError::Constraint(format!("product {id} is referenced")));
        }
        self.state_mut().products.remove(&id);
        Ok(())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.state().products.get(&id).cloned())
    }

    async fn list_products(&mut self, seller_id: SellerId) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .state()
            .products
            .values()
            .filter(|p| p.seller_id == seller_id)
            .cloned()
            .collect())
    }

    async fn product_reference_count(&mut self, id: ProductId) -> Result<u64, StoreError> {
        Ok(self
            .state()
            .invoices
            .values()
            .flat_map(|i| i.items())
            .filter(|item| item.product_id == id)
            .count() as u64)
    }

    async fn reserve_stock(
        &mut self,
        id: ProductId,
        quantity: i64,
    ) -> Result<ReserveOutcome, StoreError> {
        let Some(product) = self.state_mut().products.get_mut(&id) else {
            return Ok(ReserveOutcome::UnknownProduct);
        };
        if product.stock < quantity {
            return Ok(ReserveOutcome::Insufficient {
                available: product.stock,
            });
        }
        product.stock -= quantity;
        Ok(ReserveOutcome::Reserved {
            remaining: product.stock,
        })
    }

    async fn release_stock(
        &mut self,
        id: ProductId,
        quantity: i64,
    ) -> Result<Option<i64>, StoreError> {
        let Some(product) = self.state_mut().products.get_mut(&id) else {
            return Ok(None);
        };
        product.stock = product
            .stock
            .checked_add(quantity)
            .ok_or_else(|| StoreError::Constraint("stock overflow".into()))?;
        Ok(Some(product.stock))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        if self.state().invoices.contains_key(&invoice.id()) {
            return Err(StoreError::Conflict(format!(
                "invoice {} already exists",
                invoice.id()
            )));
        }
        self.state_mut().invoices.insert(invoice.id(), invoice.clone());
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        match self.state_mut().invoices.get_mut(&invoice.id()) {
            Some(slot) => {
                *slot = invoice.clone();
                Ok(())
            }
            None => Err(missing("invoice", invoice.id())),
        }
    }

    async fn delete_invoice(&mut self, id: InvoiceId) -> Result<(), StoreError> {
        self.state_mut().invoices.remove(&id);
        Ok(())
    }

    async fn get_invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self.state().invoices.get(&id).cloned())
    }

    async fn list_invoices(
        &mut self,
        seller_id: SellerId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, StoreError> {
        let s = self.state();
        let mut found: Vec<Invoice> = s
            .invoices
            .values()
            .filter(|i| i.seller_id() == seller_id)
            .filter(|i| filter.matches(i, s.customers.get(&i.customer_id())))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(found)
    }

    async fn invoice_summaries(
        &mut self,
        seller_id: SellerId,
    ) -> Result<Vec<InvoiceSummary>, StoreError> {
        Ok(self
            .state()
            .invoices
            .values()
            .filter(|i| i.seller_id() == seller_id)
            .map(InvoiceSummary::from)
            .collect())
    }

    async fn mark_overdue(&mut self, as_of: NaiveDate) -> Result<Vec<InvoiceId>, StoreError> {
        let mut marked = Vec::new();
        let due = |i: &Invoice| i.status() == InvoiceStatus::Pending && i.is_past_due(as_of);
        if !self.state().invoices.values().any(due) {
            return Ok(marked);
        }
        for invoice in self.state_mut().invoices.values_mut() {
            if invoice.mark_overdue(as_of) {
                marked.push(invoice.id());
            }
        }
        Ok(marked)
    }

    async fn append_activity(&mut self, activity: &Activity) -> Result<(), StoreError> {
        self.appended.push(activity.clone());
        Ok(())
    }

    async fn recent_activities(
        &mut self,
        actor_id: &str,
        limit: usize,
    ) -> Result<Vec<Activity>, StoreError> {
        let mut found: Vec<Activity> = self
            .guard
            .activities
            .iter()
            .chain(&self.appended)
            .rev()
            .filter(|a| a.actor_id == actor_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep latest-appended first.
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit);
        Ok(found)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let InMemoryTx {
            mut guard,
            working,
            appended,
            ..
        } = *self;
        if let Some(working) = working {
            guard.state = working;
        }
        guard.activities.extend(appended);
        Ok(())
    }
}
