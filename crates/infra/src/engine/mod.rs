//! Billing engine (application-level orchestration).
//!
//! The engine composes the pure domain crates (`billbook-parties`,
//! `billbook-inventory`, `billbook-invoicing`) over a transactional
//! [`BillingStore`]. Every public operation follows the same shape:
//!
//! ```text
//! operation(args)
//!   ↓
//! 1. Begin one store transaction
//!   ↓
//! 2. Load and check ownership (seller-scoped reads)
//!   ↓
//! 3. Decide with domain logic; move stock only through the ledger
//!   ↓
//! 4. Write rows + one Activity record through the same transaction
//!   ↓
//! 5. Commit (dropping the transaction on any early return rolls back)
//! ```
//!
//! ## Deadlines and retries
//!
//! [`BillingEngine::run`] wraps each operation in `store_timeout`. Expiry drops
//! the in-flight future (and with it the open transaction) and yields
//! [`EngineError::Timeout`]. A serialization conflict re-runs the whole
//! operation from step 1, up to `max_conflict_retries` times.
//!
//! ## Seller scoping
//!
//! Customers, products and invoices belong to one seller. Referencing another
//! seller's record is [`EngineError::AccessDenied`], never a silent miss.

mod catalog;
mod invoices;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use billbook_core::{CustomerId, InvoiceId, ProductId, SellerId};
use billbook_events::{Activity, Actor, Event};
use billbook_inventory::Product;
use billbook_invoicing::Invoice;
use billbook_parties::{Customer, Seller};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::store::{BillingStore, StoreTx};

/// Source of "now". Injected so tests can pin the calendar.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Today's date in UTC.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Midday UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        Self(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "invoice", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The invoice was cancelled now and its stock released.
    Cancelled(Invoice),
    /// The invoice was already cancelled; nothing changed.
    AlreadyCancelled(Invoice),
}

impl CancelOutcome {
    pub fn invoice(&self) -> &Invoice {
        match self {
            CancelOutcome::Cancelled(i) | CancelOutcome::AlreadyCancelled(i) => i,
        }
    }
}

/// Invoice lifecycle and inventory engine over a [`BillingStore`].
///
/// Cheap to share behind an `Arc`; it holds no per-request state.
pub struct BillingEngine<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S: BillingStore> BillingEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Run one operation under the store deadline, retrying conflicts.
    ///
    /// `attempt` must open (and commit) its own transaction so that a retry
    /// starts from a clean snapshot.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let deadline = self.config.store_timeout;
        let max_retries = self.config.max_conflict_retries;

        let work = async move {
            let mut retries = 0;
            loop {
                match attempt().await {
                    Err(EngineError::Conflict(reason)) if retries < max_retries => {
                        retries += 1;
                        warn!(operation, retries, %reason, "transaction conflict; retrying");
                    }
                    Err(err) => {
                        if err.is_business() {
                            debug!(operation, error = %err, "operation rejected");
                        } else {
                            warn!(operation, error = %err, "operation failed");
                        }
                        return Err(err);
                    }
                    ok => return ok,
                }
            }
        };

        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, ?deadline, "operation timed out; transaction rolled back");
                Err(EngineError::Timeout(deadline))
            }
        }
    }
}

/// Append the activity for `event` inside the current transaction.
pub(crate) async fn record<E: Event>(
    tx: &mut dyn StoreTx,
    actor: &Actor,
    event: &E,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    let activity = Activity::record(actor, event, at);
    debug!(action = %activity.action_type, actor = %activity.actor_id, "recording activity");
    tx.append_activity(&activity).await?;
    Ok(())
}

pub(crate) async fn require_seller(
    tx: &mut dyn StoreTx,
    seller_id: SellerId,
) -> Result<Seller, EngineError> {
    tx.get_seller(seller_id)
        .await?
        .ok_or_else(|| EngineError::not_found("seller", seller_id))
}

pub(crate) async fn owned_customer(
    tx: &mut dyn StoreTx,
    seller_id: SellerId,
    id: CustomerId,
) -> Result<Customer, EngineError> {
    let customer = tx
        .get_customer(id)
        .await?
        .ok_or_else(|| EngineError::not_found("customer", id))?;
    if customer.seller_id != seller_id {
        return Err(EngineError::access_denied("customer", id));
    }
    Ok(customer)
}

pub(crate) async fn owned_product(
    tx: &mut dyn StoreTx,
    seller_id: SellerId,
    id: ProductId,
) -> Result<Product, EngineError> {
    let product = tx
        .get_product(id)
        .await?
        .ok_or_else(|| EngineError::not_found("product", id))?;
    if product.seller_id != seller_id {
        return Err(EngineError::access_denied("product", id));
    }
    Ok(product)
}

pub(crate) async fn owned_invoice(
    tx: &mut dyn StoreTx,
    seller_id: SellerId,
    id: InvoiceId,
) -> Result<Invoice, EngineError> {
    let invoice = tx
        .get_invoice(id)
        .await?
        .ok_or_else(|| EngineError::not_found("invoice", id))?;
    if invoice.seller_id() != seller_id {
        return Err(EngineError::access_denied("invoice", id));
    }
    Ok(invoice)
}

/// Case-insensitive substring match; `None` or blank matches everything.
pub(crate) fn name_matches(name: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => name.to_lowercase().contains(&n.to_lowercase()),
        None => true,
    }
}
