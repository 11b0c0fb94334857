use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use billbook_core::{CustomerId, DomainError, InvoiceId, SellerId};
use billbook_events::Actor;
use billbook_invoicing::{
    CreateInvoice, CustomerRef, Invoice, InvoiceCancelled, InvoiceDeleted, InvoiceEdit,
    InvoiceEvent, InvoiceFilter, InvoiceItem, InvoiceItemId, InvoiceStatus, ItemOp, LineRequest,
    ProductRef,
};

use super::catalog::{insert_new_customer, insert_new_product};
use super::{BillingEngine, CancelOutcome, owned_customer, owned_invoice, owned_product, record, require_seller};
use crate::allocator;
use crate::error::EngineError;
use crate::ledger;
use crate::store::{BillingStore, StoreTx};

impl<S: BillingStore> BillingEngine<S> {
    /// Create an invoice, reserving stock for every line.
    ///
    /// All-or-nothing: a failure on any line (unknown product, insufficient
    /// stock, bad discount) leaves stock, customers, products and counters
    /// exactly as they were.
    #[instrument(skip(self, cmd), fields(seller_id = %cmd.seller_id, lines = cmd.items.len()), err)]
    pub async fn create_invoice(&self, cmd: &CreateInvoice) -> Result<Invoice, EngineError> {
        self.run("create_invoice", move || self.create_invoice_once(cmd))
            .await
    }

    async fn create_invoice_once(&self, cmd: &CreateInvoice) -> Result<Invoice, EngineError> {
        if cmd.items.is_empty() {
            return Err(EngineError::EmptyItemList);
        }
        let now = self.now();
        let actor = Actor::seller(cmd.seller_id);

        let mut tx = self.store.begin().await?;
        require_seller(&mut *tx, cmd.seller_id).await?;

        let customer_id = match &cmd.customer {
            CustomerRef::Existing { customer_id } => {
                owned_customer(&mut *tx, cmd.seller_id, *customer_id)
                    .await?
                    .id
            }
            CustomerRef::New(payload) => {
                insert_new_customer(&mut *tx, &actor, cmd.seller_id, payload.clone(), now)
                    .await?
                    .id
            }
        };

        let mut items = Vec::with_capacity(cmd.items.len());
        for line in &cmd.items {
            items.push(resolve_line(&mut *tx, &actor, cmd.seller_id, line, now).await?);
        }

        let id = allocator::invoice_id(&mut *tx).await?;
        let (invoice, event) = Invoice::issue(
            id,
            cmd.seller_id,
            customer_id,
            items,
            cmd.tax,
            cmd.due_date,
            now,
        )?;
        tx.insert_invoice(&invoice).await?;
        record(&mut *tx, &actor, &event, now).await?;
        tx.commit().await?;

        info!(
            invoice_id = %invoice.id(),
            amount = %invoice.amount(),
            status = %invoice.status(),
            "invoice created"
        );
        Ok(invoice)
    }

    /// Apply an edit. Item operations run in order; any failure aborts the
    /// whole edit and leaves the invoice and stock untouched.
    ///
    /// A `cancelled` target status releases the stock of the lines as they
    /// stand after the item operations. The amount is recomputed either way.
    #[instrument(skip(self, edit), fields(seller_id = %seller_id, invoice_id = %invoice_id), err)]
    pub async fn edit_invoice(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
        edit: &InvoiceEdit,
    ) -> Result<Invoice, EngineError> {
        self.run("edit_invoice", move || {
            self.edit_invoice_once(seller_id, invoice_id, edit)
        })
        .await
    }

    async fn edit_invoice_once(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
        edit: &InvoiceEdit,
    ) -> Result<Invoice, EngineError> {
        let now = self.now();
        let today = now.date_naive();
        let actor = Actor::seller(seller_id);

        let mut tx = self.store.begin().await?;
        let mut invoice = owned_invoice(&mut *tx, seller_id, invoice_id).await?;
        invoice.ensure_mutable()?;
        if edit.is_empty() {
            return Ok(invoice);
        }

        if let Some(tax) = edit.tax {
            invoice.set_tax(tax)?;
        }
        if let Some(change) = edit.due_date {
            invoice.set_due_date(change.into_option())?;
        }
        for op in &edit.items {
            apply_item_op(&mut *tx, &actor, seller_id, &mut invoice, op, now).await?;
        }

        if invoice.items().is_empty() {
            return Err(EngineError::EmptyItemList);
        }
        invoice.recompute_amount()?;

        let event = match edit.status {
            Some(InvoiceStatus::Cancelled) => {
                let released_units = release_all(&mut *tx, &invoice).await?;
                invoice.cancel();
                InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
                    invoice_id,
                    released_units,
                })
            }
            target => {
                if let Some(target) = target {
                    invoice.transition_to(target, today)?;
                }
                invoice.refresh_overdue(today);
                invoice.updated_event()
            }
        };

        tx.update_invoice(&invoice).await?;
        record(&mut *tx, &actor, &event, now).await?;
        tx.commit().await?;

        info!(
            invoice_id = %invoice_id,
            amount = %invoice.amount(),
            status = %invoice.status(),
            "invoice updated"
        );
        Ok(invoice)
    }

    /// Cancel an invoice and return its stock. Cancelling twice is a no-op.
    #[instrument(skip(self), err)]
    pub async fn cancel_invoice(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
    ) -> Result<CancelOutcome, EngineError> {
        self.run("cancel_invoice", move || {
            self.cancel_invoice_once(seller_id, invoice_id)
        })
        .await
    }

    async fn cancel_invoice_once(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
    ) -> Result<CancelOutcome, EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut invoice = owned_invoice(&mut *tx, seller_id, invoice_id).await?;

        if invoice.status() == InvoiceStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled(invoice));
        }

        let released_units = release_all(&mut *tx, &invoice).await?;
        invoice.cancel();
        tx.update_invoice(&invoice).await?;
        let event = InvoiceEvent::InvoiceCancelled(InvoiceCancelled {
            invoice_id,
            released_units,
        });
        record(&mut *tx, &Actor::seller(seller_id), &event, now).await?;
        tx.commit().await?;

        info!(%invoice_id, released_units, "invoice cancelled");
        Ok(CancelOutcome::Cancelled(invoice))
    }

    /// Delete a cancelled invoice and its items. Stock is not touched.
    #[instrument(skip(self), err)]
    pub async fn delete_invoice(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
    ) -> Result<(), EngineError> {
        self.run("delete_invoice", move || {
            self.delete_invoice_once(seller_id, invoice_id)
        })
        .await
    }

    async fn delete_invoice_once(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
    ) -> Result<(), EngineError> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let invoice = owned_invoice(&mut *tx, seller_id, invoice_id).await?;
        invoice.ensure_deletable()?;

        tx.delete_invoice(invoice_id).await?;
        let event = InvoiceEvent::InvoiceDeleted(InvoiceDeleted { invoice_id });
        record(&mut *tx, &Actor::seller(seller_id), &event, now).await?;
        tx.commit().await?;

        info!(%invoice_id, "invoice deleted");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_invoice(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, EngineError> {
        self.run("get_invoice", move || self.get_invoice_once(seller_id, invoice_id))
            .await
    }

    async fn get_invoice_once(
        &self,
        seller_id: SellerId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, EngineError> {
        let mut tx = self.store.begin_read().await?;
        owned_invoice(&mut *tx, seller_id, invoice_id).await
    }

    /// Matching invoices of a seller, newest first. Runs the overdue sweep
    /// first so statuses reflect today.
    #[instrument(skip(self, filter), fields(seller_id = %seller_id), err)]
    pub async fn list_invoices(
        &self,
        seller_id: SellerId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, EngineError> {
        self.sweep_overdue(self.today()).await?;
        self.run("list_invoices", move || self.list_invoices_once(seller_id, filter))
            .await
    }

    async fn list_invoices_once(
        &self,
        seller_id: SellerId,
        filter: &InvoiceFilter,
    ) -> Result<Vec<Invoice>, EngineError> {
        let mut tx = self.store.begin_read().await?;
        Ok(tx.list_invoices(seller_id, filter).await?)
    }

    /// Invoice history of one customer, newest first. The customer must
    /// belong to the seller.
    #[instrument(skip(self), err)]
    pub async fn list_customer_invoices(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<Vec<Invoice>, EngineError> {
        self.sweep_overdue(self.today()).await?;
        self.run("list_customer_invoices", move || {
            self.list_customer_invoices_once(seller_id, customer_id)
        })
        .await
    }

    async fn list_customer_invoices_once(
        &self,
        seller_id: SellerId,
        customer_id: CustomerId,
    ) -> Result<Vec<Invoice>, EngineError> {
        let mut tx = self.store.begin_read().await?;
        owned_customer(&mut *tx, seller_id, customer_id).await?;
        let filter = InvoiceFilter {
            customer_id: Some(customer_id),
            ..InvoiceFilter::default()
        };
        Ok(tx.list_invoices(seller_id, &filter).await?)
    }
}

/// Resolve the product of a request line, validate the line, then reserve its stock.
async fn resolve_line(
    tx: &mut dyn StoreTx,
    actor: &Actor,
    seller_id: SellerId,
    line: &LineRequest,
    now: DateTime<Utc>,
) -> Result<InvoiceItem, EngineError> {
    let product = match &line.product {
        ProductRef::Existing { product_id } => owned_product(tx, seller_id, *product_id).await?,
        ProductRef::New(payload) => {
            insert_new_product(tx, actor, seller_id, payload.clone(), now).await?
        }
    };
    let item = InvoiceItem::new(product.id, line.quantity, product.price, line.discount)?;
    ledger::reserve(tx, product.id, item.quantity).await?;
    Ok(item)
}

async fn apply_item_op(
    tx: &mut dyn StoreTx,
    actor: &Actor,
    seller_id: SellerId,
    invoice: &mut Invoice,
    op: &ItemOp,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    match op {
        ItemOp::Update {
            item_id,
            quantity,
            discount,
            product_id,
        } => {
            let current = invoice
                .item(*item_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("invoice item", item_id))?;

            let mut updated = current.clone();
            if let Some(q) = quantity {
                updated.quantity = *q;
            }
            if let Some(d) = discount {
                updated.discount = *d;
            }

            match product_id.filter(|p| *p != current.product_id) {
                Some(substitute) => {
                    let product = owned_product(tx, seller_id, substitute).await?;
                    updated.product_id = product.id;
                    updated.unit_price = product.price;
                    updated.validate()?;
                    ledger::release(tx, current.product_id, current.quantity).await?;
                    ledger::reserve(tx, product.id, updated.quantity).await?;
                }
                None => {
                    updated.validate()?;
                    ledger::adjust_for_quantity_change(
                        tx,
                        current.product_id,
                        current.quantity,
                        updated.quantity,
                    )
                    .await?;
                }
            }

            *item_slot(invoice, *item_id)? = updated;
        }
        ItemOp::Remove { item_id } => {
            let removed = invoice
                .remove_item(*item_id)
                .map_err(|e| missing_item(e, *item_id))?;
            ledger::release(tx, removed.product_id, removed.quantity).await?;
        }
        ItemOp::Add(line) => {
            invoice.ensure_mutable()?;
            let item = resolve_line(tx, actor, seller_id, line, now).await?;
            invoice.add_item(item)?;
        }
    }
    Ok(())
}

fn item_slot(invoice: &mut Invoice, item_id: InvoiceItemId) -> Result<&mut InvoiceItem, EngineError> {
    invoice
        .item_mut(item_id)
        .map_err(|e| missing_item(e, item_id))
}

fn missing_item(err: DomainError, item_id: InvoiceItemId) -> EngineError {
    match err {
        DomainError::NotFound => EngineError::not_found("invoice item", item_id),
        other => other.into(),
    }
}

/// Return every line's quantity to stock. Returns the number of units released.
async fn release_all(tx: &mut dyn StoreTx, invoice: &Invoice) -> Result<i64, EngineError> {
    let mut released = 0i64;
    for item in invoice.items() {
        ledger::release(tx, item.product_id, item.quantity).await?;
        released = released.saturating_add(item.quantity);
    }
    Ok(released)
}
