//! Overdue sweep: promote `pending` invoices whose due date has passed.
//!
//! There is no background timer; reads that report invoice status call the
//! sweep first. Re-running it with the same `as_of` changes nothing.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, instrument};

use billbook_core::InvoiceId;
use billbook_events::Actor;
use billbook_invoicing::{InvoiceEvent, InvoicesMarkedOverdue};

use crate::engine::{BillingEngine, record};
use crate::error::EngineError;
use crate::store::BillingStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub as_of: NaiveDate,
    /// Invoices that moved to `overdue` in this run.
    pub marked: Vec<InvoiceId>,
}

impl<S: BillingStore> BillingEngine<S> {
    /// Mark every `pending` invoice with a due date strictly before `as_of` as
    /// `overdue`, across all sellers.
    #[instrument(skip(self), err)]
    pub async fn sweep_overdue(&self, as_of: NaiveDate) -> Result<SweepReport, EngineError> {
        self.run("sweep_overdue", move || self.sweep_once(as_of))
            .await
    }

    async fn sweep_once(&self, as_of: NaiveDate) -> Result<SweepReport, EngineError> {
        let mut tx = self.store().begin().await?;
        let marked = tx.mark_overdue(as_of).await?;
        if marked.is_empty() {
            return Ok(SweepReport { as_of, marked });
        }

        let event = InvoiceEvent::InvoicesMarkedOverdue(InvoicesMarkedOverdue {
            invoice_ids: marked.clone(),
            as_of,
        });
        record(&mut *tx, &Actor::system(), &event, self.now()).await?;
        tx.commit().await?;

        info!(%as_of, count = marked.len(), "marked invoices overdue");
        Ok(SweepReport { as_of, marked })
    }
}
