//! Invoicing domain module (invoice lifecycle).
//!
//! This crate contains business rules for invoices: the status machine, line
//! totals, the amount invariant and the shapes of create/edit requests. It is
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod command;
pub mod filter;
pub mod invoice;

pub use command::{CreateInvoice, CustomerRef, DueDateChange, InvoiceEdit, ItemOp, LineRequest, ProductRef};
pub use filter::InvoiceFilter;
pub use invoice::{
    Invoice, InvoiceCancelled, InvoiceCreated, InvoiceDeleted, InvoiceEvent, InvoiceItem,
    InvoiceItemId, InvoiceParts, InvoiceStatus, InvoiceUpdated, InvoicesMarkedOverdue,
};
