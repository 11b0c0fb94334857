//! Storage backends behind the transactional [`BillingStore`] seam.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;
pub use r#trait::{BillingStore, InvoiceSummary, ReserveOutcome, StoreError, StoreTx};
