//! `billbook-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the error model, human-readable identifiers, money and date windows.

pub mod error;
pub mod id;
pub mod money;
pub mod period;

pub use error::DomainError;
pub use id::{CustomerId, EntityKind, InvoiceId, ProductId, SellerId};
pub use money::Money;
pub use period::DateRange;
