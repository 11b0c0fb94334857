//! Inventory domain module (products and their stock counts).
//!
//! This crate contains business rules for products and stock arithmetic,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).
//! Atomic application of stock changes against storage lives in the infra ledger.

pub mod product;
pub mod stock;

pub use product::{
    NewProduct, Product, ProductAdded, ProductDeleted, ProductEvent, ProductUpdate,
    ProductUpdated, StockReceived,
};
pub use stock::{StockAdjustment, release, reserve, validate_quantity};
