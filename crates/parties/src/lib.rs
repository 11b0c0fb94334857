//! Parties domain module (sellers and their customers).
//!
//! This crate contains business rules for sellers and customers, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod contact;
pub mod customer;
pub mod seller;

pub use contact::normalize_email;
pub use customer::{
    Customer, CustomerCreated, CustomerDeleted, CustomerEvent, CustomerUpdate, CustomerUpdated,
    NewCustomer,
};
pub use seller::{
    Credential, NewSeller, Seller, SellerDeleted, SellerEvent, SellerRegistered, SellerUpdate,
    SellerUpdated,
};
