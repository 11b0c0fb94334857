//! `billbook-ai`
//!
//! **Responsibility:** boundary to the natural-language assistant.
//!
//! This crate is intentionally **not** part of the domain model:
//! - It must not depend on invoicing/inventory aggregates.
//! - It must not mutate domain state.
//! - It turns the assistant's output into a typed, *untrusted* [`Intent`];
//!   the engine revalidates every field before acting on it.

pub mod context;
pub mod extractor;
pub mod intent;
pub mod result;

pub use context::{ConversationTurn, CustomerSnapshot, IntentContext, ProductSnapshot, Speaker};
pub use extractor::{IntentExtractor, IntentRequest};
pub use intent::{
    AddCustomerIntent, AddProductIntent, CreateInvoiceIntent, Intent, IntentLine, IntentResponse,
};
pub use result::AiError;
