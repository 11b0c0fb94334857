//! Domain events and the activity audit trail.
//!
//! Every mutating business operation produces one or more [`Event`]s; the
//! infrastructure layer turns each into an append-only [`Activity`] row inside
//! the same transaction as the mutation.

pub mod activity;
pub mod event;

pub use activity::{Activity, Actor, ActorRole};
pub use event::Event;
