//! Infrastructure layer: storage, transactions, configuration and the
//! billing engine that composes the domain crates over a [`BillingStore`].

pub mod allocator;
pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod ledger;
pub mod store;
pub mod sweeper;

pub use analytics::{CustomerAnalytics, CustomerStat, SellerDashboard};
pub use config::{ConfigError, DatabaseConfig, EngineConfig};
pub use engine::{BillingEngine, CancelOutcome, Clock, FixedClock, SystemClock};
pub use error::EngineError;
pub use intent::IntentOutcome;
pub use store::{BillingStore, InMemoryStore, PgStore, StoreError, StoreTx};
pub use sweeper::SweepReport;
