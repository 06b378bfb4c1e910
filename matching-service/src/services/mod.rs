//! Services module for matching-service.

pub mod database;
pub mod extraction;
pub mod metrics;
pub mod store;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics, record_engine_operation, record_extraction,
    record_tier_matches};
pub use store::LedgerStore;
