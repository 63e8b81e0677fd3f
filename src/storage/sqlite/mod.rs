//! Shared `SQLite` connection plumbing used by the store.

mod connection;
mod metrics;

pub use connection::{acquire_lock, configure_connection};
pub use metrics::record_operation_metrics;
