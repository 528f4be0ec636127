//! ScanStore - Federated scan-record store
//!
//! Scan records are split across two backends: a schema-flexible
//! document store holding the metadata portion, and a relational store
//! holding per-scan motor name/position arrays. The engine routes filter
//! expressions to the backend(s) owning the referenced fields, compiles
//! them into backend-specific predicates, and recomposes composite
//! records at read time.

pub mod engine;

pub use engine::batch::{BatchError, BatchOutcome, BatchStatus};
pub use engine::config::ScanStoreConfig;
pub use engine::docstore::{DocumentStore, MemoryDocStore};
pub use engine::error::{Error, Result};
pub use engine::motorsdb::MotorsDb;
pub use engine::record::ScanRecord;
pub use engine::routing::{Backend, RoutingTable};
pub use engine::schema::{RecordValidator, Schema};
pub use engine::service::ScanService;

/// Install the default tracing subscriber, filtered by `RUST_LOG`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
