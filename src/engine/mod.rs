// ScanStore Engine - Core module structure
pub mod batch;
pub mod config;
pub mod docstore;
pub mod error;
pub mod filter;
pub mod motorsdb;
pub mod record;
pub mod routing;
pub mod schema;
pub mod search;
pub mod service;

pub use config::ScanStoreConfig;
pub use error::{Error, Result};
pub use motorsdb::MotorsDb;
pub use service::ScanService;
