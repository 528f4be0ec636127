//! ScanStore Configuration Module
//! Handles loading and validating scanstore.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStoreConfig {
    /// Name this service goes by in the shared routing table
    pub service: String,
    pub documents: DocumentsConfig,
    pub motorsdb: MotorsDbConfig,
    /// Path to the record schema file (field descriptors)
    pub schema_file: PathBuf,
    /// Path to the routing-table file (field ownership)
    pub routing_file: PathBuf,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Document-store addressing: which database/collection holds the
/// metadata portion of scan records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    pub db_name: String,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotorsDbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Max records ingested concurrently within one batch request
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

impl ScanStoreConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
