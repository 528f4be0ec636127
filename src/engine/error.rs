//! Engine error types

use thiserror::Error;

use super::config::ConfigError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filter error: {0}")]
    Filter(String),

    #[error("schema validation failed: {0}")]
    Schema(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("document store error: {0}")]
    DocStore(String),

    #[error("record lookup matched no records: {0}")]
    NotFound(String),

    #[error("record lookup is ambiguous ({matched} matches): {key}")]
    Ambiguous { key: String, matched: usize },

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, Error>;
