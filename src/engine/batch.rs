//! Batch coordination
//!
//! Fans a batch of per-record operations out to concurrent blocking
//! tasks, gated by a semaphore so a large batch cannot swamp the
//! serialized relational store, and fans every outcome back in. Batches
//! never fail fast: each record is attempted, and the aggregate outcome
//! distinguishes all-succeeded, all-failed, and partial success so
//! callers can reconcile. No ordering is guaranteed across records.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::error::Result;
use super::record::ScanRecord;

/// Aggregate outcome of a batch operation (multi-status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    PartialSuccess,
    Failure,
}

/// One failed record, identified by its position in the submitted batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    /// Successfully processed records, in no particular order
    pub records: Vec<ScanRecord>,
    pub errors: Vec<BatchError>,
}

impl BatchOutcome {
    fn collect(results: Vec<(usize, Result<ScanRecord>)>) -> Self {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for (index, result) in results {
            match result {
                Ok(record) => records.push(record),
                Err(err) => errors.push(BatchError { index, message: err.to_string() }),
            }
        }
        let status = match (records.is_empty(), errors.is_empty()) {
            (_, true) => BatchStatus::Success,
            (true, false) => BatchStatus::Failure,
            (false, false) => BatchStatus::PartialSuccess,
        };
        Self { status, records, errors }
    }
}

/// Run `op` over every item with at most `concurrency` tasks in flight.
///
/// Store calls are blocking, so each record runs on the blocking pool;
/// every task reports back exactly once.
pub async fn fan_out<T, F>(items: Vec<T>, concurrency: usize, op: F) -> BatchOutcome
where
    T: Send + 'static,
    F: Fn(T) -> Result<ScanRecord> + Send + Sync + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let op = Arc::new(op);

    let mut handles = Vec::with_capacity(total);
    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let op = Arc::clone(&op);
        handles.push(tokio::spawn(async move {
            // Semaphore is never closed, so acquisition cannot fail
            let _permit = semaphore.acquire_owned().await;
            tokio::task::spawn_blocking(move || op(item)).await
        }));
    }

    let mut results = Vec::with_capacity(total);
    for (index, handle) in handles.into_iter().enumerate() {
        let result = match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) | Err(join_err) => {
                warn!(index, error = %join_err, "batch task aborted");
                Err(super::error::Error::BadRequest(format!("record task aborted: {join_err}")))
            }
        };
        results.push((index, result));
    }

    let outcome = BatchOutcome::collect(results);
    info!(
        total,
        succeeded = outcome.records.len(),
        failed = outcome.errors.len(),
        status = ?outcome.status,
        "batch complete"
    );
    outcome
}
