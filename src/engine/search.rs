//! Federated search
//!
//! Executes one routed query across the two backends and recomposes
//! composite records. Which backend(s) hold predicates after routing
//! decides the join strategy: single-store completion, or an
//! intersection join on sid when both matched. Pagination (`idx`,
//! `limit`) applies to the document-store fetch only and is not
//! reapplied after joins; a joined page can come back short.

use tracing::debug;

use super::docstore::DocumentStore;
use super::error::Result;
use super::filter::{FilterMap, FilterValue, Scalar};
use super::motorsdb::compile::compile;
use super::motorsdb::MotorsDb;
use super::record::{complete, DocRecord, MotorRecord, ScanRecord};

pub struct SearchExecutor<'a> {
    pub docs: &'a dyn DocumentStore,
    pub motors: &'a MotorsDb,
    pub db_name: &'a str,
    pub collection: &'a str,
}

impl<'a> SearchExecutor<'a> {
    /// Run the routed sub-filters against the backend(s) owning them and
    /// return the recomposed composite records.
    pub fn search(
        &self,
        doc_filter: &FilterMap,
        motor_filter: &FilterMap,
        idx: usize,
        limit: usize,
    ) -> Result<Vec<ScanRecord>> {
        debug!(
            doc_keys = doc_filter.len(),
            motor_keys = motor_filter.len(),
            idx,
            limit,
            "dispatching federated search"
        );
        match (doc_filter.is_empty(), motor_filter.is_empty()) {
            // No predicates: page through every document record
            (true, true) => {
                let docs = self.fetch_docs(&FilterMap::new(), idx, limit)?;
                self.complete_doc_records(docs)
            }
            // Relational-only: filter motors, complete from the document store
            (true, false) => {
                let motors = self.motors.query_by_filter(&compile(motor_filter)?)?;
                self.complete_motor_records(motors)
            }
            // Document-only: filter documents, complete from the motors db
            (false, true) => {
                let docs = self.fetch_docs(doc_filter, idx, limit)?;
                self.complete_doc_records(docs)
            }
            // Both matched: independent fetches, intersection join on sid
            (false, false) => {
                let docs = self.fetch_docs(doc_filter, idx, limit)?;
                let motors = self.motors.query_by_filter(&compile(motor_filter)?)?;
                Ok(intersect(docs, motors))
            }
        }
    }

    fn fetch_docs(&self, filter: &FilterMap, idx: usize, limit: usize) -> Result<Vec<DocRecord>> {
        let values = self.docs.get(self.db_name, self.collection, filter, idx, limit)?;
        values.into_iter().map(DocRecord::from_value).collect()
    }

    /// Complete document portions by fetching their motor records by sid
    fn complete_doc_records(&self, docs: Vec<DocRecord>) -> Result<Vec<ScanRecord>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let sids: Vec<f64> = docs.iter().map(|d| d.sid).collect();
        let motors = self.motors.query_by_sids(&sids)?;
        Ok(intersect(docs, motors))
    }

    /// Complete motor portions by fetching their document portions via an
    /// `in`-on-sid query
    fn complete_motor_records(&self, motors: Vec<MotorRecord>) -> Result<Vec<ScanRecord>> {
        if motors.is_empty() {
            return Ok(Vec::new());
        }
        let sids: Vec<Scalar> = motors.iter().map(|m| Scalar::Num(m.sid)).collect();
        let mut filter = FilterMap::new();
        filter.insert("sid".to_string(), FilterValue::Set(sids));
        let docs = self.fetch_docs(&filter, 0, 0)?;
        Ok(intersect(docs, motors))
    }
}

/// Pair document and motor portions by sid equality; a record is
/// produced only when its sid appears in both sets. Nested-loop join,
/// acceptable because result sets are page-bounded.
fn intersect(docs: Vec<DocRecord>, motors: Vec<MotorRecord>) -> Vec<ScanRecord> {
    let mut records = Vec::new();
    for doc in docs {
        if let Some(motor) = motors.iter().find(|m| m.sid == doc.sid) {
            records.push(complete(doc, motor.clone()));
        }
    }
    records
}
