//! Scan service
//!
//! [`ScanService`] is the explicit context struct holding handles to
//! both stores, the routing table, and the record validator — built
//! once at startup and passed to every operation, so tests can swap
//! in in-memory stores. It exposes the service's three operations:
//! submit one-or-many records, edit one-or-many existing records, and
//! search with a filter expression plus pagination.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::batch::{self, BatchOutcome};
use super::config::ScanStoreConfig;
use super::docstore::DocumentStore;
use super::error::{Error, Result};
use super::filter::{parse_map, FilterMap, FilterValue, Scalar};
use super::motorsdb::MotorsDb;
use super::record::{complete, decompose, DocRecord, ScanRecord};
use super::routing::{Backend, RoutingTable};
use super::schema::{RecordValidator, Schema};
use super::search::SearchExecutor;

#[derive(Clone)]
pub struct ScanService {
    docs: Arc<dyn DocumentStore>,
    motors: MotorsDb,
    validator: Arc<dyn RecordValidator>,
    routing: Arc<RoutingTable>,
    service: String,
    db_name: String,
    collection: String,
    batch_concurrency: usize,
}

impl ScanService {
    /// Wire the service from its parts (test/dev entry point)
    pub fn new(
        docs: Arc<dyn DocumentStore>,
        motors: MotorsDb,
        validator: Arc<dyn RecordValidator>,
        routing: RoutingTable,
        service: impl Into<String>,
        db_name: impl Into<String>,
        collection: impl Into<String>,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            docs,
            motors,
            validator,
            routing: Arc::new(routing),
            service: service.into(),
            db_name: db_name.into(),
            collection: collection.into(),
            batch_concurrency,
        }
    }

    /// Open the service from configuration: motors db at its configured
    /// path, schema and routing table from their files, the given
    /// document-store driver behind the seam.
    pub fn open(config: &ScanStoreConfig, docs: Arc<dyn DocumentStore>) -> Result<Self> {
        let motors = MotorsDb::open(&config.motorsdb.path)?;
        let schema = Schema::load(&config.schema_file)?;
        let routing = RoutingTable::load(&config.routing_file)?;
        info!(service = %config.service, "scan service ready");
        Ok(Self::new(
            docs,
            motors,
            Arc::new(schema),
            routing,
            config.service.clone(),
            config.documents.db_name.clone(),
            config.documents.collection.clone(),
            config.batch.max_concurrency,
        ))
    }

    /// Ingest one record or an array of records; every record is
    /// attempted and the outcome is a multi-status aggregate.
    pub async fn submit(&self, body: Value) -> BatchOutcome {
        let items = into_batch(body);
        let svc = self.clone();
        batch::fan_out(items, self.batch_concurrency, move |raw| svc.ingest_one(raw)).await
    }

    /// Edit one record or an array of records identified by sid or by
    /// (spec_file, scan_number); same fan-out/fan-in shape as submit.
    pub async fn edit(&self, body: Value) -> BatchOutcome {
        let items = into_batch(body);
        let svc = self.clone();
        batch::fan_out(items, self.batch_concurrency, move |raw| svc.edit_one(raw)).await
    }

    /// Search with a filter expression plus pagination, returning
    /// recomposed composite records.
    pub fn search(&self, filter: &Value, idx: usize, limit: usize) -> Result<Vec<ScanRecord>> {
        let parsed = parse_map(filter)?;
        let routed = self.routing.route(&self.service, &parsed);
        let empty = FilterMap::new();
        let doc_filter = routed.get(&Backend::Documents).unwrap_or(&empty);
        let motor_filter = routed.get(&Backend::Motors).unwrap_or(&empty);
        self.executor().search(doc_filter, motor_filter, idx, limit)
    }

    fn executor(&self) -> SearchExecutor<'_> {
        SearchExecutor {
            docs: self.docs.as_ref(),
            motors: &self.motors,
            db_name: &self.db_name,
            collection: &self.collection,
        }
    }

    /// Validate, decompose, and persist one record: relational portion
    /// first (transactional), document portion second. A relational
    /// failure skips the document insert so no orphaned document can
    /// appear; the reverse ordering is not protected.
    fn ingest_one(&self, raw: Value) -> Result<ScanRecord> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::BadRequest("record must be a JSON object".into()))?;
        self.validator.validate(obj)?;

        let record = ScanRecord::from_value(raw)?;
        let (doc, motors) = decompose(&record);
        self.motors.insert(&motors)?;
        if let Err(err) = self.docs.insert(&self.db_name, &self.collection, vec![doc.to_value()?]) {
            warn!(
                sid = doc.sid,
                error = %err,
                "document insert failed after relational insert; relational row orphaned"
            );
            return Err(err);
        }
        Ok(complete(doc, motors))
    }

    fn edit_one(&self, raw: Value) -> Result<ScanRecord> {
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::BadRequest("edit spec must be a JSON object".into()))?;

        // Motor positions are immutable after ingest
        if obj.keys().any(|k| k == "motors" || k.starts_with("motors.")) {
            return Err(Error::BadRequest("motor positions cannot be edited".into()));
        }

        let (matcher, lookup_keys) = edit_matcher(obj)?;
        let described = describe(&matcher);
        let mut docs = self.docs.get(&self.db_name, &self.collection, &matcher, 0, 0)?;
        if docs.len() > 1 {
            return Err(Error::Ambiguous { key: described.clone(), matched: docs.len() });
        }
        let Some(target) = docs.pop() else {
            return Err(Error::NotFound(described));
        };

        // Field-level edits: everything except the lookup keys and sid
        let mut update = serde_json::Map::new();
        for (key, value) in obj {
            if key == "sid" || lookup_keys.contains(&key.as_str()) {
                continue;
            }
            update.insert(key.clone(), value.clone());
        }

        // Re-validate the merged record before writing anything
        let mut merged = target
            .as_object()
            .cloned()
            .ok_or_else(|| Error::DocStore("stored document is not an object".into()))?;
        for (key, value) in &update {
            merged.insert(key.clone(), value.clone());
        }
        self.validator.validate(&merged)?;

        self.docs.upsert(&self.db_name, &self.collection, &matcher, &update)?;
        info!(target = %described, edited = update.len(), "record edited");

        let doc = DocRecord::from_value(Value::Object(merged))?;
        let motors = self.motors.query_by_sids(&[doc.sid])?;
        let motors = motors.into_iter().next().unwrap_or_default();
        Ok(complete(doc, motors))
    }
}

/// Accept a single object or an array of objects
fn into_batch(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Build the lookup matcher for an edit: by sid, or by the
/// (spec_file, scan_number) pair.
fn edit_matcher(obj: &serde_json::Map<String, Value>) -> Result<(FilterMap, Vec<&'static str>)> {
    let mut matcher = FilterMap::new();
    if let Some(sid) = obj.get("sid").and_then(Value::as_f64) {
        matcher.insert("sid".to_string(), FilterValue::Literal(Scalar::Num(sid)));
        return Ok((matcher, vec!["sid"]));
    }
    let spec_file = obj.get("spec_file").and_then(Value::as_str);
    let scan_number = obj.get("scan_number").and_then(Value::as_f64);
    if let (Some(spec_file), Some(scan_number)) = (spec_file, scan_number) {
        matcher.insert(
            "spec_file".to_string(),
            FilterValue::Literal(Scalar::Str(spec_file.to_string())),
        );
        matcher.insert(
            "scan_number".to_string(),
            FilterValue::Literal(Scalar::Num(scan_number)),
        );
        return Ok((matcher, vec!["spec_file", "scan_number"]));
    }
    Err(Error::BadRequest(
        "edit requires a sid or a (spec_file, scan_number) pair".into(),
    ))
}

fn describe(matcher: &FilterMap) -> String {
    matcher
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}
