//! Document store
//!
//! The engine talks to the metadata backend through the narrow
//! [`DocumentStore`] seam; the wire protocol of a real document database
//! lives behind it. [`MemoryDocStore`] is the shipped implementation: a
//! thread-safe in-memory engine with the same operator semantics as the
//! parsed filter values, substitutable under tests and dev deployments.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::{Map, Value};

use super::error::{Error, Result};
use super::filter::FilterMap;

/// Narrow driver interface for the metadata backend
pub trait DocumentStore: Send + Sync {
    /// Insert documents into a collection
    fn insert(&self, db: &str, collection: &str, docs: Vec<Value>) -> Result<()>;

    /// Fetch documents matching a filter. `limit == 0` means unbounded.
    fn get(
        &self,
        db: &str,
        collection: &str,
        filter: &FilterMap,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>>;

    /// Count documents matching a filter
    fn count(&self, db: &str, collection: &str, filter: &FilterMap) -> Result<usize>;

    /// Update documents matching `matcher` with the given fields,
    /// inserting a new document when nothing matches. Returns the number
    /// of documents written.
    fn upsert(
        &self,
        db: &str,
        collection: &str,
        matcher: &FilterMap,
        update: &Map<String, Value>,
    ) -> Result<usize>;
}

/// In-memory document engine
#[derive(Debug, Default)]
pub struct MemoryDocStore {
    collections: RwLock<BTreeMap<(String, String), Vec<Value>>>,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolve a dotted field path against a document
fn field<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// A document matches when every filter entry matches its field
fn matches(doc: &Value, filter: &FilterMap) -> bool {
    filter.iter().all(|(key, value)| {
        field(doc, key).map_or(false, |actual| value.matches(actual))
    })
}

impl DocumentStore for MemoryDocStore {
    fn insert(&self, db: &str, collection: &str, docs: Vec<Value>) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Error::DocStore("collection lock poisoned".into()))?;
        collections
            .entry((db.to_string(), collection.to_string()))
            .or_default()
            .extend(docs);
        Ok(())
    }

    fn get(
        &self,
        db: &str,
        collection: &str,
        filter: &FilterMap,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| Error::DocStore("collection lock poisoned".into()))?;
        let docs = collections
            .get(&(db.to_string(), collection.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let selected = docs.iter().filter(|doc| matches(doc, filter)).skip(offset);
        let results = match limit {
            0 => selected.cloned().collect(),
            n => selected.take(n).cloned().collect(),
        };
        Ok(results)
    }

    fn count(&self, db: &str, collection: &str, filter: &FilterMap) -> Result<usize> {
        Ok(self.get(db, collection, filter, 0, 0)?.len())
    }

    fn upsert(
        &self,
        db: &str,
        collection: &str,
        matcher: &FilterMap,
        update: &Map<String, Value>,
    ) -> Result<usize> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| Error::DocStore("collection lock poisoned".into()))?;
        let docs = collections
            .entry((db.to_string(), collection.to_string()))
            .or_default();

        let mut written = 0;
        for doc in docs.iter_mut().filter(|doc| matches(doc, matcher)) {
            if let Value::Object(fields) = doc {
                for (key, value) in update {
                    fields.insert(key.clone(), value.clone());
                }
                written += 1;
            }
        }
        if written == 0 {
            docs.push(Value::Object(update.clone()));
            written = 1;
        }
        Ok(written)
    }
}
