//! Field routing
//!
//! A static table maps (service, field key or dotted prefix) to the
//! backend owning that field. The router splits one parsed filter
//! expression into per-backend sub-filters; values pass through
//! unchanged. The table is loaded once at startup and never mutated
//! at request time.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::Result;
use super::filter::FilterMap;

/// The two storage backends of this service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Schema-flexible document store (scan metadata)
    Documents,
    /// Relational motor-positions store
    Motors,
}

/// One field-ownership entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub service: String,
    /// Full field key, or a dotted prefix owning every key beneath it
    pub key: String,
    pub backend: Backend,
}

impl RoutingEntry {
    /// True when this entry owns the given dotted field path: the entry
    /// key equals the path or is a strict dot-separated prefix of it.
    fn owns(&self, path: &str) -> bool {
        path == self.key
            || (path.len() > self.key.len()
                && path.starts_with(&self.key)
                && path.as_bytes()[self.key.len()] == b'.')
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: Vec<RoutingEntry>,
}

impl RoutingTable {
    pub fn from_entries(entries: Vec<RoutingEntry>) -> Self {
        Self { entries }
    }

    /// Load the table from a JSON file (array of entries)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<RoutingEntry> = serde_json::from_str(&content)?;
        Ok(Self { entries })
    }

    /// Split a filter expression into per-backend sub-filters.
    ///
    /// The first entry owning a key wins; keys owned by no entry are
    /// dropped from the query, logged so typoed field names are
    /// observable.
    pub fn route(&self, service: &str, filter: &FilterMap) -> BTreeMap<Backend, FilterMap> {
        let mut routed: BTreeMap<Backend, FilterMap> = BTreeMap::new();
        for (key, value) in filter {
            let owner = self
                .entries
                .iter()
                .find(|e| e.service == service && e.owns(key));
            match owner {
                Some(entry) => {
                    routed
                        .entry(entry.backend)
                        .or_default()
                        .insert(key.clone(), value.clone());
                }
                None => {
                    warn!(service, key = key.as_str(), "filter key matches no routing entry; dropped");
                }
            }
        }
        routed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::filter::parse_map;
    use serde_json::json;

    fn table() -> RoutingTable {
        RoutingTable::from_entries(vec![
            RoutingEntry { service: "scans".into(), key: "did".into(), backend: Backend::Documents },
            RoutingEntry { service: "scans".into(), key: "beamline".into(), backend: Backend::Documents },
            RoutingEntry { service: "scans".into(), key: "spec_file".into(), backend: Backend::Documents },
            RoutingEntry { service: "scans".into(), key: "motors".into(), backend: Backend::Motors },
            RoutingEntry { service: "other".into(), key: "station".into(), backend: Backend::Documents },
        ])
    }

    #[test]
    fn test_route_splits_by_ownership() {
        let filter = parse_map(&json!({
            "beamline": "3a",
            "motors.samx": 1.23,
        }))
        .unwrap();
        let routed = table().route("scans", &filter);

        let docs = routed.get(&Backend::Documents).unwrap();
        let motors = routed.get(&Backend::Motors).unwrap();
        assert!(docs.contains_key("beamline"));
        assert!(motors.contains_key("motors.samx"));
        // No field lands in both backends
        assert!(docs.keys().all(|k| !motors.contains_key(k)));
    }

    #[test]
    fn test_route_prefix_is_dot_separated() {
        let filter = parse_map(&json!({"motorspeed": 1.0})).unwrap();
        // "motors" must not claim "motorspeed"
        assert!(table().route("scans", &filter).is_empty());
    }

    #[test]
    fn test_route_nested_motors_object() {
        let filter = parse_map(&json!({"motors": {"samx": 1.0}})).unwrap();
        let routed = table().route("scans", &filter);
        assert!(routed.get(&Backend::Motors).unwrap().contains_key("motors"));
    }

    #[test]
    fn test_route_drops_unmatched_keys() {
        let filter = parse_map(&json!({"beemline": "3a"})).unwrap();
        assert!(table().route("scans", &filter).is_empty());
    }

    #[test]
    fn test_route_is_service_scoped() {
        let filter = parse_map(&json!({"station": "a"})).unwrap();
        assert!(table().route("scans", &filter).is_empty());
        assert!(!table().route("other", &filter).is_empty());
    }
}
