//! Scan records
//!
//! A composite [`ScanRecord`] exists only transiently per request: on
//! ingestion it is decomposed into a document portion (all metadata) and
//! a relational portion (the motor mnemonic/position mapping), joined at
//! read time by the shared scan identifier.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::Result;

/// The full user-facing scan record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Scan identifier, the join key between the two stores
    #[serde(default)]
    pub sid: f64,
    /// Dataset identifier
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub cycle: String,
    #[serde(default)]
    pub beamline: String,
    #[serde(default)]
    pub btr: String,
    #[serde(default)]
    pub spec_file: String,
    #[serde(default)]
    pub scan_number: i64,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub spec_version: String,
    #[serde(default)]
    pub motors: BTreeMap<String, f64>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// The portion persisted in the document store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    #[serde(default)]
    pub sid: f64,
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub cycle: String,
    #[serde(default)]
    pub beamline: String,
    #[serde(default)]
    pub btr: String,
    #[serde(default)]
    pub spec_file: String,
    #[serde(default)]
    pub scan_number: i64,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub spec_version: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// The portion persisted in the relational motor store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorRecord {
    pub sid: f64,
    pub motors: BTreeMap<String, f64>,
}

impl ScanRecord {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

impl DocRecord {
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Split a submitted record into its two storage portions.
///
/// The sid is derived from the submitted start time; records without a
/// usable start time (test/dev submissions) get a time-synthesized sid so
/// the uniqueness constraint still holds.
pub fn decompose(record: &ScanRecord) -> (DocRecord, MotorRecord) {
    let sid = if record.start_time > 0.0 { record.start_time } else { synthesize_sid() };
    let doc = DocRecord {
        sid,
        did: record.did.clone(),
        cycle: record.cycle.clone(),
        beamline: record.beamline.clone(),
        btr: record.btr.clone(),
        spec_file: record.spec_file.clone(),
        scan_number: record.scan_number,
        start_time: record.start_time,
        command: record.command.clone(),
        status: record.status.clone(),
        comments: record.comments.clone(),
        spec_version: record.spec_version.clone(),
        variables: record.variables.clone(),
    };
    let motors = MotorRecord { sid, motors: record.motors.clone() };
    (doc, motors)
}

/// Merge the two portions back into a composite record.
///
/// Callers are responsible for only pairing portions that share the same
/// sid; no implicit matching happens here.
pub fn complete(doc: DocRecord, motors: MotorRecord) -> ScanRecord {
    ScanRecord {
        sid: doc.sid,
        did: doc.did,
        cycle: doc.cycle,
        beamline: doc.beamline,
        btr: doc.btr,
        spec_file: doc.spec_file,
        scan_number: doc.scan_number,
        start_time: doc.start_time,
        command: doc.command,
        status: doc.status,
        comments: doc.comments,
        spec_version: doc.spec_version,
        motors: motors.motors,
        variables: doc.variables,
    }
}

static SID_TICK: AtomicU64 = AtomicU64::new(0);

/// Unique sid for records lacking a start time, in epoch seconds.
///
/// An f64 holding epoch seconds cannot resolve individual nanoseconds at
/// the current epoch, so the clock alone can repeat within a burst. A
/// process-wide tick offsets each sid by a distinct whole microsecond,
/// which f64 seconds do resolve, breaking ties within the same instant.
fn synthesize_sid() -> f64 {
    let now = Utc::now();
    let seconds = now
        .timestamp_nanos_opt()
        .map(|n| n as f64 / 1e9)
        .unwrap_or_else(|| now.timestamp_micros() as f64 / 1e6);
    let tick = SID_TICK.fetch_add(1, Ordering::Relaxed) % 1024;
    seconds + tick as f64 * 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> ScanRecord {
        ScanRecord {
            sid: 1_683_000_000.5,
            did: "/beamline=3a/btr=ab-123/cycle=2023-2".to_string(),
            cycle: "2023-2".to_string(),
            beamline: "3a".to_string(),
            btr: "ab-123".to_string(),
            spec_file: "alignment".to_string(),
            scan_number: 4,
            start_time: 1_683_000_000.5,
            command: "ascan samx 0 1 10 0.1".to_string(),
            status: "complete".to_string(),
            comments: vec!["first pass".to_string()],
            spec_version: "6.10".to_string(),
            motors: BTreeMap::from([("samx".to_string(), 1.23), ("samz".to_string(), -0.5)]),
            variables: json!({"temperature": 293.0}).as_object().unwrap().clone(),
        }
    }

    #[test]
    fn test_decompose_complete_roundtrip() {
        let record = sample_record();
        let (doc, motors) = decompose(&record);
        assert_eq!(doc.sid, motors.sid);
        assert_eq!(complete(doc, motors), record);
    }

    #[test]
    fn test_decompose_strips_motors() {
        let record = sample_record();
        let (doc, motors) = decompose(&record);
        assert_eq!(motors.motors.len(), 2);
        assert!(doc.to_value().unwrap().get("motors").is_none());
    }

    #[test]
    fn test_decompose_synthesizes_sid_without_start_time() {
        let record = ScanRecord { start_time: 0.0, ..sample_record() };
        let (doc, motors) = decompose(&record);
        assert!(doc.sid > 0.0);
        assert_eq!(doc.sid, motors.sid);

        let (doc2, _) = decompose(&record);
        assert_ne!(doc.sid, doc2.sid);
    }

    #[test]
    fn test_synthesized_sids_stay_unique_in_a_burst() {
        let record = ScanRecord { start_time: 0.0, ..sample_record() };
        let mut sids: Vec<u64> =
            (0..100).map(|_| decompose(&record).0.sid.to_bits()).collect();
        sids.sort_unstable();
        sids.dedup();
        assert_eq!(sids.len(), 100);
    }

    #[test]
    fn test_record_from_wire_value() {
        let record = ScanRecord::from_value(json!({
            "did": "/beamline=3a",
            "start_time": 100.0,
            "motors": {"samx": 1.0},
        }))
        .unwrap();
        assert_eq!(record.did, "/beamline=3a");
        assert_eq!(record.motors.get("samx"), Some(&1.0));
        assert!(record.comments.is_empty());
    }
}
