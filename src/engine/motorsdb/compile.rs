//! Motor predicate compilation
//!
//! Turns the motors-owned sub-filter of a routed query into normalized
//! per-mnemonic predicates for the statement builder. Accepted key
//! shapes: a literal `"motors"` key holding a nested mnemonic mapping,
//! or dotted `"motors.<mnemonic>"` keys; both normalize to flat
//! (mnemonic, value) entries before translation. Entries naming the
//! same mnemonic (one per key form, say) merge into a single predicate:
//! exact sets union, bounds tighten to the stricter value.

use std::collections::BTreeMap;

use super::super::error::{Error, Result};
use super::super::filter::{FilterMap, FilterValue, Scalar};

/// Normalized predicate for one motor mnemonic.
///
/// `exact` and the bounds compose conjunctively: when both are present a
/// position must be in the exact set and inside the inclusive
/// [min, max] range. An entry with neither is an existence probe on the
/// mnemonic alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorFilter {
    pub mne: String,
    pub exact: Vec<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl MotorFilter {
    pub fn existence(mne: &str) -> Self {
        Self { mne: mne.to_string(), ..Self::default() }
    }

    pub fn is_existence_only(&self) -> bool {
        self.exact.is_empty() && self.min.is_none() && self.max.is_none()
    }
}

/// Compile a routed motors sub-filter into normalized predicates, one
/// per distinct mnemonic
pub fn compile(filter: &FilterMap) -> Result<Vec<MotorFilter>> {
    let mut compiled: BTreeMap<String, MotorFilter> = BTreeMap::new();
    for (key, value) in filter {
        if key == "motors" {
            match value {
                FilterValue::Nested(entries) => {
                    for (mne, entry) in entries {
                        merge(&mut compiled, mne, entry)?;
                    }
                }
                // A bare mnemonic name: existence probe only
                FilterValue::Literal(Scalar::Str(mne)) => {
                    compiled
                        .entry(mne.clone())
                        .or_insert_with(|| MotorFilter::existence(mne));
                }
                other => {
                    return Err(Error::Filter(format!(
                        "\"motors\" expects a mnemonic mapping, got {other:?}"
                    )))
                }
            }
        } else {
            let mne = key.strip_prefix("motors.").unwrap_or(key);
            merge(&mut compiled, mne, value)?;
        }
    }
    Ok(compiled.into_values().collect())
}

fn merge(
    compiled: &mut BTreeMap<String, MotorFilter>,
    mne: &str,
    value: &FilterValue,
) -> Result<()> {
    let filter = compiled
        .entry(mne.to_string())
        .or_insert_with(|| MotorFilter::existence(mne));
    apply(filter, value)
}

fn apply(filter: &mut MotorFilter, value: &FilterValue) -> Result<()> {
    match value {
        FilterValue::Literal(Scalar::Num(pos)) => filter.exact.push(*pos),
        // A string in place of a position constrains nothing
        FilterValue::Literal(Scalar::Str(_)) => {}
        FilterValue::Set(values) => {
            for scalar in values {
                let pos = scalar.as_num().ok_or_else(|| {
                    Error::Filter(format!(
                        "motor {}: non-numeric value in exact set: {scalar:?}",
                        filter.mne
                    ))
                })?;
                filter.exact.push(pos);
            }
        }
        FilterValue::Range { min, max } => {
            filter.min = tighter(filter.min, *min, f64::max);
            filter.max = tighter(filter.max, *max, f64::min);
        }
        FilterValue::All(parts) => {
            for part in parts {
                apply(filter, part)?;
            }
        }
        other => {
            return Err(Error::Filter(format!(
                "motor {}: unsupported value shape: {other:?}",
                filter.mne
            )))
        }
    }
    Ok(())
}

// Keeps the stricter of two bounds on the same side
fn tighter(current: Option<f64>, new: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (current, new) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::filter::parse_map;
    use serde_json::json;

    fn compiled(filter: serde_json::Value) -> Vec<MotorFilter> {
        let mut filters = compile(&parse_map(&filter).unwrap()).unwrap();
        filters.sort_by(|a, b| a.mne.cmp(&b.mne));
        filters
    }

    #[test]
    fn test_nested_and_dotted_forms_normalize() {
        let filters = compiled(json!({
            "motors": {"mne0": 1.23},
            "motors.mne1": 4.56,
        }));
        assert_eq!(
            filters,
            vec![
                MotorFilter { mne: "mne0".into(), exact: vec![1.23], ..Default::default() },
                MotorFilter { mne: "mne1".into(), exact: vec![4.56], ..Default::default() },
            ]
        );
    }

    #[test]
    fn test_operator_shapes() {
        assert_eq!(
            compiled(json!({"motors.mne": {"$lt": 1.23}})),
            vec![MotorFilter { mne: "mne".into(), max: Some(1.23), ..Default::default() }]
        );
        assert_eq!(
            compiled(json!({"motors.mne": {"$gt": 1.23}})),
            vec![MotorFilter { mne: "mne".into(), min: Some(1.23), ..Default::default() }]
        );
        assert_eq!(
            compiled(json!({"motors.mne": {"$eq": 1.23}})),
            vec![MotorFilter { mne: "mne".into(), exact: vec![1.23], ..Default::default() }]
        );
        assert_eq!(
            compiled(json!({"motors.mne": {"$in": [1.23, 4.56]}})),
            vec![MotorFilter { mne: "mne".into(), exact: vec![1.23, 4.56], ..Default::default() }]
        );
    }

    #[test]
    fn test_operators_compose_additively() {
        let filters = compiled(json!({
            "motors": {"mne": {"$gt": -1.23, "$lt": 4.56, "$in": [0.0, 1.23]}},
        }));
        assert_eq!(
            filters,
            vec![MotorFilter {
                mne: "mne".into(),
                exact: vec![0.0, 1.23],
                min: Some(-1.23),
                max: Some(4.56),
            }]
        );
    }

    #[test]
    fn test_repeated_mnemonic_merges_into_one_predicate() {
        // The same mnemonic through both key forms must yield a single
        // predicate, not two
        let filters = compiled(json!({
            "motors": {"samx": {"$gt": 1.0}},
            "motors.samx": 5.0,
        }));
        assert_eq!(
            filters,
            vec![MotorFilter {
                mne: "samx".into(),
                exact: vec![5.0],
                min: Some(1.0),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_repeated_bounds_keep_the_stricter() {
        let filters = compiled(json!({
            "motors": {"samx": {"$gt": 0.0, "$lt": 10.0}},
            "motors.samx": {"$gt": 2.0, "$lt": 20.0},
        }));
        assert_eq!(
            filters,
            vec![MotorFilter {
                mne: "samx".into(),
                min: Some(2.0),
                max: Some(10.0),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_existence_probe() {
        let filters = compiled(json!({"motors": "samx"}));
        assert_eq!(filters, vec![MotorFilter::existence("samx")]);
        assert!(filters[0].is_existence_only());
    }

    #[test]
    fn test_malformed_values_are_errors() {
        let filter = parse_map(&json!({"motors.mne": [1.0, "two"]})).unwrap();
        assert!(compile(&filter).is_err());

        let filter = parse_map(&json!({"motors.mne": {"nested": 1.0}})).unwrap();
        assert!(compile(&filter).is_err());
    }
}
