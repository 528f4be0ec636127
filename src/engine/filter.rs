//! Filter expressions
//!
//! The wire shape of a filter is a flat or nested JSON mapping using
//! literal equality or `$lt`/`$gt`/`$in`/`$eq` operator objects. It is
//! parsed exactly once, at the routing boundary, into the tagged
//! [`FilterValue`] variant; everything downstream works on typed values.

use std::collections::BTreeMap;

use serde_json::Value;

use super::error::{Error, Result};

/// A scalar filter operand
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Scalar {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Scalar::Str(s.clone())),
            Value::Number(n) => n.as_f64().map(Scalar::Num),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            Scalar::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Equality against a JSON value (numbers compare numerically)
    pub fn eq_json(&self, value: &Value) -> bool {
        match (self, value) {
            (Scalar::Str(a), Value::String(b)) => a == b,
            (Scalar::Num(a), Value::Number(b)) => b.as_f64() == Some(*a),
            (Scalar::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        }
    }
}

/// A parsed filter value for one field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Literal equality (or, for motor fields, a bare-string existence probe)
    Literal(Scalar),
    /// Exact-match set (`$in`)
    Set(Vec<Scalar>),
    /// Inclusive bounds (`$gt` is min, `$lt` is max)
    Range { min: Option<f64>, max: Option<f64> },
    /// An operator object combining a range with an exact set; every part
    /// must hold independently
    All(Vec<FilterValue>),
    /// A nested sub-mapping (e.g. the `"motors"` object)
    Nested(FilterMap),
}

/// A filter expression: field path to parsed value
pub type FilterMap = BTreeMap<String, FilterValue>;

impl FilterValue {
    /// Parse one field's wire value
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                let scalar = Scalar::from_json(value)
                    .ok_or_else(|| Error::Filter(format!("unsupported literal: {value}")))?;
                Ok(FilterValue::Literal(scalar))
            }
            Value::Array(items) => Ok(FilterValue::Set(parse_scalars(items)?)),
            Value::Object(map) => {
                if map.keys().any(|k| k.starts_with('$')) {
                    parse_operator_object(map)
                } else {
                    let mut nested = FilterMap::new();
                    for (key, val) in map {
                        nested.insert(key.clone(), FilterValue::parse(val)?);
                    }
                    Ok(FilterValue::Nested(nested))
                }
            }
            Value::Null => Err(Error::Filter("null is not a valid filter value".into())),
        }
    }

    /// Check whether a document field satisfies this filter value
    pub fn matches(&self, actual: &Value) -> bool {
        match self {
            FilterValue::Literal(expected) => expected.eq_json(actual),
            FilterValue::Set(values) => values.iter().any(|v| v.eq_json(actual)),
            FilterValue::Range { min, max } => {
                let Some(n) = actual.as_f64() else { return false };
                min.map_or(true, |m| n >= m) && max.map_or(true, |m| n <= m)
            }
            FilterValue::All(parts) => parts.iter().all(|p| p.matches(actual)),
            // Nested mappings are routed, not matched against a single field
            FilterValue::Nested(_) => false,
        }
    }
}

/// Parse a whole filter expression; the body must be a JSON object.
pub fn parse_map(body: &Value) -> Result<FilterMap> {
    let obj = body
        .as_object()
        .ok_or_else(|| Error::Filter("filter expression must be a JSON object".into()))?;
    let mut map = FilterMap::new();
    for (key, val) in obj {
        map.insert(key.clone(), FilterValue::parse(val)?);
    }
    Ok(map)
}

fn parse_scalars(items: &[Value]) -> Result<Vec<Scalar>> {
    items
        .iter()
        .map(|v| {
            Scalar::from_json(v)
                .ok_or_else(|| Error::Filter(format!("non-scalar value in set: {v}")))
        })
        .collect()
}

fn parse_operator_object(map: &serde_json::Map<String, Value>) -> Result<FilterValue> {
    let mut min = None;
    let mut max = None;
    let mut set: Option<Vec<Scalar>> = None;
    for (op, val) in map {
        match op.as_str() {
            "$gt" => min = Some(bound_value(op, val)?),
            "$lt" => max = Some(bound_value(op, val)?),
            "$in" => {
                let items = val
                    .as_array()
                    .ok_or_else(|| Error::Filter(format!("$in expects an array, got {val}")))?;
                set.get_or_insert_with(Vec::new).extend(parse_scalars(items)?);
            }
            "$eq" => {
                let scalar = Scalar::from_json(val)
                    .ok_or_else(|| Error::Filter(format!("$eq expects a scalar, got {val}")))?;
                set.get_or_insert_with(Vec::new).push(scalar);
            }
            other => return Err(Error::Filter(format!("unsupported operator: {other}"))),
        }
    }

    let range = (min.is_some() || max.is_some()).then_some(FilterValue::Range { min, max });
    let set = set.map(FilterValue::Set);
    match (range, set) {
        (Some(range), Some(set)) => Ok(FilterValue::All(vec![set, range])),
        (Some(range), None) => Ok(range),
        (None, Some(FilterValue::Set(values))) if values.len() == 1 => {
            let mut values = values;
            Ok(FilterValue::Literal(values.remove(0)))
        }
        (None, Some(set)) => Ok(set),
        (None, None) => Err(Error::Filter("empty operator object".into())),
    }
}

fn bound_value(op: &str, val: &Value) -> Result<f64> {
    val.as_f64()
        .ok_or_else(|| Error::Filter(format!("{op} expects a number, got {val}")))
}
