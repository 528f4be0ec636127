//! Record shape validation
//!
//! Structural validation of submitted scan records before decomposition.
//! The engine only depends on the [`RecordValidator`] seam; the shipped
//! implementation is a field-descriptor [`Schema`] loaded from a JSON
//! file at startup.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use super::error::{Error, Result};

/// Validation seam consumed by the batch coordinator
pub trait RecordValidator: Send + Sync {
    fn validate(&self, record: &Map<String, Value>) -> Result<()>;
}

/// Field type definitions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

/// Field definition in schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Schema definition for submitted scan records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub fields: BTreeMap<String, FieldDef>,

    /// Whether to allow additional fields not in schema
    #[serde(default = "default_true")]
    pub allow_additional: bool,
}

fn default_true() -> bool {
    true
}

impl Schema {
    pub fn new() -> Self {
        Self { fields: BTreeMap::new(), allow_additional: true }
    }

    /// Load a schema from a JSON descriptor file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn validate_type(&self, field: &str, value: &Value, expected: &FieldType) -> Result<()> {
        let valid = match expected {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
            FieldType::Any => true,
        };

        if !valid {
            return Err(Error::Schema(format!(
                "field '{field}' has wrong type, expected {expected:?}"
            )));
        }
        Ok(())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordValidator for Schema {
    fn validate(&self, record: &Map<String, Value>) -> Result<()> {
        for (field_name, field_def) in &self.fields {
            if field_def.required && !record.contains_key(field_name) {
                return Err(Error::Schema(format!("missing required field: {field_name}")));
            }
            if let Some(value) = record.get(field_name) {
                self.validate_type(field_name, value, &field_def.field_type)?;
            }
        }

        if !self.allow_additional {
            for key in record.keys() {
                if !self.fields.contains_key(key) {
                    return Err(Error::Schema(format!("unknown field: {key}")));
                }
            }
        }
        Ok(())
    }
}
