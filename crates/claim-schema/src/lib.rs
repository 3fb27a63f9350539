//! claim-schema — C1 Schema Validator.
//!
//! Schemas are declarative data, the way `chronx_core::claims::SignatureRules`
//! and `CertificateSchema` describe signing rules as data rather than code:
//! object shape, required keys, enum membership, numeric ranges, and
//! recursion into nested objects and arrays-of-objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One validation error. Never panics, never throws — callers collect a
/// `Vec<ValidationError>` and decide whether a given failure is repairable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub rule: String,
    pub detail: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, rule: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            rule: rule.into(),
            detail: detail.into(),
        }
    }
}

/// A declarative field rule.
#[derive(Clone, Debug)]
pub enum FieldSchema {
    Number { min: Option<f64>, max: Option<f64> },
    Bool,
    Str,
    Enum { values: Vec<String> },
    Object { fields: BTreeMap<String, Field> },
    Array { of: Box<FieldSchema> },
    Any,
}

/// A named field: its shape plus whether it is required.
#[derive(Clone, Debug)]
pub struct Field {
    pub schema: FieldSchema,
    pub required: bool,
}

impl Field {
    pub fn required(schema: FieldSchema) -> Self {
        Self { schema, required: true }
    }

    pub fn optional(schema: FieldSchema) -> Self {
        Self { schema, required: false }
    }
}

/// Validate `value` against `schema`. Returns `(ok, errors)` — `ok` is
/// `errors.is_empty()`, kept explicit to mirror the `(ok, errors[])`
/// contract in SPEC_FULL.md §4.1.
pub fn validate(value: &Value, schema: &FieldSchema) -> (bool, Vec<ValidationError>) {
    let mut errors = Vec::new();
    validate_at("$", value, schema, &mut errors);
    (errors.is_empty(), errors)
}

fn validate_at(path: &str, value: &Value, schema: &FieldSchema, errors: &mut Vec<ValidationError>) {
    match schema {
        FieldSchema::Any => {}
        FieldSchema::Number { min, max } => match value.as_f64() {
            None => errors.push(ValidationError::new(path, "type", "expected number")),
            Some(n) => {
                if let Some(min) = min {
                    if n < *min {
                        errors.push(ValidationError::new(path, "range", format!("{n} below minimum {min}")));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        errors.push(ValidationError::new(path, "range", format!("{n} above maximum {max}")));
                    }
                }
            }
        },
        FieldSchema::Bool => {
            if !value.is_boolean() {
                errors.push(ValidationError::new(path, "type", "expected bool"));
            }
        }
        FieldSchema::Str => {
            if !value.is_string() {
                errors.push(ValidationError::new(path, "type", "expected string"));
            }
        }
        FieldSchema::Enum { values } => match value.as_str() {
            None => errors.push(ValidationError::new(path, "type", "expected string enum member")),
            Some(s) => {
                if !values.iter().any(|v| v == s) {
                    errors.push(ValidationError::new(
                        path,
                        "enum",
                        format!("'{s}' not one of {values:?}"),
                    ));
                }
            }
        },
        FieldSchema::Object { fields } => match value.as_object() {
            None => errors.push(ValidationError::new(path, "type", "expected object")),
            Some(obj) => {
                for (name, field) in fields {
                    let child_path = format!("{path}.{name}");
                    match obj.get(name) {
                        Some(child_value) => validate_at(&child_path, child_value, &field.schema, errors),
                        None if field.required => {
                            errors.push(ValidationError::new(&child_path, "required", "missing required field"));
                        }
                        None => {}
                    }
                }
            }
        },
        FieldSchema::Array { of } => match value.as_array() {
            None => errors.push(ValidationError::new(path, "type", "expected array")),
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_at(&format!("{path}[{i}]"), item, of, errors);
                }
            }
        },
    }
}
