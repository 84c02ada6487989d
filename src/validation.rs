//! Property bag validation against a resource schema.
//!
//! Validation runs at the provider boundary, before any remote call is
//! attempted: an invalid spec must never produce partial network side
//! effects. Unknown fields are rejected, required fields must be present
//! and non-null, and every value must match its declared type.
//!
//! # Example
//!
//! ```
//! use sendgrid_provider::schema::{Attribute, Schema};
//! use sendgrid_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("percentage", Attribute::optional_int64());
//!
//! let bag = json!({"name": "usage alert", "percentage": 90});
//! assert!(validate(&schema, bag.as_object().unwrap()).is_empty());
//!
//! let bag = json!({"name": "usage alert", "unexpected": true});
//! let diagnostics = validate(&schema, bag.as_object().unwrap());
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("unexpected".to_string()));
//! ```

use serde_json::Value;

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};
use crate::types::PropertyBag;

/// Validate a property bag against a schema.
///
/// Returns a list of diagnostics for any validation errors found; an empty
/// list means the bag is valid.
pub fn validate(schema: &Schema, bag: &PropertyBag) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    // Unknown fields fail fast; duck-typed bags are only trusted after the
    // schema has vouched for every key.
    for key in bag.keys() {
        if !schema.attributes.contains_key(key) {
            diagnostics.push(
                Diagnostic::error(format!("Unknown attribute '{}'", key))
                    .with_detail("This attribute is not declared in the resource schema")
                    .with_attribute(key.clone()),
            );
        }
    }

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, bag.get(name), name, &mut diagnostics);
    }

    diagnostics
}

/// Validate a property bag, returning `Ok` if valid or `Err` with diagnostics.
pub fn validate_result(schema: &Schema, bag: &PropertyBag) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, bag);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a property bag is valid against a schema.
pub fn is_valid(schema: &Schema, bag: &PropertyBag) -> bool {
    validate(schema, bag).is_empty()
}

/// Fold schema defaults into a copy of the bag.
///
/// Attributes with a declared default that are absent (or null) in the
/// input get the default value. Called before diffing so that omitting a
/// defaulted attribute never shows up as a change.
pub fn apply_defaults(schema: &Schema, bag: &PropertyBag) -> PropertyBag {
    let mut out = bag.clone();
    for (name, attr) in &schema.attributes {
        if let Some(default) = &attr.default {
            let missing = matches!(out.get(name), None | Some(Value::Null));
            if missing {
                out.insert(name.clone(), default.clone());
            }
        }
    }
    out
}

/// The first error-severity diagnostic, if any.
pub fn first_error(diagnostics: &[Diagnostic]) -> Option<&Diagnostic> {
    diagnostics
        .iter()
        .find(|d| matches!(d.severity, DiagnosticSeverity::Error))
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Computed-only attributes are provider outputs; input values for them
    // are not checked.
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
        },
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Float64 => {
            if !value.is_number() {
                diagnostics.push(type_error(path, "float64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            // Sets are carried as JSON arrays.
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
        AttributeType::Dynamic => {
            // Dynamic accepts any value.
        },
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            if n.as_i64().is_some() {
                true
            } else if let Some(f) = n.as_f64() {
                f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
            } else {
                false
            }
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}
