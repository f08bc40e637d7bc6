//! Schema generation
//!
//! - [`fragment`] - Per-provider enum definitions and the provider-guarded rule
//! - [`generator`] - Cache-then-fetch resolution and merging into the base schema
//!
//! The structural base schema is embedded at compile time; callers may swap
//! in their own with [`SchemaGenerator::with_base_schema`].

pub mod fragment;
pub mod generator;

pub use fragment::{build_fragment, definition_prefix, SchemaFragment};
pub use generator::{merge_schemas, GenerateOptions, SchemaGenerator};

use crate::error::{Result, SchemaError};
use jsonschema::Draft;
use serde_json::Value;
use std::sync::OnceLock;

/// Embedded structural schema (compiled into the binary)
const BASE_SCHEMA: &str = include_str!("base_schema.json");

static DEFAULT_BASE_SCHEMA: OnceLock<Value> = OnceLock::new();

/// The built-in base schema (parsed from embedded JSON on first access)
pub fn default_base_schema() -> &'static Value {
    DEFAULT_BASE_SCHEMA.get_or_init(|| {
        serde_json::from_str(BASE_SCHEMA).unwrap_or_else(|e| {
            tracing::error!("Failed to parse embedded base schema: {}", e);
            serde_json::json!({ "type": "object", "definitions": {} })
        })
    })
}

/// Validate a configuration document against a schema
///
/// Returns one message per violation; an empty list means the document is
/// valid. Only structural validation is performed.
pub fn validate_config(schema: &Value, instance: &Value) -> Result<Vec<String>> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(schema)
        .map_err(|e| SchemaError::Compile(e.to_string()))?;

    Ok(validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect())
}
