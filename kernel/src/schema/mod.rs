// Schema Inference
//
// Derives a structural schema (attribute keys vs. nested block types)
// from a sample of generic data. Rules supply such samples to the
// function bridge to describe the shape of the resources they read.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::value::{is_block_entry, GenericValue, CONFIG_KEY};

/// Which keys are scalar attributes and which are nested blocks.
///
/// A key appears in exactly one of the two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub attributes: BTreeSet<String>,
    pub blocks: BTreeMap<String, Schema>,
}

/// Errors produced while inferring a schema.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported value shape at `{key}`: {found}")]
    UnsupportedShape { key: String, found: String },

    /// A block type given with no sample instances.
    #[error("cannot infer block schema at `{key}` from an empty sequence")]
    EmptyBlockSample { key: String },
}

/// Infer a schema from a sample mapping.
pub fn infer(sample: &BTreeMap<String, GenericValue>) -> Result<Schema, SchemaError> {
    infer_at("", sample)
}

fn infer_at(prefix: &str, sample: &BTreeMap<String, GenericValue>) -> Result<Schema, SchemaError> {
    let mut schema = Schema::default();

    for (key, value) in sample {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            GenericValue::Scalar(_) => {
                schema.attributes.insert(key.clone());
            }
            GenericValue::Mapping(body) => {
                schema.blocks.insert(key.clone(), infer_at(&path, body)?);
            }
            GenericValue::Sequence(items) => {
                // The first instance stands for the whole sequence.
                let first = items
                    .first()
                    .ok_or_else(|| SchemaError::EmptyBlockSample { key: path.clone() })?;
                let body = first.as_mapping().ok_or_else(|| SchemaError::UnsupportedShape {
                    key: path.clone(),
                    found: format!("sequence of {}", first.kind()),
                })?;
                let body = match body.get(CONFIG_KEY) {
                    Some(GenericValue::Mapping(config)) if is_block_entry(body) => config,
                    _ => body,
                };
                schema.blocks.insert(key.clone(), infer_at(&path, body)?);
            }
        }
    }

    Ok(schema)
}

/// Convert a dynamic schema sample into generic data.
///
/// Numbers and booleans are taken as scalars in their text form;
/// nulls are rejected.
pub fn sample_from_json(
    sample: &serde_json::Map<String, serde_json::Value>,
) -> Result<BTreeMap<String, GenericValue>, SchemaError> {
    sample
        .iter()
        .map(|(key, value)| Ok((key.clone(), json_to_generic(key, value)?)))
        .collect()
}

fn json_to_generic(path: &str, value: &serde_json::Value) -> Result<GenericValue, SchemaError> {
    use serde_json::Value;

    Ok(match value {
        Value::String(s) => GenericValue::Scalar(s.clone()),
        Value::Number(n) => GenericValue::Scalar(n.to_string()),
        Value::Bool(b) => GenericValue::Scalar(b.to_string()),
        Value::Object(map) => GenericValue::Mapping(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), json_to_generic(&format!("{path}.{k}"), v)?)))
                .collect::<Result<_, SchemaError>>()?,
        ),
        Value::Array(items) => GenericValue::Sequence(
            items
                .iter()
                .map(|v| json_to_generic(path, v))
                .collect::<Result<_, _>>()?,
        ),
        Value::Null => {
            return Err(SchemaError::UnsupportedShape {
                key: path.to_string(),
                found: "null".into(),
            })
        }
    })
}
