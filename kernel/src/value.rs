// Generic Values
//
// Schema-agnostic data crossing from the configuration tree into the
// rule engine. Only three shapes exist: string scalars, mappings and
// ordered sequences.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::tree::{Pos, PositionRange};

/// Key under which a normalized block body is stored.
pub const CONFIG_KEY: &str = "config";

/// Key under which a block's source position is stored.
pub const POSITION_KEY: &str = "position";

/// Normalized value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GenericValue {
    Scalar(String),
    Mapping(BTreeMap<String, GenericValue>),
    Sequence(Vec<GenericValue>),
}

impl GenericValue {
    pub fn kind(&self) -> &'static str {
        match self {
            GenericValue::Scalar(_) => "scalar",
            GenericValue::Mapping(_) => "mapping",
            GenericValue::Sequence(_) => "sequence",
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            GenericValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, GenericValue>> {
        match self {
            GenericValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Render into the dynamic representation handed to rule engines.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            GenericValue::Scalar(s) => serde_json::Value::String(s.clone()),
            GenericValue::Mapping(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            GenericValue::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(GenericValue::to_json).collect())
            }
        }
    }
}

impl From<&str> for GenericValue {
    fn from(s: &str) -> Self {
        GenericValue::Scalar(s.to_string())
    }
}

impl From<String> for GenericValue {
    fn from(s: String) -> Self {
        GenericValue::Scalar(s)
    }
}

impl From<BTreeMap<String, GenericValue>> for GenericValue {
    fn from(m: BTreeMap<String, GenericValue>) -> Self {
        GenericValue::Mapping(m)
    }
}

fn pos_value(pos: &Pos) -> GenericValue {
    GenericValue::Mapping(BTreeMap::from([
        ("line".to_string(), pos.line.to_string().into()),
        ("column".to_string(), pos.column.to_string().into()),
        ("byte".to_string(), pos.byte.to_string().into()),
    ]))
}

impl From<&PositionRange> for GenericValue {
    fn from(range: &PositionRange) -> Self {
        GenericValue::Mapping(BTreeMap::from([
            ("filename".to_string(), range.filename.clone().into()),
            ("start".to_string(), pos_value(&range.start)),
            ("end".to_string(), pos_value(&range.end)),
        ]))
    }
}

/// Wrap a normalized body with its position: `{config, position}`.
pub fn block_entry(config: BTreeMap<String, GenericValue>, position: &PositionRange) -> GenericValue {
    GenericValue::Mapping(BTreeMap::from([
        (CONFIG_KEY.to_string(), GenericValue::Mapping(config)),
        (POSITION_KEY.to_string(), GenericValue::from(position)),
    ]))
}

/// True if `map` has exactly the shape produced by [`block_entry`].
pub fn is_block_entry(map: &BTreeMap<String, GenericValue>) -> bool {
    map.len() == 2
        && matches!(map.get(CONFIG_KEY), Some(GenericValue::Mapping(_)))
        && matches!(map.get(POSITION_KEY), Some(GenericValue::Mapping(_)))
}
