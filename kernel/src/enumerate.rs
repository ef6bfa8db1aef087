// Resource Enumeration
//
// Wraps each top-level block of a configuration tree into a resource
// descriptor: its normalized body plus where it was declared.

use std::collections::BTreeMap;

use crate::normalize::{normalize, NormalizeError};
use crate::tree::{ConfigTree, PositionRange};
use crate::value::{GenericValue, CONFIG_KEY, POSITION_KEY};

/// One enumerated top-level block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub block_type: String,
    pub labels: Vec<String>,
    pub config: BTreeMap<String, GenericValue>,
    pub position: PositionRange,
}

impl ResourceDescriptor {
    /// Dynamic form handed to rules.
    ///
    /// `config` and `position` use the same shapes the normalizer
    /// produces for nested blocks.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        out.insert("type".into(), self.block_type.clone().into());
        out.insert("labels".into(), self.labels.clone().into());
        out.insert(
            CONFIG_KEY.into(),
            GenericValue::Mapping(self.config.clone()).to_json(),
        );
        out.insert(
            POSITION_KEY.into(),
            GenericValue::from(&self.position).to_json(),
        );
        serde_json::Value::Object(out)
    }
}

/// Enumerate top-level blocks in declaration order.
pub fn enumerate(tree: &ConfigTree) -> Result<Vec<ResourceDescriptor>, NormalizeError> {
    tree.blocks()
        .map(|block| {
            Ok(ResourceDescriptor {
                block_type: block.block_type.clone(),
                labels: block.labels.clone(),
                config: normalize(&block.body)?,
                position: block.position.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::testing::*;
    use serde_json::json;

    #[test]
    fn two_instances_enumerate_in_declaration_order() {
        let resources = enumerate(&two_instances()).unwrap();

        assert_eq!(resources.len(), 2);
        assert_eq!(
            resources[0].config,
            BTreeMap::from([("instance_type".to_string(), GenericValue::from("t2.micro"))])
        );
        assert_eq!(
            resources[1].config,
            BTreeMap::from([("instance_type".to_string(), GenericValue::from("t2.nano"))])
        );
        assert!(resources[0].position.start.line < resources[1].position.start.line);
        assert_eq!(resources[0].labels, vec!["aws_instance", "foo"]);
    }

    #[test]
    fn empty_tree_has_no_resources() {
        assert!(enumerate(&ConfigTree::new()).unwrap().is_empty());
    }

    #[test]
    fn failure_in_one_block_fails_enumeration() {
        let bad = body(
            vec![string_attr("lifecycle", "x", 5)],
            vec![block("lifecycle", &[], ConfigTree::new(), 6)],
        );
        let tree = body(vec![], vec![block("resource", &["aws_instance", "x"], bad, 4)]);

        assert!(matches!(
            enumerate(&tree).unwrap_err(),
            NormalizeError::StructuralConflict { .. }
        ));
    }

    #[test]
    fn json_form_exposes_config_and_position() {
        let resources = enumerate(&two_instances()).unwrap();
        let value = resources[1].to_json();

        assert_eq!(value["config"], json!({"instance_type": "t2.nano"}));
        assert_eq!(value["position"]["start"]["line"], json!("2"));
        assert_eq!(value["type"], json!("resource"));
        assert_eq!(value["labels"], json!(["aws_instance", "bar"]));
    }
}
