// Tree Normalizer
//
// Converts a configuration tree into generic nested-map data:
// attributes become string scalars, repeated blocks become ordered
// sequences of `{config, position}` entries keyed by block type.
// This module is pure and deterministic.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use hcl::eval::{Context, Evaluate};

use crate::tree::{Attribute, ConfigTree, PositionRange};
use crate::value::{block_entry, GenericValue};

/// Errors produced while normalizing a tree.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    /// The expression depends on something a static context cannot resolve.
    #[error("{position}: attribute `{attribute}` is not statically resolvable: {message}")]
    Evaluation {
        attribute: String,
        position: PositionRange,
        message: String,
    },

    #[error("{position}: attribute `{attribute}` evaluated to {found}, expected a string")]
    TypeConversion {
        attribute: String,
        position: PositionRange,
        found: &'static str,
    },

    #[error("{position}: `{name}` is used both as an attribute and as a block type")]
    StructuralConflict {
        name: String,
        position: PositionRange,
    },
}

/// Normalize one body into a mapping of generic values.
pub fn normalize(node: &ConfigTree) -> Result<BTreeMap<String, GenericValue>, NormalizeError> {
    let mut out = BTreeMap::new();

    for attr in node.attributes() {
        out.insert(attr.name.clone(), GenericValue::Scalar(evaluate_static(attr)?));
    }

    for block in node.blocks() {
        let entry = block_entry(normalize(&block.body)?, &block.position);

        match out.entry(block.block_type.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(GenericValue::Sequence(vec![entry]));
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                GenericValue::Sequence(items) => items.push(entry),
                _ => {
                    return Err(NormalizeError::StructuralConflict {
                        name: block.block_type.clone(),
                        position: block.position.clone(),
                    })
                }
            },
        }
    }

    Ok(out)
}

/// Evaluate an attribute with no variables or functions in scope and
/// convert the result to a string scalar.
pub fn evaluate_static(attr: &Attribute) -> Result<String, NormalizeError> {
    let value = attr
        .expr
        .evaluate(&Context::new())
        .map_err(|err| NormalizeError::Evaluation {
            attribute: attr.name.clone(),
            position: attr.range.clone(),
            message: err.to_string(),
        })?;

    match value {
        hcl::Value::String(s) => Ok(s),
        hcl::Value::Number(n) => Ok(n.to_string()),
        hcl::Value::Bool(b) => Ok(b.to_string()),
        other => Err(NormalizeError::TypeConversion {
            attribute: attr.name.clone(),
            position: attr.range.clone(),
            found: value_kind(&other),
        }),
    }
}

fn value_kind(value: &hcl::Value) -> &'static str {
    match value {
        hcl::Value::Null => "null",
        hcl::Value::Bool(_) => "bool",
        hcl::Value::Number(_) => "number",
        hcl::Value::String(_) => "string",
        hcl::Value::Array(_) => "array",
        hcl::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::testing::*;
    use crate::value::{CONFIG_KEY, POSITION_KEY};

    fn parsed_attr(name: &str, source: &str) -> Attribute {
        let body: hcl::Body = hcl::parse(&format!("{name} = {source}\n")).unwrap();
        let expr = body.attributes().next().unwrap().expr.clone();
        Attribute {
            name: name.into(),
            expr,
            range: PositionRange::lines("main.tf", 1, 1),
        }
    }

    fn sequence<'a>(out: &'a BTreeMap<String, GenericValue>, key: &str) -> &'a [GenericValue] {
        match &out[key] {
            GenericValue::Sequence(items) => items,
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    fn config_of(entry: &GenericValue) -> &BTreeMap<String, GenericValue> {
        entry.as_mapping().unwrap()[CONFIG_KEY].as_mapping().unwrap()
    }

    #[test]
    fn attributes_become_scalars() {
        let tree = body(
            vec![
                string_attr("ami", "ami-123", 1),
                parsed_attr("volume_size", "20"),
                parsed_attr("encrypted", "true"),
            ],
            vec![],
        );

        let out = normalize(&tree).unwrap();

        assert_eq!(out["ami"], GenericValue::from("ami-123"));
        assert_eq!(out["volume_size"], GenericValue::from("20"));
        assert_eq!(out["encrypted"], GenericValue::from("true"));
    }

    #[test]
    fn static_template_is_evaluated() {
        let tree = body(vec![parsed_attr("name", r#""web-${"01"}""#)], vec![]);
        let out = normalize(&tree).unwrap();
        assert_eq!(out["name"], GenericValue::from("web-01"));
    }

    #[test]
    fn variable_reference_fails_evaluation() {
        let tree = body(vec![parsed_attr("region", "var.region")], vec![]);

        let err = normalize(&tree).unwrap_err();

        assert!(matches!(err, NormalizeError::Evaluation { ref attribute, .. } if attribute == "region"));
    }

    #[test]
    fn non_scalar_value_fails_conversion() {
        let tree = body(vec![parsed_attr("tags", r#"["a", "b"]"#)], vec![]);

        let err = normalize(&tree).unwrap_err();

        assert_eq!(
            err,
            NormalizeError::TypeConversion {
                attribute: "tags".into(),
                position: PositionRange::lines("main.tf", 1, 1),
                found: "array",
            }
        );
    }

    #[test]
    fn null_fails_conversion() {
        let tree = body(vec![parsed_attr("ami", "null")], vec![]);
        let err = normalize(&tree).unwrap_err();
        assert!(matches!(err, NormalizeError::TypeConversion { found: "null", .. }));
    }

    #[test]
    fn repeated_blocks_preserve_order() {
        let device = |size: &str, line| {
            block(
                "ebs_block_device",
                &[],
                body(vec![string_attr("volume_size", size, line)], vec![]),
                line,
            )
        };
        let tree = body(vec![], vec![device("10", 3), device("20", 6), device("30", 9)]);

        let out = normalize(&tree).unwrap();
        let items = sequence(&out, "ebs_block_device");

        let sizes: Vec<_> = items
            .iter()
            .map(|e| config_of(e)["volume_size"].as_scalar().unwrap())
            .collect();
        assert_eq!(sizes, vec!["10", "20", "30"]);

        let lines: Vec<_> = items
            .iter()
            .map(|e| e.to_json()[POSITION_KEY]["start"]["line"].clone())
            .collect();
        assert_eq!(lines, vec!["3", "6", "9"]);
    }

    #[test]
    fn nested_blocks_are_normalized_recursively() {
        let tree = body(
            vec![string_attr("instance_type", "t2.micro", 1)],
            vec![block(
                "root_block_device",
                &[],
                body(
                    vec![],
                    vec![block("tag", &[], body(vec![string_attr("key", "env", 4)], vec![]), 4)],
                ),
                3,
            )],
        );

        let out = normalize(&tree).unwrap();

        let root = &sequence(&out, "root_block_device")[0];
        let tags = match &config_of(root)["tag"] {
            GenericValue::Sequence(items) => items,
            other => panic!("expected sequence, got {other:?}"),
        };
        assert_eq!(config_of(&tags[0])["key"], GenericValue::from("env"));
    }

    #[test]
    fn attribute_and_block_sharing_a_name_conflict() {
        let tree = body(
            vec![string_attr("lifecycle", "x", 1)],
            vec![block("lifecycle", &[], ConfigTree::new(), 2)],
        );

        let err = normalize(&tree).unwrap_err();

        assert!(matches!(err, NormalizeError::StructuralConflict { ref name, .. } if name == "lifecycle"));
    }

    #[test]
    fn normalization_is_deterministic() {
        let tree = two_instances();
        assert_eq!(normalize(&tree).unwrap(), normalize(&tree).unwrap());
    }
}
