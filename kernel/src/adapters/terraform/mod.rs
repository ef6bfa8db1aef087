// Terraform Configuration Adapter
//
// Parses HCL files into configuration trees. `hcl-edit` supplies the
// source spans, `hcl` the evaluable expressions; both parsers walk the
// same document, so their structures line up one to one.

use std::fs;
use std::ops::Range;
use std::path::PathBuf;

use hcl_edit::repr::Span;
use tracing::debug;

use crate::tree::source::{ConfigTreeSource, ResourceRequest, TreeUnavailable};
use crate::tree::{Attribute, Block, ConfigTree, Pos, PositionRange, TreeError};

/// Block type holding managed resources.
pub const RESOURCE_BLOCK: &str = "resource";

/// Errors produced while reading HCL configuration.
#[derive(Debug, thiserror::Error)]
pub enum HclError {
    #[error("reading `{filename}` failed: {source}")]
    Io {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{filename}` is not valid HCL: {message}")]
    Parse { filename: String, message: String },

    #[error("`{filename}`: {source}")]
    Tree {
        filename: String,
        #[source]
        source: TreeError,
    },

    #[error("`{filename}`: parsers disagree on document structure")]
    Mismatch { filename: String },
}

/// Byte offset → line/column lookup.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn pos(&self, byte: usize) -> Pos {
        let line = self.starts.partition_point(|start| *start <= byte);
        Pos {
            line,
            column: byte - self.starts[line - 1] + 1,
            byte,
        }
    }

    /// `end` points at the last byte of the span.
    fn range(&self, filename: &str, span: Option<Range<usize>>) -> PositionRange {
        let span = span.unwrap_or(0..0);
        PositionRange {
            filename: filename.to_string(),
            start: self.pos(span.start),
            end: self.pos(span.end.saturating_sub(1).max(span.start)),
        }
    }
}

/// Parse one HCL document.
pub fn parse_config(filename: &str, source: &str) -> Result<ConfigTree, HclError> {
    let parse_error = |message: String| HclError::Parse {
        filename: filename.to_string(),
        message,
    };
    let spans = hcl_edit::parser::parse_body(source).map_err(|e| parse_error(e.to_string()))?;
    let body: hcl::Body = hcl::parse(source).map_err(|e| parse_error(e.to_string()))?;

    let index = LineIndex::new(source);
    convert(filename, &index, &spans, body)
}

fn convert(
    filename: &str,
    index: &LineIndex,
    spans: &hcl_edit::structure::Body,
    body: hcl::Body,
) -> Result<ConfigTree, HclError> {
    use hcl_edit::structure::Structure as Spanned;

    let mismatch = || HclError::Mismatch {
        filename: filename.to_string(),
    };

    let spanned: Vec<&Spanned> = spans.iter().collect();
    let structures: Vec<hcl::Structure> = body.into_iter().collect();
    if spanned.len() != structures.len() {
        return Err(mismatch());
    }

    let mut tree = ConfigTree::new();
    for (spanned, structure) in spanned.into_iter().zip(structures) {
        match (spanned, structure) {
            (Spanned::Attribute(span), hcl::Structure::Attribute(attr)) => {
                tree.add_attribute(Attribute {
                    name: attr.key.to_string(),
                    expr: attr.expr,
                    range: index.range(filename, span.span()),
                })
                .map_err(|source| HclError::Tree {
                    filename: filename.to_string(),
                    source,
                })?;
            }
            (Spanned::Block(span), hcl::Structure::Block(block)) => {
                let body = convert(filename, index, &span.body, block.body)?;
                tree.add_block(Block {
                    block_type: block.identifier.to_string(),
                    labels: block.labels.iter().map(|l| l.as_str().to_string()).collect(),
                    body,
                    position: index.range(filename, span.span()),
                });
            }
            _ => return Err(mismatch()),
        }
    }

    Ok(tree)
}

/// Reads HCL files on every request and returns the `resource` blocks
/// of the requested type, in file then declaration order.
#[derive(Debug, Clone)]
pub struct HclFileSource {
    paths: Vec<PathBuf>,
}

impl HclFileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Parse every file into one tree.
    pub fn load(&self) -> Result<ConfigTree, HclError> {
        let mut merged = ConfigTree::new();
        for path in &self.paths {
            let filename = path.display().to_string();
            let source = fs::read_to_string(path).map_err(|source| HclError::Io {
                filename: filename.clone(),
                source,
            })?;
            let tree = parse_config(&filename, &source)?;

            for attr in tree.attributes() {
                merged
                    .add_attribute(attr.clone())
                    .map_err(|source| HclError::Tree {
                        filename: filename.clone(),
                        source,
                    })?;
            }
            for block in tree.blocks() {
                merged.add_block(block.clone());
            }
        }
        Ok(merged)
    }
}

impl ConfigTreeSource for HclFileSource {
    fn config_tree(&self, request: &ResourceRequest) -> Result<ConfigTree, TreeUnavailable> {
        let mut tree = self.load().map_err(|err| TreeUnavailable {
            resource_type: request.resource_type.clone(),
            reason: err.to_string(),
        })?;

        tree.retain_blocks(|block| {
            block.block_type == RESOURCE_BLOCK
                && block.labels.first() == Some(&request.resource_type)
        });
        debug!(
            resource_type = %request.resource_type,
            blocks = tree.blocks().count(),
            "selected resource blocks"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::enumerate;
    use crate::normalize::NormalizeError;
    use crate::schema::Schema;
    use crate::value::GenericValue;

    const MAIN_TF: &str = r#"resource "aws_instance" "foo" {
  instance_type = "t2.micro"

  ebs_block_device {
    volume_size = 20
  }
}

resource "aws_s3_bucket" "logs" {
  bucket = "logs"
}

resource "aws_instance" "bar" {
  instance_type = "t2.nano"
}
"#;

    fn request(resource_type: &str) -> ResourceRequest {
        ResourceRequest {
            resource_type: resource_type.into(),
            schema: Schema::default(),
        }
    }

    #[test]
    fn line_index_maps_offsets() {
        let index = LineIndex::new("ab\ncd\n");
        assert_eq!(index.pos(0), Pos { line: 1, column: 1, byte: 0 });
        assert_eq!(index.pos(4), Pos { line: 2, column: 2, byte: 4 });
    }

    #[test]
    fn parses_blocks_with_positions() {
        let tree = parse_config("main.tf", MAIN_TF).unwrap();
        let blocks: Vec<_> = tree.blocks().collect();

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].block_type, "resource");
        assert_eq!(blocks[0].labels, vec!["aws_instance", "foo"]);
        assert_eq!(blocks[0].position.start.line, 1);
        assert_eq!(blocks[0].position.end.line, 7);
        assert_eq!(blocks[2].position.start.line, 13);

        let attr = blocks[0].body.attribute("instance_type").unwrap();
        assert_eq!(attr.range.start.line, 2);
        assert_eq!(attr.range.filename, "main.tf");
    }

    #[test]
    fn invalid_hcl_is_rejected() {
        let err = parse_config("bad.tf", "resource \"x\" {\n").unwrap_err();
        assert!(matches!(err, HclError::Parse { .. }));
    }

    #[test]
    fn duplicate_attribute_is_rejected() {
        let err = parse_config("dup.tf", "a = 1\na = 2\n").unwrap_err();
        assert!(matches!(err, HclError::Tree { .. } | HclError::Parse { .. }));
    }

    #[test]
    fn file_source_selects_requested_type_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.tf");
        fs::write(&path, MAIN_TF).unwrap();
        let source = HclFileSource::new(vec![path]);

        let resources = enumerate(&source.config_tree(&request("aws_instance")).unwrap()).unwrap();

        let names: Vec<_> = resources.iter().map(|r| r.labels[1].as_str()).collect();
        assert_eq!(names, vec!["foo", "bar"]);
        assert_eq!(resources[0].config["instance_type"], GenericValue::from("t2.micro"));

        let devices = match &resources[0].config["ebs_block_device"] {
            GenericValue::Sequence(items) => items,
            other => panic!("expected sequence, got {other:?}"),
        };
        assert_eq!(devices[0].to_json()["config"]["volume_size"], "20");
    }

    #[test]
    fn missing_file_is_unavailable() {
        let source = HclFileSource::new(vec![PathBuf::from("/no/such/main.tf")]);
        let err = source.config_tree(&request("aws_instance")).unwrap_err();
        assert!(err.reason.contains("/no/such/main.tf"));
    }

    #[test]
    fn variable_reference_fails_normalization() {
        let tree = parse_config(
            "vars.tf",
            "resource \"aws_instance\" \"x\" {\n  instance_type = var.size\n}\n",
        )
        .unwrap();

        let err = enumerate(&tree).unwrap_err();
        match err {
            NormalizeError::Evaluation { attribute, position, .. } => {
                assert_eq!(attribute, "instance_type");
                assert_eq!(position.start.line, 2);
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
    }
}
