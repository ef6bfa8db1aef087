// Configuration Tree Model
//
// Typed attribute/block tree produced by a configuration parser.
// Attribute expressions are kept deferred; the normalizer evaluates them.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod source;

/// A single source position (1-based line and column).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
    pub byte: usize,
}

/// Start/end markers of a declaration in its source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRange {
    pub filename: String,
    pub start: Pos,
    pub end: Pos,
}

impl PositionRange {
    /// Range spanning whole lines, used by hand-built trees.
    pub fn lines(filename: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            filename: filename.into(),
            start: Pos {
                line: start,
                column: 1,
                byte: 0,
            },
            end: Pos {
                line: end,
                column: 1,
                byte: 0,
            },
        }
    }
}

impl fmt::Display for PositionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.start.line)
    }
}

/// `name = <expression>` inside a body.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub expr: hcl::Expression,
    pub range: PositionRange,
}

/// A nested block: `type "label" ... { body }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub body: ConfigTree,
    pub position: PositionRange,
}

/// Errors produced while building a tree.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("duplicate attribute `{0}` in the same body")]
    DuplicateAttribute(String),
}

/// One body of the configuration tree.
///
/// Attributes keep declaration order and have unique names.
/// Blocks keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    attributes: Vec<Attribute>,
    blocks: Vec<Block>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute. Names must be unique within the body.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<(), TreeError> {
        if self.attribute(&attribute.name).is_some() {
            return Err(TreeError::DuplicateAttribute(attribute.name));
        }
        self.attributes.push(attribute);
        Ok(())
    }

    /// Append a child block.
    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Keep only the top-level blocks matching `keep`, preserving order.
    pub fn retain_blocks<F: FnMut(&Block) -> bool>(&mut self, keep: F) {
        self.blocks.retain(keep);
    }
}
