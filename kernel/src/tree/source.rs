// Configuration Tree Source
//
// Defines the capability that supplies configuration trees to the
// function bridge. Implementations may parse files, query a provider
// runner, or hold a fixed tree in memory.

use crate::schema::Schema;
use crate::tree::ConfigTree;

/// What a rule asked for when it called the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub resource_type: String,
    pub schema: Schema,
}

/// Raised when a source cannot produce a tree.
#[derive(Debug, thiserror::Error)]
#[error("configuration tree unavailable for `{resource_type}`: {reason}")]
pub struct TreeUnavailable {
    pub resource_type: String,
    pub reason: String,
}

/// Supplier of configuration trees.
///
/// Implementations MUST:
/// - return blocks in declaration order
/// - return the same tree for the same request while the
///   underlying configuration is unchanged
pub trait ConfigTreeSource: Send + Sync {
    fn config_tree(&self, request: &ResourceRequest) -> Result<ConfigTree, TreeUnavailable>;
}

/// Source returning a fixed snapshot regardless of the request.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tree: ConfigTree,
}

impl InMemorySource {
    pub fn new(tree: ConfigTree) -> Self {
        Self { tree }
    }
}

impl ConfigTreeSource for InMemorySource {
    fn config_tree(&self, _request: &ResourceRequest) -> Result<ConfigTree, TreeUnavailable> {
        Ok(self.tree.clone())
    }
}
