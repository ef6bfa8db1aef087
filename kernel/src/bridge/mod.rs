// Function Bridge
//
// The host function rules call to read configuration resources:
//
//   terraform.resources(resource_type, schema_sample)
//
// It infers a schema from the sample, fetches the configuration tree,
// enumerates its resources and hands them back as dynamic values.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::enumerate::enumerate;
use crate::normalize::NormalizeError;
use crate::schema::{infer, sample_from_json, SchemaError};
use crate::tree::source::{ConfigTreeSource, ResourceRequest, TreeUnavailable};

pub mod registry;

pub use registry::{FunctionDecl, FunctionRegistry, HostFunction, ValueKind};

/// Name rules use to call the bridge.
pub const RESOURCES_FUNCTION: &str = "terraform.resources";

static RESOURCES_DECL: FunctionDecl = FunctionDecl {
    name: RESOURCES_FUNCTION,
    args: &[ValueKind::String, ValueKind::Object],
    result: ValueKind::Array,
};

/// Errors raised inside a host function call.
///
/// Any of these aborts the rule evaluation that made the call.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid call to `{function}`: {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("`{function}` returned {found}, declared {expected:?}")]
    InvalidResult {
        function: String,
        expected: ValueKind,
        found: &'static str,
    },

    #[error("unknown host function `{0}`")]
    UnknownFunction(String),

    #[error("schema sample for `{resource_type}` rejected: {source}")]
    Schema {
        resource_type: String,
        #[source]
        source: SchemaError,
    },

    #[error(transparent)]
    TreeUnavailable(#[from] TreeUnavailable),

    #[error("normalizing `{resource_type}` resources failed: {source}")]
    Normalize {
        resource_type: String,
        #[source]
        source: NormalizeError,
    },

    #[error("deadline exceeded before fetching `{resource_type}` resources")]
    DeadlineExceeded { resource_type: String },
}

/// `terraform.resources` bound to one configuration source.
#[derive(Clone)]
pub struct FunctionBridge {
    source: Arc<dyn ConfigTreeSource>,
    deadline: Option<Instant>,
}

impl FunctionBridge {
    pub fn new(source: Arc<dyn ConfigTreeSource>) -> Self {
        Self {
            source,
            deadline: None,
        }
    }

    /// Fail calls made after `deadline`.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    fn invalid(reason: impl Into<String>) -> BridgeError {
        BridgeError::InvalidArgument {
            function: RESOURCES_FUNCTION.to_string(),
            reason: reason.into(),
        }
    }
}

impl HostFunction for FunctionBridge {
    fn decl(&self) -> &FunctionDecl {
        &RESOURCES_DECL
    }

    fn call(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let (resource_type, sample) = match args {
            [Value::String(resource_type), Value::Object(sample)] => (resource_type, sample),
            _ => return Err(Self::invalid("expected (string, object)")),
        };
        if resource_type.is_empty() {
            return Err(Self::invalid("resource type must not be empty"));
        }

        let schema = sample_from_json(sample)
            .and_then(|sample| infer(&sample))
            .map_err(|source| BridgeError::Schema {
                resource_type: resource_type.clone(),
                source,
            })?;
        debug!(resource_type = %resource_type, schema = ?schema, "inferred schema");

        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BridgeError::DeadlineExceeded {
                    resource_type: resource_type.clone(),
                });
            }
        }

        let tree = self.source.config_tree(&ResourceRequest {
            resource_type: resource_type.clone(),
            schema,
        })?;

        let resources = enumerate(&tree).map_err(|source| BridgeError::Normalize {
            resource_type: resource_type.clone(),
            source,
        })?;
        info!(resource_type = %resource_type, count = resources.len(), "resources enumerated");

        Ok(Value::Array(resources.iter().map(|r| r.to_json()).collect()))
    }
}
