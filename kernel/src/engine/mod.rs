// Rule Engine Interface
//
// Defines the contract between the dispatcher and a declarative rule
// evaluator. The evaluator is opaque: it receives a query, the loaded
// modules, a data store, input bindings and the host functions it may
// call, and returns a result set.

use serde_json::Value;

use crate::bridge::{BridgeError, FunctionRegistry};
use crate::rules::RuleModule;

pub mod rego;

pub use rego::RegoEngine;

/// One solution of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub expressions: Vec<Value>,
}

/// All solutions of a query, in engine order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub results: Vec<QueryResult>,
}

impl ResultSet {
    /// Value of the first expression of the first result, if any.
    pub fn first_value(&self) -> Option<&Value> {
        self.results.first().and_then(|r| r.expressions.first())
    }
}

/// Errors surfaced by a rule evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("module `{path}` rejected by engine: {message}")]
    Module { path: String, message: String },

    #[error("evaluating `{query}` failed: {message}")]
    RuleEvaluation { query: String, message: String },

    /// A host function failed while the query was running.
    #[error("evaluating `{query}` failed in host function: {source}")]
    HostFunction {
        query: String,
        #[source]
        source: BridgeError,
    },

    #[error("`{query}` produced {found}, expected a collection of findings")]
    UnexpectedResult { query: String, found: &'static str },
}

/// A declarative rule evaluator.
pub trait RuleEngine {
    fn evaluate(
        &self,
        query: &str,
        modules: &[RuleModule],
        store: &Value,
        input: &Value,
        functions: &FunctionRegistry,
    ) -> Result<ResultSet, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_value_of_empty_set_is_none() {
        assert!(ResultSet::default().first_value().is_none());
    }

    #[test]
    fn first_value_reads_first_expression() {
        let rs = ResultSet {
            results: vec![QueryResult {
                expressions: vec![json!(["a"]), json!(["b"])],
            }],
        };
        assert_eq!(rs.first_value(), Some(&json!(["a"])));
    }
}
