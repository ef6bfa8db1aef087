// Host Function Registry
//
// Named, statically-declared callables the host exposes to the rule
// engine. Every call is checked against its declaration before it
// reaches the implementation.

use std::sync::Arc;

use serde_json::Value;

use super::BridgeError;

/// Coarse type of a dynamic value, as used in declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Object,
    Array,
}

impl ValueKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Object => value.is_object(),
            ValueKind::Array => value.is_array(),
        }
    }

    pub fn of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Fixed name and signature of a host function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: &'static str,
    pub args: &'static [ValueKind],
    pub result: ValueKind,
}

/// A callable exposed to rules.
///
/// Implementations must be:
/// - synchronous
/// - free of side effects visible outside a single call
pub trait HostFunction: Send + Sync {
    fn decl(&self) -> &FunctionDecl;

    fn call(&self, args: &[Value]) -> Result<Value, BridgeError>;
}

/// Set of host functions registered for one evaluation.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Vec<Arc<dyn HostFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. A later registration replaces an earlier
    /// one with the same name.
    pub fn register<F: HostFunction + 'static>(&mut self, function: F) {
        let name = function.decl().name;
        self.functions.retain(|f| f.decl().name != name);
        self.functions.push(Arc::new(function));
    }

    pub fn decls(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.functions.iter().map(|f| f.decl())
    }

    /// Call `name` after checking arity and argument kinds. The returned
    /// value must match the declared result kind.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, BridgeError> {
        let function = self
            .functions
            .iter()
            .find(|f| f.decl().name == name)
            .ok_or_else(|| BridgeError::UnknownFunction(name.to_string()))?;
        let decl = function.decl();

        if args.len() != decl.args.len() {
            return Err(BridgeError::InvalidArgument {
                function: name.to_string(),
                reason: format!("expected {} arguments, got {}", decl.args.len(), args.len()),
            });
        }

        for (index, (kind, arg)) in decl.args.iter().zip(args).enumerate() {
            if !kind.matches(arg) {
                return Err(BridgeError::InvalidArgument {
                    function: name.to_string(),
                    reason: format!(
                        "argument {} must be {:?}, got {}",
                        index + 1,
                        kind,
                        ValueKind::of(arg)
                    ),
                });
            }
        }

        let result = function.call(args)?;
        if !decl.result.matches(&result) {
            return Err(BridgeError::InvalidResult {
                function: name.to_string(),
                expected: decl.result,
                found: ValueKind::of(&result),
            });
        }
        Ok(result)
    }
}
