// Rego Adapter
//
// Runs queries with `regorus`. Every host function in the registry is
// installed as an engine extension; a failure inside one is kept and
// reported as the query's error, whatever the engine does with it.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use super::{EngineError, QueryResult, ResultSet, RuleEngine};
use crate::bridge::{BridgeError, FunctionRegistry};
use crate::rules::RuleModule;

/// Stateless engine; a fresh `regorus::Engine` is built per query.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegoEngine;

impl RegoEngine {
    pub fn new() -> Self {
        Self
    }
}

type FailureSlot = Arc<Mutex<Option<BridgeError>>>;

fn to_rego(value: &Value) -> anyhow::Result<regorus::Value> {
    regorus::Value::from_json_str(&value.to_string())
}

fn from_rego(value: &regorus::Value) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn install_functions(
    engine: &mut regorus::Engine,
    functions: &FunctionRegistry,
    failure: &FailureSlot,
) -> anyhow::Result<()> {
    for decl in functions.decls() {
        let name = decl.name;
        let nargs = u8::try_from(decl.args.len())?;
        let registry = functions.clone();
        let failure = failure.clone();

        engine.add_extension(
            name.to_string(),
            nargs,
            Box::new(move |args: Vec<regorus::Value>| -> anyhow::Result<regorus::Value> {
                let args = args.iter().map(from_rego).collect::<anyhow::Result<Vec<_>>>()?;
                match registry.call(name, &args) {
                    Ok(value) => to_rego(&value),
                    Err(err) => {
                        let message = err.to_string();
                        if let Ok(mut slot) = failure.lock() {
                            slot.get_or_insert(err);
                        }
                        Err(anyhow::anyhow!(message))
                    }
                }
            }),
        )?;
    }
    Ok(())
}

impl RuleEngine for RegoEngine {
    fn evaluate(
        &self,
        query: &str,
        modules: &[RuleModule],
        store: &Value,
        input: &Value,
        functions: &FunctionRegistry,
    ) -> Result<ResultSet, EngineError> {
        let evaluation_error = |err: anyhow::Error| EngineError::RuleEvaluation {
            query: query.to_string(),
            message: err.to_string(),
        };

        let mut engine = regorus::Engine::new();
        for module in modules {
            engine
                .add_policy(module.path.display().to_string(), module.source.clone())
                .map_err(|err| EngineError::Module {
                    path: module.path.display().to_string(),
                    message: err.to_string(),
                })?;
        }
        if store.as_object().is_some_and(|data| !data.is_empty()) {
            engine.add_data(to_rego(store).map_err(evaluation_error)?).map_err(evaluation_error)?;
        }
        engine.set_input(to_rego(input).map_err(evaluation_error)?);

        let failure = FailureSlot::default();
        install_functions(&mut engine, functions, &failure).map_err(evaluation_error)?;

        debug!(query = %query, modules = modules.len(), "evaluating query");
        let outcome = engine.eval_query(query.to_string(), false);

        if let Some(source) = failure.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(EngineError::HostFunction {
                query: query.to_string(),
                source,
            });
        }
        let results = outcome.map_err(evaluation_error)?;

        let mut set = ResultSet::default();
        for result in &results.result {
            let expressions = result
                .expressions
                .iter()
                .filter(|expr| expr.value != regorus::Value::Undefined)
                .map(|expr| from_rego(&expr.value))
                .collect::<anyhow::Result<Vec<_>>>()
                .map_err(evaluation_error)?;
            set.results.push(QueryResult { expressions });
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::FunctionBridge;
    use crate::tree::source::InMemorySource;
    use crate::tree::testing::two_instances;
    use serde_json::json;
    use std::path::PathBuf;

    const POLICY: &str = r#"package tflint

import rego.v1

deny_t2_nano contains msg if {
	some r in terraform.resources("aws_instance", {"instance_type": "t2.micro"})
	r.config.instance_type == "t2.nano"
	msg := concat(" ", [r.labels[1], "uses t2.nano"])
}

allow_owner if input.user == "alice"
"#;

    const BAD_CALL_POLICY: &str = r#"package tflint

import rego.v1

deny_empty_type contains msg if {
	some r in terraform.resources("", {})
	msg := r.config.instance_type
}
"#;

    fn module() -> RuleModule {
        RuleModule::parse(PathBuf::from("policies/main.rego"), POLICY.to_string()).unwrap()
    }

    fn functions() -> FunctionRegistry {
        let mut registry = FunctionRegistry::new();
        registry.register(FunctionBridge::new(Arc::new(InMemorySource::new(
            two_instances(),
        ))));
        registry
    }

    #[test]
    fn bridge_data_reaches_rules() {
        let rs = RegoEngine::new()
            .evaluate(
                "data.tflint.deny_t2_nano",
                &[module()],
                &json!({}),
                &json!({}),
                &functions(),
            )
            .unwrap();

        assert_eq!(rs.first_value(), Some(&json!(["bar uses t2.nano"])));
    }

    #[test]
    fn input_bindings_are_visible() {
        let rs = RegoEngine::new()
            .evaluate(
                "data.tflint.allow_owner",
                &[module()],
                &json!({}),
                &json!({"user": "alice"}),
                &functions(),
            )
            .unwrap();

        assert_eq!(rs.first_value(), Some(&json!(true)));
    }

    #[test]
    fn host_function_failure_fails_the_query() {
        let err = RegoEngine::new()
            .evaluate(
                "data.tflint.deny_empty_type",
                &[RuleModule::parse(PathBuf::from("bad.rego"), BAD_CALL_POLICY.to_string()).unwrap()],
                &json!({}),
                &json!({}),
                &functions(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::HostFunction {
                source: BridgeError::InvalidArgument { .. },
                ..
            }
        ));
    }
}
