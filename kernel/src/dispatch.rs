// Rule Dispatch
//
// Runs every convention-named rule against the configuration:
// modules → rule selection → per-rule query (bridge registered) → report
//
// Rules are evaluated one at a time in discovery order.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::{FunctionBridge, FunctionRegistry};
use crate::config::DispatchConfig;
use crate::engine::{EngineError, ResultSet, RuleEngine};
use crate::rules::{LoadedModules, RuleModule};
use crate::tree::source::ConfigTreeSource;

/// A rule chosen for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRule {
    pub package: String,
    pub rule: String,
    pub query: String,
}

/// Rules whose name starts with `prefix`, in discovery order.
pub fn select_rules(modules: &[RuleModule], prefix: &str) -> Vec<SelectedRule> {
    let mut selected: Vec<SelectedRule> = Vec::new();

    for module in modules {
        for rule in module.rules.iter().filter(|r| r.starts_with(prefix)) {
            let query = module.query(rule);
            if selected.iter().any(|s| s.query == query) {
                continue;
            }
            selected.push(SelectedRule {
                package: module.package.clone(),
                rule: rule.clone(),
                query,
            });
        }
    }

    selected
}

/// What happened to one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleOutcome {
    Evaluated { findings: Vec<Value> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleReport {
    pub rule: String,
    pub query: String,
    #[serde(flatten)]
    pub outcome: RuleOutcome,
}

/// Result of a full dispatch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub run_id: Uuid,
    pub rules: Vec<RuleReport>,
}

impl DispatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &RuleReport> {
        self.rules
            .iter()
            .filter(|r| matches!(r.outcome, RuleOutcome::Failed { .. }))
    }

    pub fn total_findings(&self) -> usize {
        self.rules
            .iter()
            .map(|r| match &r.outcome {
                RuleOutcome::Evaluated { findings } => findings.len(),
                RuleOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// No findings and no failed rules.
    pub fn is_clean(&self) -> bool {
        self.total_findings() == 0 && self.failed().next().is_none()
    }
}

/// Errors that abort a dispatch run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("rule `{rule}` failed: {source}")]
    Rule {
        rule: String,
        #[source]
        source: EngineError,
    },
}

/// Findings are the elements of the first result's value.
fn findings(query: &str, results: &ResultSet) -> Result<Vec<Value>, EngineError> {
    match results.first_value() {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(EngineError::UnexpectedResult {
            query: query.to_string(),
            found: match other {
                Value::Null => "null",
                Value::Bool(_) => "a bool",
                Value::Number(_) => "a number",
                Value::String(_) => "a string",
                Value::Object(_) => "an object",
                Value::Array(_) => "an array",
            },
        }),
    }
}

/// Evaluate one rule with a fresh bridge.
pub fn evaluate_rule<E: RuleEngine + ?Sized>(
    selected: &SelectedRule,
    loaded: &LoadedModules,
    engine: &E,
    source: Arc<dyn ConfigTreeSource>,
    config: &DispatchConfig,
) -> Result<Vec<Value>, EngineError> {
    let mut functions = FunctionRegistry::new();
    functions.register(FunctionBridge::new(source).with_deadline(config.deadline(Instant::now())));

    let results = engine.evaluate(
        &selected.query,
        &loaded.modules,
        &loaded.store,
        &config.input,
        &functions,
    )?;
    findings(&selected.query, &results)
}

/// Run every selected rule.
///
/// A failed rule is recorded and the run continues, unless
/// `config.fail_fast` is set.
pub fn run_dispatch<E: RuleEngine + ?Sized>(
    loaded: &LoadedModules,
    engine: &E,
    source: Arc<dyn ConfigTreeSource>,
    config: &DispatchConfig,
) -> Result<DispatchReport, DispatchError> {
    let run_id = Uuid::new_v4();
    let selected = select_rules(&loaded.modules, &config.rule_prefix);
    info!(%run_id, rules = selected.len(), prefix = %config.rule_prefix, "dispatch started");

    let mut rules = Vec::with_capacity(selected.len());
    for rule in &selected {
        info!(%run_id, rule = %rule.rule, query = %rule.query, "evaluating rule");

        let outcome = match evaluate_rule(rule, loaded, engine, source.clone(), config) {
            Ok(findings) => {
                info!(%run_id, rule = %rule.rule, findings = findings.len(), "rule evaluated");
                RuleOutcome::Evaluated { findings }
            }
            Err(source) if config.fail_fast => {
                return Err(DispatchError::Rule {
                    rule: rule.rule.clone(),
                    source,
                })
            }
            Err(err) => {
                warn!(%run_id, rule = %rule.rule, error = %err, "rule failed");
                RuleOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        rules.push(RuleReport {
            rule: rule.rule.clone(),
            query: rule.query.clone(),
            outcome,
        });
    }

    Ok(DispatchReport { run_id, rules })
}
