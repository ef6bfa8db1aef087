// Rule Module Loading
//
// Discovers Rego modules and JSON data documents under the given paths.
// Modules are parsed by the Rego engine; package and rule names come from
// the parsed module so the dispatcher can select rules.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

/// Errors produced while loading rule modules.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("reading `{path}` failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule module `{path}` failed to load: {message}")]
    RuleLoad { path: PathBuf, message: String },

    #[error("data document `{path}` rejected: {message}")]
    Data { path: PathBuf, message: String },
}

/// A parsed rule module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleModule {
    pub path: PathBuf,
    pub package: String,
    pub source: String,
    /// Top-level rule names in declaration order, without duplicates.
    pub rules: Vec<String>,
}

impl RuleModule {
    /// Validate `source` and extract its package and rule names from
    /// the parsed module.
    pub fn parse(path: PathBuf, source: String) -> Result<Self, LoadError> {
        let rule_load = |message: String| LoadError::RuleLoad {
            path: path.clone(),
            message,
        };

        let mut engine = regorus::Engine::new();
        let package = engine
            .add_policy(path.display().to_string(), source.clone())
            .map_err(|err| rule_load(err.to_string()))?;
        let package = package
            .strip_prefix("data.")
            .unwrap_or(&package)
            .to_string();

        let ast = engine
            .get_ast_as_json()
            .map_err(|err| rule_load(err.to_string()))?;
        let ast: Value = serde_json::from_str(&ast).map_err(|err| rule_load(err.to_string()))?;
        let rules = rule_names(&ast[0]["ast"]["rules"]).map_err(rule_load)?;

        Ok(Self {
            path,
            package,
            source,
            rules,
        })
    }

    /// Fully-qualified query addressing `rule` in this module.
    pub fn query(&self, rule: &str) -> String {
        format!("data.{}.{}", self.package, rule)
    }
}

/// Everything loaded from the policy paths.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModules {
    pub modules: Vec<RuleModule>,
    /// Merged JSON data documents, exposed to rules under `data`.
    pub store: Value,
}

impl Default for LoadedModules {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            store: Value::Object(Default::default()),
        }
    }
}

/// Loads `.rego` modules and `.json` data documents.
#[derive(Debug, Clone, Default)]
pub struct RuleModuleLoader {
    loaded: LoadedModules,
}

impl RuleModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every path. Directories are walked recursively in name
    /// order; dotfiles are skipped.
    pub fn load<P: AsRef<Path>>(mut self, paths: &[P]) -> Result<LoadedModules, LoadError> {
        for path in paths {
            self.load_path(path.as_ref())?;
        }
        info!(
            modules = self.loaded.modules.len(),
            "rule modules loaded"
        );
        Ok(self.loaded)
    }

    fn load_path(&mut self, path: &Path) -> Result<(), LoadError> {
        let io_error = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };

        if path.is_dir() {
            let mut entries = fs::read_dir(path)
                .map_err(io_error)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(io_error)?;
            entries.sort();

            for entry in entries {
                let hidden = entry
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
                if hidden {
                    debug!(path = %entry.display(), "skipping dotfile");
                    continue;
                }
                if entry.is_dir() || has_extension(&entry, "rego") || has_extension(&entry, "json") {
                    self.load_path(&entry)?;
                }
            }
            return Ok(());
        }

        let source = fs::read_to_string(path).map_err(io_error)?;
        if has_extension(path, "json") {
            let document: Value = serde_json::from_str(&source).map_err(|err| LoadError::Data {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            merge(&mut self.loaded.store, document).map_err(|message| LoadError::Data {
                path: path.to_path_buf(),
                message,
            })?;
            debug!(path = %path.display(), "loaded data document");
        } else {
            let module = RuleModule::parse(path.to_path_buf(), source)?;
            debug!(path = %path.display(), package = %module.package, rules = module.rules.len(), "loaded rule module");
            self.loaded.modules.push(module);
        }
        Ok(())
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

/// Deep-merge `document` into `store`. Objects merge key by key;
/// anything else must not already be present.
fn merge(store: &mut Value, document: Value) -> Result<(), String> {
    match (store, document) {
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                match into.get_mut(&key) {
                    Some(existing) => {
                        merge(existing, value).map_err(|e| format!("{key}.{e}"))?
                    }
                    None => {
                        into.insert(key, value);
                    }
                }
            }
            Ok(())
        }
        _ => Err("conflicting values".into()),
    }
}

/// Reference a rule head defines: `{"Spec": {"head": {<kind>: {"refr"}}}}`
/// or `{"Default": {"refr"}}`.
fn head_ref(rule: &Value) -> Option<&Value> {
    if let Some(default) = rule.get("Default") {
        return default.get("refr");
    }
    rule.get("Spec")?
        .get("head")?
        .as_object()?
        .values()
        .next()?
        .get("refr")
}

/// Leading variable of a reference (`deny_x` in `deny_x.y[z]`).
fn root_var(expr: &Value) -> Option<&str> {
    if let Some(var) = expr.get("Var") {
        return var.get(1)?.as_str();
    }
    let inner = expr.get("RefDot").or_else(|| expr.get("RefBrack"))?;
    root_var(inner.get("refr")?)
}

/// Names of top-level rules in declaration order, without duplicates.
fn rule_names(rules: &Value) -> Result<Vec<String>, String> {
    let rules = rules
        .as_array()
        .ok_or_else(|| "parsed module has no rule list".to_string())?;

    let mut names: Vec<String> = Vec::new();
    for (index, rule) in rules.iter().enumerate() {
        let name = head_ref(rule)
            .and_then(root_var)
            .ok_or_else(|| format!("rule #{} has an unrecognized head", index + 1))?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    Ok(names)
}
