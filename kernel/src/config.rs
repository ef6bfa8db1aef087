// Dispatch Configuration
//
// Settings threaded through a dispatch run: which rules are selected,
// the input document every rule sees, and how failures are handled.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dispatch configuration loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Only rules whose name starts with this prefix are evaluated.
    pub rule_prefix: String,

    /// Input document bound to `input` in every rule.
    pub input: Value,

    /// Abort the run on the first failed rule instead of recording it.
    pub fail_fast: bool,

    /// Per-rule time budget in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl DispatchConfig {
    /// Default built-in configuration (used if no config is provided).
    pub fn default_config() -> Self {
        Self {
            rule_prefix: "deny_".into(),
            input: Value::Object(Default::default()),
            fail_fast: false,
            timeout_ms: None,
        }
    }

    /// Deadline for a rule started at `started`.
    pub fn deadline(&self, started: Instant) -> Option<Instant> {
        self.timeout_ms
            .map(|ms| started + Duration::from_millis(ms))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DispatchConfig =
            serde_json::from_value(json!({"input": {"user": "alice"}, "fail_fast": true})).unwrap();

        assert_eq!(config.rule_prefix, "deny_");
        assert_eq!(config.input, json!({"user": "alice"}));
        assert!(config.fail_fast);
        assert!(config.timeout_ms.is_none());
    }

    #[test]
    fn deadline_follows_timeout() {
        let now = Instant::now();
        assert!(DispatchConfig::default_config().deadline(now).is_none());

        let config = DispatchConfig {
            timeout_ms: Some(250),
            ..DispatchConfig::default_config()
        };
        assert_eq!(config.deadline(now), Some(now + Duration::from_millis(250)));
    }
}
