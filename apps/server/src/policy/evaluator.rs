//! Rego policy evaluation.

use super::PolicyError;
use regorus::{Engine, Value};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Mutex;

/// Evaluates the authorization decision for one input document.
pub trait PolicyEvaluator: Send + Sync {
    /// `Ok(true)` allowed, `Ok(false)` denied; errors are infrastructure failures.
    fn evaluate(&self, input: &JsonValue) -> Result<bool, PolicyError>;
}

/// Evaluates `data.<package>.allow` of a policy compiled once at startup.
pub struct RegoEvaluator {
    engine: Mutex<Engine>,
    query: String,
}

impl RegoEvaluator {
    pub fn new(package: &str, name: &str, source: &str) -> Result<Self, PolicyError> {
        let mut engine = Engine::new();
        engine
            .add_policy(name.to_string(), source.to_string())
            .map_err(|e| PolicyError::PolicyLoad {
                path: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            engine: Mutex::new(engine),
            query: format!("data.{package}.allow"),
        })
    }

    pub fn from_file(package: &str, path: &Path) -> Result<Self, PolicyError> {
        let source = std::fs::read_to_string(path).map_err(|e| PolicyError::PolicyLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::new(package, &path.display().to_string(), &source)
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl PolicyEvaluator for RegoEvaluator {
    fn evaluate(&self, input: &JsonValue) -> Result<bool, PolicyError> {
        // Each evaluation gets its own copy so no state leaks between inputs.
        let mut engine = self
            .engine
            .lock()
            .map_err(|_| PolicyError::Evaluation("policy engine lock poisoned".to_string()))?
            .clone();

        let input = Value::from_json_str(&input.to_string())
            .map_err(|e| PolicyError::Evaluation(format!("invalid input: {e}")))?;
        engine.set_input(input);

        let results = engine
            .eval_query(self.query.clone(), false)
            .map_err(|e| PolicyError::Evaluation(e.to_string()))?;

        let value = results
            .result
            .first()
            .and_then(|r| r.expressions.first())
            .map(|e| &e.value);

        match value {
            None | Some(Value::Undefined) => Err(PolicyError::MissingBinding(self.query.clone())),
            Some(Value::Bool(allowed)) => Ok(*allowed),
            Some(other) => Err(PolicyError::InvalidBinding {
                query: self.query.clone(),
                found: kind(other),
            }),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Set(_) => "set",
        Value::Object(_) => "object",
        _ => "non-boolean value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluates_input() {
        let evaluator = RegoEvaluator::new(
            "carelink",
            "test.rego",
            r#"
package carelink

default allow := false

allow {
    input.method == "GET"
}
"#,
        )
        .unwrap();

        assert!(evaluator.evaluate(&json!({"method": "GET"})).unwrap());
        assert!(!evaluator.evaluate(&json!({"method": "DELETE"})).unwrap());
        // Previous input must not influence the next evaluation.
        assert!(evaluator.evaluate(&json!({"method": "GET"})).unwrap());
    }

    #[test]
    fn non_boolean_binding() {
        let evaluator =
            RegoEvaluator::new("carelink", "test.rego", "package carelink\n\nallow := \"yes\"\n")
                .unwrap();
        assert!(matches!(
            evaluator.evaluate(&json!({})),
            Err(PolicyError::InvalidBinding { found: "string", .. })
        ));
    }

    #[test]
    fn syntax_error_fails_to_load() {
        let result = RegoEvaluator::new("carelink", "broken.rego", "package carelink\n\nallow := {{");
        assert!(matches!(result, Err(PolicyError::PolicyLoad { .. })));
    }
}
