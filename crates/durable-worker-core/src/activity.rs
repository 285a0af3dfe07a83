use durable_worker_types::FailureDetails;
use serde_json::Value;
use std::sync::Arc;

use crate::registry::Registry;

/// Raised by [`ActivityExecutor::execute`] when the target activity has not
/// been registered, or when the activity function itself returns an error.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Activity function named '{0}' was not registered!")]
    NotRegistered(String),
    #[error("{0}")]
    UserError(FailureDetails),
}

/// Identifies the call site of an activity invocation: which orchestration
/// scheduled it, what it's called, and the sequence id it was scheduled
/// under. Activities are plain functions of their input in this runtime —
/// this context exists so activity bodies can log with the same identifiers
/// the worker uses, not to give them back-channel access to orchestration
/// state (that would break the single-responsibility boundary in §5).
pub struct ActivityContext {
    pub orchestration_id: String,
    pub name: String,
    pub task_id: i32,
}

/// Looks up and runs a single activity invocation.
///
/// Deliberately stateless beyond the shared [`Registry`] — a fresh
/// `ActivityExecutor` is constructed per work item, same as
/// [`crate::executor::OrchestrationExecutor`].
pub struct ActivityExecutor {
    registry: Arc<Registry>,
}

impl ActivityExecutor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Decodes `encoded_input` if present, invokes the registered activity,
    /// and JSON-encodes a non-`None` output. `None` in, `None` out never
    /// touches the wire as the literal string `"null"`.
    pub fn execute(
        &self,
        orchestration_id: &str,
        name: &str,
        task_id: i32,
        encoded_input: Option<&str>,
    ) -> Result<Option<String>, ActivityError> {
        tracing::debug!(orchestration_id, task_id, name, "executing activity");
        let f = self
            .registry
            .get_activity(name)
            .ok_or_else(|| ActivityError::NotRegistered(name.to_string()))?;

        let input: Option<Value> = match encoded_input {
            Some(raw) if !raw.is_empty() => Some(
                serde_json::from_str(raw)
                    .unwrap_or_else(|_| Value::String(raw.to_string())),
            ),
            _ => None,
        };

        let ctx = ActivityContext {
            orchestration_id: orchestration_id.to_string(),
            name: name.to_string(),
            task_id,
        };
        let output = f(&ctx, input).map_err(|err| match err {
            ActivityError::NotRegistered(n) => ActivityError::NotRegistered(n),
            ActivityError::UserError(detail) => ActivityError::UserError(detail),
        })?;

        let encoded_output = output.map(|value| serde_json::to_string(&value).unwrap_or_default());
        tracing::debug!(
            orchestration_id,
            task_id,
            chars = encoded_output.as_ref().map(String::len).unwrap_or(0),
            "activity completed successfully"
        );
        Ok(encoded_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ActivityFn;

    fn registry_with(name: &str, f: ActivityFn) -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.add_activity(name, f).unwrap();
        Arc::new(registry)
    }

    #[test]
    fn execute_fails_when_activity_not_registered() {
        let executor = ActivityExecutor::new(Arc::new(Registry::new()));
        let result = executor.execute("inst-1", "Missing", 1, None);
        assert!(matches!(result, Err(ActivityError::NotRegistered(_))));
    }

    #[test]
    fn execute_decodes_input_and_encodes_output() {
        let registry = registry_with(
            "Double",
            Arc::new(|_ctx, input: Option<Value>| {
                let n = input.and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(Some(Value::from(n * 2)))
            }),
        );
        let executor = ActivityExecutor::new(registry);
        let result = executor.execute("inst-1", "Double", 1, Some("21")).unwrap();
        assert_eq!(result, Some("42".to_string()));
    }

    #[test]
    fn execute_passes_through_none_input_and_output() {
        let registry = registry_with("Ping", Arc::new(|_ctx, _input| Ok(None)));
        let executor = ActivityExecutor::new(registry);
        let result = executor.execute("inst-1", "Ping", 1, None).unwrap();
        assert_eq!(result, None);
    }
}
