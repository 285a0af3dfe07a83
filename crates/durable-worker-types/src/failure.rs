use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured description of a failure that crossed an execution boundary —
/// an activity that raised, an orchestrator that raised, or a sub-orchestration
/// that failed. Carried over the wire verbatim so the sidecar and any waiting
/// parent orchestration can render it without re-parsing a stack trace string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetails {
    pub error_type: String,
    pub error_message: String,
    pub stack_trace: Option<String>,
}

impl FailureDetails {
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
            stack_trace: None,
        }
    }

    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }
}

impl fmt::Display for FailureDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.error_message)
    }
}
