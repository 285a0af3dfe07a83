use durable_worker_types::OrchestratorAction;

/// Raised from `executionStarted` when the orchestration history names a
/// function this worker never registered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("A '{0}' orchestrator was not registered.")]
pub struct OrchestratorNotRegistered(pub String);

/// Raised when [`crate::executor::OrchestrationExecutor::execute`] is asked
/// to replay an empty new-history batch, or encounters a history event shape
/// the executor has no handling for.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OrchestrationStateError {
    #[error("The new history event list must have at least one event in it.")]
    EmptyNewHistory,

    #[error("Don't know how to handle event of type '{0}'")]
    UnhandledEvent(&'static str),
}

/// Raised when a history acknowledgement event (`timerCreated`,
/// `taskScheduled`, `subOrchestrationInstanceCreated`) does not match what
/// the current (replayed) run of the orchestrator actually recorded.
///
/// Message text matches the source's three builder functions verbatim,
/// since downstream tooling and dashboards are assumed to grep for this
/// phrasing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NonDeterminismError {
    #[error(
        "A previous execution called {action_name} with ID={task_id}, but the current \
execution doesn't have this action with this ID. This problem occurs when either \
the orchestration has non-deterministic logic or if the code was changed after an \
instance of this orchestration already started running."
    )]
    MissingAction { task_id: i32, action_name: String },

    #[error(
        "Failed to restore orchestration state due to a history mismatch: A previous execution called \
{expected_method_name} with ID={task_id}, but the current execution is instead trying to call \
{unexpected_method_name} as part of rebuilding it's history. This kind of mismatch can happen if an \
orchestration has non-deterministic logic or if the code was changed after an instance of this \
orchestration already started running."
    )]
    WrongActionType {
        task_id: i32,
        expected_method_name: String,
        unexpected_method_name: String,
    },

    #[error(
        "Failed to restore orchestration state due to a history mismatch: A previous execution called \
{method_name} with name='{expected_task_name}' and sequence number {task_id}, but the current \
execution is instead trying to call {actual_task_name} as part of rebuilding it's history. \
This kind of mismatch can happen if an orchestration has non-deterministic logic or if the code \
was changed after an instance of this orchestration already started running."
    )]
    WrongActionName {
        task_id: i32,
        method_name: String,
        expected_task_name: String,
        actual_task_name: String,
    },
}

impl NonDeterminismError {
    pub fn missing_action(task_id: i32, action_name: &str) -> Self {
        Self::MissingAction {
            task_id,
            action_name: action_name.to_string(),
        }
    }

    pub fn wrong_action_type(task_id: i32, expected_method_name: &str, action: &OrchestratorAction) -> Self {
        Self::WrongActionType {
            task_id,
            expected_method_name: expected_method_name.to_string(),
            unexpected_method_name: action.name().to_string(),
        }
    }

    pub fn wrong_action_name(
        task_id: i32,
        method_name: &str,
        expected_task_name: &str,
        actual_task_name: &str,
    ) -> Self {
        Self::WrongActionName {
            task_id,
            method_name: method_name.to_string(),
            expected_task_name: expected_task_name.to_string(),
            actual_task_name: actual_task_name.to_string(),
        }
    }
}

/// Any error that can escape [`crate::executor::OrchestrationExecutor::execute`]
/// before it gets funneled into `ctx.set_failed` (§4.D step 4). Distinct from
/// `OrchestrationStateError`/`NonDeterminismError`/`OrchestratorNotRegistered`
/// only in that it unifies them for the one `?`-propagating call site.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    OrchestratorNotRegistered(#[from] OrchestratorNotRegistered),
    #[error(transparent)]
    OrchestrationState(#[from] OrchestrationStateError),
    #[error(transparent)]
    NonDeterminism(#[from] NonDeterminismError),
}

impl ExecutionError {
    /// A stable tag for the `errorType` field of the `FailureDetails` an
    /// orchestration completes with when this error escapes `process_event`.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::OrchestratorNotRegistered(_) => "OrchestratorNotRegisteredError",
            Self::OrchestrationState(_) => "OrchestrationStateError",
            Self::NonDeterminism(_) => "NonDeterminismError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use durable_worker_types::OrchestrationStatus;

    #[test]
    fn missing_action_message_names_the_task_id_and_action() {
        let err = NonDeterminismError::missing_action(3, "createTimer");
        assert!(err.to_string().contains("ID=3"));
        assert!(err.to_string().contains("createTimer"));
    }

    #[test]
    fn wrong_action_type_message_names_both_method_names() {
        let action = OrchestratorAction::ScheduleTask {
            id: 2,
            name: "DoThing".to_string(),
            input: None,
        };
        let err = NonDeterminismError::wrong_action_type(2, "createTimer", &action);
        let message = err.to_string();
        assert!(message.contains("createTimer"));
        assert!(message.contains("scheduleTask"));
    }

    #[test]
    fn wrong_action_name_message_names_expected_and_actual() {
        let err = NonDeterminismError::wrong_action_name(5, "callActivity", "SayHello", "SayGoodbye");
        let message = err.to_string();
        assert!(message.contains("SayHello"));
        assert!(message.contains("SayGoodbye"));
    }

    #[test]
    fn orchestrator_not_registered_names_the_orchestrator() {
        let err = OrchestratorNotRegistered("Missing".to_string());
        assert_eq!(
            err.to_string(),
            "A 'Missing' orchestrator was not registered."
        );
    }

    #[test]
    fn completion_status_round_trips_through_display() {
        assert_eq!(OrchestrationStatus::Failed.to_string(), "FAILED");
    }
}
