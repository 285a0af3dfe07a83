//! Conversions between the generated [`crate::proto`] types and
//! `durable-worker-types`'s domain model.
//!
//! Free functions rather than `From`/`TryFrom` impls: Rust's orphan rules
//! forbid implementing a foreign trait (`From`) for two foreign types
//! (`crate::proto::HistoryEvent` from this crate and
//! `durable_worker_types::HistoryEvent` from another) when neither is local.

use chrono::{DateTime, Utc};
use durable_worker_types::{FailureDetails, HistoryEvent, OrchestrationStatus, OrchestratorAction};

use crate::proto;

/// Raised when a message's `oneof` field is absent — the wire contract
/// requires every `HistoryEvent`/`OrchestratorAction` to carry exactly one
/// variant, so an empty oneof means the sidecar and this worker have drifted
/// out of sync on the protocol version.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{0} message is missing its oneof variant")]
    MissingOneof(&'static str),
}

pub fn timestamp_to_proto(dt: DateTime<Utc>) -> proto::Timestamp {
    proto::Timestamp { rfc3339: dt.to_rfc3339() }
}

pub fn timestamp_from_proto(ts: &proto::Timestamp) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&ts.rfc3339)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

pub fn failure_details_to_proto(details: &FailureDetails) -> proto::FailureDetails {
    proto::FailureDetails {
        error_type: details.error_type.clone(),
        error_message: details.error_message.clone(),
        stack_trace: details.stack_trace.clone(),
    }
}

pub fn failure_details_from_proto(details: &proto::FailureDetails) -> FailureDetails {
    let mut result = FailureDetails::new(details.error_type.clone(), details.error_message.clone());
    if let Some(stack_trace) = &details.stack_trace {
        result = result.with_stack_trace(stack_trace.clone());
    }
    result
}

pub fn orchestration_status_to_proto(status: OrchestrationStatus) -> i32 {
    let proto_status = match status {
        OrchestrationStatus::Running => proto::OrchestrationStatus::Running,
        OrchestrationStatus::Completed => proto::OrchestrationStatus::Completed,
        OrchestrationStatus::Failed => proto::OrchestrationStatus::Failed,
        OrchestrationStatus::Terminated => proto::OrchestrationStatus::Terminated,
        OrchestrationStatus::ContinuedAsNew => proto::OrchestrationStatus::ContinuedAsNew,
    };
    proto_status as i32
}

pub fn history_event_from_proto(event: &proto::HistoryEvent) -> Result<HistoryEvent, ConversionError> {
    use proto::history_event::EventType;
    let event_type = event
        .event_type
        .as_ref()
        .ok_or(ConversionError::MissingOneof("HistoryEvent"))?;

    Ok(match event_type {
        EventType::OrchestratorStarted(e) => HistoryEvent::OrchestratorStarted {
            timestamp: e.timestamp.as_ref().map(timestamp_from_proto).unwrap_or_default(),
        },
        EventType::ExecutionStarted(e) => HistoryEvent::ExecutionStarted {
            name: e.name.clone(),
            input: e.input.clone(),
        },
        EventType::TimerCreated(e) => HistoryEvent::TimerCreated { event_id: e.event_id },
        EventType::TimerFired(e) => HistoryEvent::TimerFired { timer_id: e.timer_id },
        EventType::TaskScheduled(e) => HistoryEvent::TaskScheduled {
            event_id: e.event_id,
            name: e.name.clone(),
        },
        EventType::TaskCompleted(e) => HistoryEvent::TaskCompleted {
            task_scheduled_id: e.task_scheduled_id,
            result: e.result.clone(),
        },
        EventType::TaskFailed(e) => HistoryEvent::TaskFailed {
            task_scheduled_id: e.task_scheduled_id,
            failure_details: e
                .failure_details
                .as_ref()
                .map(failure_details_from_proto)
                .unwrap_or_else(|| FailureDetails::new("Unknown", "missing failure details on the wire")),
        },
        EventType::SubOrchestrationInstanceCreated(e) => HistoryEvent::SubOrchestrationInstanceCreated {
            event_id: e.event_id,
            name: e.name.clone(),
            instance_id: e.instance_id.clone(),
        },
        EventType::SubOrchestrationInstanceCompleted(e) => HistoryEvent::SubOrchestrationInstanceCompleted {
            task_scheduled_id: e.task_scheduled_id,
            result: e.result.clone(),
        },
        EventType::SubOrchestrationInstanceFailed(e) => HistoryEvent::SubOrchestrationInstanceFailed {
            task_scheduled_id: e.task_scheduled_id,
            failure_details: e
                .failure_details
                .as_ref()
                .map(failure_details_from_proto)
                .unwrap_or_else(|| FailureDetails::new("Unknown", "missing failure details on the wire")),
        },
        EventType::EventRaised(e) => HistoryEvent::EventRaised {
            name: e.name.clone(),
            input: e.input.clone(),
        },
        EventType::ExecutionSuspended(_) => HistoryEvent::ExecutionSuspended,
        EventType::ExecutionResumed(_) => HistoryEvent::ExecutionResumed,
        EventType::ExecutionTerminated(e) => HistoryEvent::ExecutionTerminated { input: e.input.clone() },
    })
}

pub fn orchestrator_action_to_proto(action: &OrchestratorAction) -> proto::OrchestratorAction {
    use proto::orchestrator_action::ActionType;

    let action_type = match action {
        OrchestratorAction::CreateTimer { id, fire_at } => ActionType::CreateTimer(proto::CreateTimerAction {
            id: *id,
            fire_at: Some(timestamp_to_proto(*fire_at)),
        }),
        OrchestratorAction::ScheduleTask { id, name, input } => {
            ActionType::ScheduleTask(proto::ScheduleTaskAction {
                id: *id,
                name: name.clone(),
                input: input.clone(),
            })
        }
        OrchestratorAction::CreateSubOrchestration { id, name, instance_id, input } => {
            ActionType::CreateSubOrchestration(proto::CreateSubOrchestrationAction {
                id: *id,
                name: name.clone(),
                instance_id: instance_id.clone(),
                input: input.clone(),
            })
        }
        OrchestratorAction::CompleteOrchestration { id, status, result, failure_details } => {
            ActionType::CompleteOrchestration(proto::CompleteOrchestrationAction {
                id: *id,
                status: orchestration_status_to_proto(*status),
                result: result.clone(),
                failure_details: failure_details.as_ref().map(failure_details_to_proto),
            })
        }
    };
    proto::OrchestratorAction { action_type: Some(action_type) }
}
