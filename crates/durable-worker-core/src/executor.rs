use durable_worker_types::{FailureDetails, HistoryEvent, OrchestrationStatus, OrchestratorAction};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::context::{BoxOrchestratorFuture, OrchestrationContext};
use crate::registry::Registry;
use crate::taxonomy::{ExecutionError, NonDeterminismError, OrchestrationStateError, OrchestratorNotRegistered};

/// Replays an orchestration's history against its registered function and
/// returns the batch of actions the new events produced.
///
/// One executor is constructed per work item (see `durable-worker-runtime`);
/// it owns the in-flight orchestrator future for the lifetime of a single
/// `execute()` call and is discarded afterwards — the orchestrator's only
/// durable state is the history itself.
pub struct OrchestrationExecutor {
    registry: Arc<Registry>,
    in_flight: Option<BoxOrchestratorFuture>,
    is_suspended: bool,
    suspended_events: Vec<HistoryEvent>,
}

impl OrchestrationExecutor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            in_flight: None,
            is_suspended: false,
            suspended_events: Vec::new(),
        }
    }

    /// Rebuilds local orchestrator state by replaying `old_events`, then
    /// drives `new_events` to produce fresh actions, stopping early as soon
    /// as the orchestration completes. `new_events` must be non-empty.
    ///
    /// Any history-consistency error raised while processing an event (an
    /// unregistered orchestrator, a non-determinism mismatch) fails the
    /// orchestration itself rather than escaping to the caller — only the
    /// empty-history precondition below is the caller's mistake to fix.
    pub fn execute(
        &mut self,
        instance_id: &str,
        old_events: &[HistoryEvent],
        new_events: &[HistoryEvent],
    ) -> Result<Vec<OrchestratorAction>, OrchestrationStateError> {
        if new_events.is_empty() {
            return Err(OrchestrationStateError::EmptyNewHistory);
        }

        let ctx = OrchestrationContext::new(instance_id);

        tracing::debug!(instance_id, count = old_events.len(), "rebuilding local state from history");
        ctx.set_is_replaying(true);
        let outcome = self.replay_all(&ctx, old_events).and_then(|()| {
            tracing::debug!(instance_id, count = new_events.len(), "processing new events");
            ctx.set_is_replaying(false);
            for event in new_events {
                self.process_event(&ctx, event)?;
                if ctx.is_complete() {
                    break;
                }
            }
            Ok(())
        });

        if let Err(err) = outcome {
            ctx.set_failed(FailureDetails::new(err.error_type(), err.to_string()));
        }

        if let Some(status) = ctx.completion_status() {
            tracing::info!(instance_id, %status, "orchestration completed");
        }

        let actions = ctx.take_actions();
        tracing::debug!(instance_id, count = actions.len(), "returning actions");
        Ok(actions)
    }

    fn replay_all(&mut self, ctx: &OrchestrationContext, events: &[HistoryEvent]) -> Result<(), ExecutionError> {
        for event in events {
            self.process_event(ctx, event)?;
        }
        Ok(())
    }

    fn process_event(&mut self, ctx: &OrchestrationContext, event: &HistoryEvent) -> Result<(), ExecutionError> {
        if self.is_suspended && event.is_suspendable() {
            self.suspended_events.push(event.clone());
            return Ok(());
        }

        match event {
            HistoryEvent::OrchestratorStarted { timestamp } => {
                ctx.set_current_utc_datetime(*timestamp);
            }

            HistoryEvent::ExecutionStarted { name, input } => {
                let f = self
                    .registry
                    .get_orchestrator(name)
                    .cloned()
                    .ok_or_else(|| OrchestratorNotRegistered(name.clone()))?;
                let decoded_input = decode_optional(input.as_deref());
                let future = f(ctx.clone(), decoded_input);
                self.in_flight = Some(future);
                self.poll_in_flight(ctx);
            }

            HistoryEvent::TimerCreated { event_id } => {
                let action = ctx
                    .pop_pending_action(*event_id)
                    .ok_or_else(|| NonDeterminismError::missing_action(*event_id, "createTimer"))?;
                if !matches!(action, OrchestratorAction::CreateTimer { .. }) {
                    return Err(NonDeterminismError::wrong_action_type(*event_id, "createTimer", &action).into());
                }
            }

            HistoryEvent::TimerFired { timer_id } => {
                let Some(timer_task) = ctx.pop_pending_task(*timer_id) else {
                    if !ctx.is_replaying() {
                        tracing::warn!(timer_id, "ignoring unexpected timerFired event");
                    }
                    return Ok(());
                };
                timer_task.resolve(None);
                self.poll_in_flight(ctx);
            }

            HistoryEvent::TaskScheduled { event_id, name } => {
                let action = ctx
                    .pop_pending_action(*event_id)
                    .ok_or_else(|| NonDeterminismError::missing_action(*event_id, "callActivity"))?;
                match &action {
                    OrchestratorAction::ScheduleTask { name: scheduled_name, .. } => {
                        if scheduled_name != name {
                            return Err(NonDeterminismError::wrong_action_name(
                                *event_id,
                                "callActivity",
                                name,
                                scheduled_name,
                            )
                            .into());
                        }
                    }
                    _ => return Err(NonDeterminismError::wrong_action_type(*event_id, "callActivity", &action).into()),
                }
            }

            HistoryEvent::TaskCompleted { task_scheduled_id, result } => {
                let Some(activity_task) = ctx.pop_pending_task(*task_scheduled_id) else {
                    if !ctx.is_replaying() {
                        tracing::warn!(task_scheduled_id, "ignoring unexpected taskCompleted event");
                    }
                    return Ok(());
                };
                activity_task.resolve(decode_optional(result.as_deref()));
                self.poll_in_flight(ctx);
            }

            HistoryEvent::TaskFailed { task_scheduled_id, failure_details } => {
                let Some(activity_task) = ctx.pop_pending_task(*task_scheduled_id) else {
                    if !ctx.is_replaying() {
                        tracing::warn!(task_scheduled_id, "ignoring unexpected taskFailed event");
                    }
                    return Ok(());
                };
                activity_task.reject(failure_details.clone());
                self.poll_in_flight(ctx);
            }

            HistoryEvent::SubOrchestrationInstanceCreated { event_id, name, instance_id: _ } => {
                let action = ctx
                    .pop_pending_action(*event_id)
                    .ok_or_else(|| NonDeterminismError::missing_action(*event_id, "callSubOrchestrator"))?;
                match &action {
                    OrchestratorAction::CreateSubOrchestration { name: scheduled_name, .. } => {
                        if scheduled_name != name {
                            return Err(NonDeterminismError::wrong_action_name(
                                *event_id,
                                "callSubOrchestrator",
                                name,
                                scheduled_name,
                            )
                            .into());
                        }
                    }
                    _ => {
                        return Err(
                            NonDeterminismError::wrong_action_type(*event_id, "callSubOrchestrator", &action).into(),
                        )
                    }
                }
            }

            HistoryEvent::SubOrchestrationInstanceCompleted { task_scheduled_id, result } => {
                let Some(sub_orch_task) = ctx.pop_pending_task(*task_scheduled_id) else {
                    if !ctx.is_replaying() {
                        tracing::warn!(task_scheduled_id, "ignoring unexpected subOrchestrationInstanceCompleted event");
                    }
                    return Ok(());
                };
                sub_orch_task.resolve(decode_optional(result.as_deref()));
                self.poll_in_flight(ctx);
            }

            HistoryEvent::SubOrchestrationInstanceFailed { task_scheduled_id, failure_details } => {
                let Some(sub_orch_task) = ctx.pop_pending_task(*task_scheduled_id) else {
                    if !ctx.is_replaying() {
                        tracing::warn!(task_scheduled_id, "ignoring unexpected subOrchestrationInstanceFailed event");
                    }
                    return Ok(());
                };
                sub_orch_task.reject(failure_details.clone());
                self.poll_in_flight(ctx);
            }

            HistoryEvent::EventRaised { name, input } => {
                if !ctx.is_replaying() {
                    tracing::info!(name, "event raised");
                }
                if ctx.settle_pending_event(name, input.clone()).is_some() {
                    self.poll_in_flight(ctx);
                } else {
                    ctx.buffer_external_event(name, input.clone());
                    if !ctx.is_replaying() {
                        tracing::info!(name, "event buffered, no waiting task");
                    }
                }
            }

            HistoryEvent::ExecutionSuspended => {
                if !self.is_suspended && !ctx.is_replaying() {
                    tracing::info!("execution suspended");
                }
                self.is_suspended = true;
            }

            HistoryEvent::ExecutionResumed => {
                if !self.is_suspended {
                    return Err(OrchestrationStateError::UnhandledEvent("executionResumed").into());
                }
                if !ctx.is_replaying() {
                    tracing::info!("resuming execution");
                }
                self.is_suspended = false;
                let buffered = std::mem::take(&mut self.suspended_events);
                for buffered_event in buffered {
                    self.process_event(ctx, &buffered_event)?;
                }
            }

            HistoryEvent::ExecutionTerminated { input } => {
                if !ctx.is_replaying() {
                    tracing::info!("execution terminating");
                }
                ctx.set_complete(input.clone().map(Value::String), OrchestrationStatus::Terminated, true);
            }
        }

        Ok(())
    }

    /// Polls the in-flight orchestrator future once. A `Pending` result
    /// means the orchestrator is parked on an un-settled `Task` and simply
    /// leaves `self.in_flight` in place for the next settling event to
    /// resume. A `Ready` result drains the future and reports its outcome
    /// through `ctx.set_complete`/`ctx.set_failed`.
    fn poll_in_flight(&mut self, ctx: &OrchestrationContext) {
        let Some(future) = self.in_flight.as_mut() else {
            return;
        };
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Pin::new(future).poll(&mut cx) {
            Poll::Pending => {}
            Poll::Ready(outcome) => {
                self.in_flight = None;
                match outcome {
                    Ok(value) => ctx.set_complete(value, OrchestrationStatus::Completed, false),
                    Err(failure) => ctx.set_failed(failure),
                }
            }
        }
    }
}

fn decode_optional(raw: Option<&str>) -> Option<Value> {
    match raw {
        Some(s) if !s.is_empty() => Some(serde_json::from_str(s).unwrap_or(Value::String(s.to_string()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn registry_with_completing_orchestrator() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .add_orchestrator(
                "Greet",
                Arc::new(|_ctx, input| {
                    Box::pin(async move {
                        let name = input.and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
                        Ok(Some(Value::String(format!("hello {name}"))))
                    })
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn registry_with_activity_calling_orchestrator() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .add_orchestrator(
                "RunOne",
                Arc::new(|ctx, _input| {
                    Box::pin(async move {
                        let result = ctx.call_activity("DoThing", None).await?;
                        Ok(result)
                    })
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn registry_with_timer_orchestrator() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .add_orchestrator(
                "WaitABit",
                Arc::new(|ctx, _input| {
                    Box::pin(async move {
                        let result = ctx.create_timer(crate::context::TimerFireAt::Delta(chrono::Duration::minutes(5))).await?;
                        Ok(result)
                    })
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn registry_with_external_event_orchestrator() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .add_orchestrator(
                "AwaitApproval",
                Arc::new(|ctx, _input| {
                    Box::pin(async move {
                        ctx.call_activity("Setup", None).await?;
                        let result = ctx.wait_for_external_event("Approval").await?;
                        Ok(result)
                    })
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn execute_rejects_empty_new_history() {
        let mut executor = OrchestrationExecutor::new(registry_with_completing_orchestrator());
        let result = executor.execute("inst-1", &[], &[]);
        assert!(matches!(result, Err(OrchestrationStateError::EmptyNewHistory)));
    }

    #[test]
    fn execute_fails_when_orchestrator_not_registered() {
        let mut executor = OrchestrationExecutor::new(Arc::new(Registry::new()));
        let new_events = vec![HistoryEvent::ExecutionStarted {
            name: "Missing".to_string(),
            input: None,
        }];
        let result = executor.execute("inst-1", &[], &new_events).unwrap();
        assert!(matches!(
            &result[0],
            OrchestratorAction::CompleteOrchestration {
                status: OrchestrationStatus::Failed,
                ..
            }
        ));
    }

    #[test]
    fn execute_completes_immediately_when_orchestrator_never_suspends() {
        let mut executor = OrchestrationExecutor::new(registry_with_completing_orchestrator());
        let new_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "Greet".to_string(),
                input: Some("\"world\"".to_string()),
            },
        ];
        let actions = executor.execute("inst-1", &[], &new_events).unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            OrchestratorAction::CompleteOrchestration { status, result, .. } => {
                assert_eq!(*status, OrchestrationStatus::Completed);
                assert_eq!(result.as_deref(), Some("\"hello world\""));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn execute_suspends_on_call_activity_and_allocates_schedule_task_action() {
        let mut executor = OrchestrationExecutor::new(registry_with_activity_calling_orchestrator());
        let new_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "RunOne".to_string(),
                input: None,
            },
        ];
        let actions = executor.execute("inst-1", &[], &new_events).unwrap();
        assert_eq!(actions.len(), 1);
        assert!(matches!(&actions[0], OrchestratorAction::ScheduleTask { id: 1, .. }));
    }

    #[test_log::test]
    fn task_completed_resumes_and_completes_orchestration() {
        let mut executor = OrchestrationExecutor::new(registry_with_activity_calling_orchestrator());
        let old_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "RunOne".to_string(),
                input: None,
            },
            HistoryEvent::TaskScheduled {
                event_id: 1,
                name: "DoThing".to_string(),
            },
        ];
        let new_events = vec![HistoryEvent::TaskCompleted {
            task_scheduled_id: 1,
            result: Some("\"done\"".to_string()),
        }];
        let actions = executor.execute("inst-1", &old_events, &new_events).unwrap();
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            OrchestratorAction::CompleteOrchestration { status, result, .. } => {
                assert_eq!(*status, OrchestrationStatus::Completed);
                assert_eq!(result.as_deref(), Some("\"done\""));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test_log::test]
    fn mismatched_task_scheduled_name_is_a_non_determinism_error() {
        let mut executor = OrchestrationExecutor::new(registry_with_activity_calling_orchestrator());
        let old_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "RunOne".to_string(),
                input: None,
            },
        ];
        let new_events = vec![HistoryEvent::TaskScheduled {
            event_id: 1,
            name: "WrongActivityName".to_string(),
        }];
        let actions = executor.execute("inst-1", &old_events, &new_events).unwrap();
        match &actions[0] {
            OrchestratorAction::CompleteOrchestration {
                status: OrchestrationStatus::Failed,
                failure_details: Some(details),
                ..
            } => assert!(details.error_message.contains("WrongActivityName")),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn execution_terminated_completes_with_terminated_status() {
        let mut executor = OrchestrationExecutor::new(registry_with_activity_calling_orchestrator());
        let old_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "RunOne".to_string(),
                input: None,
            },
        ];
        let new_events = vec![HistoryEvent::ExecutionTerminated {
            input: Some("cancelled by operator".to_string()),
        }];
        let actions = executor.execute("inst-1", &old_events, &new_events).unwrap();
        assert!(matches!(
            &actions.last().unwrap(),
            OrchestratorAction::CompleteOrchestration {
                status: OrchestrationStatus::Terminated,
                ..
            }
        ));
    }

    #[test]
    fn suspended_events_are_buffered_until_execution_resumed() {
        let mut executor = OrchestrationExecutor::new(registry_with_activity_calling_orchestrator());
        let old_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "RunOne".to_string(),
                input: None,
            },
            HistoryEvent::TaskScheduled {
                event_id: 1,
                name: "DoThing".to_string(),
            },
            HistoryEvent::ExecutionSuspended,
        ];
        let new_events = vec![
            HistoryEvent::TaskCompleted {
                task_scheduled_id: 1,
                result: Some("\"done\"".to_string()),
            },
            HistoryEvent::ExecutionResumed,
        ];
        let actions = executor.execute("inst-1", &old_events, &new_events).unwrap();
        assert!(matches!(
            &actions.last().unwrap(),
            OrchestratorAction::CompleteOrchestration {
                status: OrchestrationStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn timer_fires_and_completes_orchestration_on_the_next_turn() {
        let mut executor = OrchestrationExecutor::new(registry_with_timer_orchestrator());
        let old_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "WaitABit".to_string(),
                input: None,
            },
        ];
        let first_turn = executor.execute("inst-1", &[], &old_events).unwrap();
        assert!(matches!(&first_turn[0], OrchestratorAction::CreateTimer { id: 1, .. }));

        let mut old_events_with_timer_created = old_events;
        old_events_with_timer_created.push(HistoryEvent::TimerCreated { event_id: 1 });
        let new_events = vec![HistoryEvent::TimerFired { timer_id: 1 }];
        let actions = executor
            .execute("inst-1", &old_events_with_timer_created, &new_events)
            .unwrap();
        assert!(matches!(
            &actions.last().unwrap(),
            OrchestratorAction::CompleteOrchestration {
                status: OrchestrationStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn external_event_buffered_on_one_turn_is_consumed_on_the_next() {
        // The orchestrator is still awaiting "Setup" when "Approval" arrives,
        // so it has to be buffered; only once "Setup" completes does the
        // orchestrator reach `wait_for_external_event` and pick it back up.
        let mut executor = OrchestrationExecutor::new(registry_with_external_event_orchestrator());
        let old_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "AwaitApproval".to_string(),
                input: None,
            },
            HistoryEvent::TaskScheduled {
                event_id: 1,
                name: "Setup".to_string(),
            },
            HistoryEvent::EventRaised {
                name: "Approval".to_string(),
                input: Some("true".to_string()),
            },
        ];
        let new_events = vec![HistoryEvent::TaskCompleted {
            task_scheduled_id: 1,
            result: None,
        }];
        let actions = executor.execute("inst-1", &old_events, &new_events).unwrap();
        match &actions.last().unwrap() {
            OrchestratorAction::CompleteOrchestration { status, result, .. } => {
                assert_eq!(*status, OrchestrationStatus::Completed);
                assert_eq!(result.as_deref(), Some("true"));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn execution_resumed_without_a_prior_suspend_is_an_orchestration_state_error() {
        let mut executor = OrchestrationExecutor::new(registry_with_activity_calling_orchestrator());
        let old_events = vec![
            HistoryEvent::OrchestratorStarted { timestamp: Utc::now() },
            HistoryEvent::ExecutionStarted {
                name: "RunOne".to_string(),
                input: None,
            },
        ];
        let new_events = vec![HistoryEvent::ExecutionResumed];
        let actions = executor.execute("inst-1", &old_events, &new_events).unwrap();
        match &actions.last().unwrap() {
            OrchestratorAction::CompleteOrchestration {
                status: OrchestrationStatus::Failed,
                failure_details: Some(details),
                ..
            } => assert_eq!(details.error_type, "OrchestrationStateError"),
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
