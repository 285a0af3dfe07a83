use chrono::{DateTime, Duration, Utc};
use durable_worker_types::{ExternalEvent, FailureDetails, OrchestrationStatus, OrchestratorAction};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::task::Task;

/// Outcome of an orchestrator's async body: a normal return value, or a
/// raised error (the Rust analogue of an exception escaping the generator).
pub type OrchestratorResult = Result<Option<Value>, FailureDetails>;

/// A boxed, not-`Send` future: orchestrator bodies run entirely within one
/// synchronous `execute()` call on one thread (§5), so there is never a need
/// to move this future across threads.
pub type BoxOrchestratorFuture = Pin<Box<dyn Future<Output = OrchestratorResult>>>;

/// When a timer should fire, expressed either as a concrete instant or a
/// duration from "now" (normalised to an instant using
/// [`OrchestrationContext::current_utc_datetime`] at call time, so replay
/// reproduces the exact same instant every time).
#[derive(Clone, Copy, Debug)]
pub enum TimerFireAt {
    Absolute(DateTime<Utc>),
    Delta(Duration),
}

/// Pending, not-yet-acknowledged composite state accumulated as an
/// orchestrator body runs. Owned exclusively by one [`OrchestrationContext`]
/// for the lifetime of a single `execute()` call — nothing here survives
/// past it.
struct ContextInner {
    instance_id: String,
    is_replaying: bool,
    is_complete: bool,
    pending_actions: BTreeMap<i32, OrchestratorAction>,
    pending_tasks: HashMap<i32, Task<Option<Value>>>,
    sequence_number: i32,
    current_utc_datetime: DateTime<Utc>,
    received_events: HashMap<String, VecDeque<ExternalEvent>>,
    pending_events: HashMap<String, VecDeque<Task<Option<Value>>>>,
    completion_status: Option<OrchestrationStatus>,
}

/// The user-facing API exposed to orchestrator bodies.
///
/// Cheap to `Clone` (an `Rc` handle to shared interior state), which is what
/// lets an orchestrator's `async` body hold on to `ctx` across `.await`
/// points without fighting the borrow checker — see `durable-worker-core::registry::OrchestratorFn`.
#[derive(Clone)]
pub struct OrchestrationContext {
    inner: Rc<RefCell<ContextInner>>,
}

impl OrchestrationContext {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContextInner {
                instance_id: instance_id.into(),
                is_replaying: true,
                is_complete: false,
                pending_actions: BTreeMap::new(),
                pending_tasks: HashMap::new(),
                sequence_number: 0,
                // Matches the source's epoch placeholder; overwritten by the
                // first `orchestratorStarted` event before any user code runs.
                current_utc_datetime: DateTime::<Utc>::MIN_UTC,
                received_events: HashMap::new(),
                pending_events: HashMap::new(),
                completion_status: None,
            })),
        }
    }

    pub fn instance_id(&self) -> String {
        self.inner.borrow().instance_id.clone()
    }

    pub fn is_replaying(&self) -> bool {
        self.inner.borrow().is_replaying
    }

    pub fn current_utc_datetime(&self) -> DateTime<Utc> {
        self.inner.borrow().current_utc_datetime
    }

    pub(crate) fn set_is_replaying(&self, value: bool) {
        self.inner.borrow_mut().is_replaying = value;
    }

    pub(crate) fn set_current_utc_datetime(&self, value: DateTime<Utc>) {
        self.inner.borrow_mut().current_utc_datetime = value;
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.inner.borrow().is_complete
    }

    pub(crate) fn completion_status(&self) -> Option<OrchestrationStatus> {
        self.inner.borrow().completion_status
    }

    pub(crate) fn next_sequence_number(&self) -> i32 {
        let mut inner = self.inner.borrow_mut();
        inner.sequence_number += 1;
        inner.sequence_number
    }

    /// Pending actions in sequence (= insertion) order — the exact list
    /// returned by [`crate::executor::OrchestrationExecutor::execute`].
    pub(crate) fn take_actions(&self) -> Vec<OrchestratorAction> {
        self.inner.borrow().pending_actions.values().cloned().collect()
    }

    pub(crate) fn pop_pending_action(&self, id: i32) -> Option<OrchestratorAction> {
        self.inner.borrow_mut().pending_actions.remove(&id)
    }

    pub(crate) fn pop_pending_task(&self, id: i32) -> Option<Task<Option<Value>>> {
        self.inner.borrow_mut().pending_tasks.remove(&id)
    }

    pub fn create_timer(&self, fire_at: TimerFireAt) -> Task<Option<Value>> {
        let id = self.next_sequence_number();
        let resolved_fire_at = match fire_at {
            TimerFireAt::Absolute(t) => t,
            TimerFireAt::Delta(d) => self.current_utc_datetime() + d,
        };
        let mut inner = self.inner.borrow_mut();
        inner.pending_actions.insert(
            id,
            OrchestratorAction::CreateTimer {
                id,
                fire_at: resolved_fire_at,
            },
        );
        let timer_task = Task::new();
        inner.pending_tasks.insert(id, timer_task.clone());
        timer_task
    }

    pub fn call_activity(&self, name: &str, input: Option<Value>) -> Task<Option<Value>> {
        let id = self.next_sequence_number();
        let encoded_input = encode_input(input);
        let mut inner = self.inner.borrow_mut();
        inner.pending_actions.insert(
            id,
            OrchestratorAction::ScheduleTask {
                id,
                name: name.to_string(),
                input: encoded_input,
            },
        );
        let activity_task = Task::new();
        inner.pending_tasks.insert(id, activity_task.clone());
        activity_task
    }

    pub fn call_sub_orchestrator(
        &self,
        name: &str,
        input: Option<Value>,
        instance_id: Option<String>,
    ) -> Task<Option<Value>> {
        let id = self.next_sequence_number();
        let child_instance_id =
            instance_id.unwrap_or_else(|| format!("{}:{:04x}", self.instance_id(), id));
        let encoded_input = encode_input(input);
        let mut inner = self.inner.borrow_mut();
        inner.pending_actions.insert(
            id,
            OrchestratorAction::CreateSubOrchestration {
                id,
                name: name.to_string(),
                instance_id: child_instance_id,
                input: encoded_input,
            },
        );
        let sub_orch_task = Task::new();
        inner.pending_tasks.insert(id, sub_orch_task.clone());
        sub_orch_task
    }

    /// Names compare case-insensitively; delivery is FIFO per name. If an
    /// event with this name already arrived (buffered in `received_events`),
    /// the returned task is immediately settled; otherwise a waiter is
    /// queued for `process_event` to settle later.
    pub fn wait_for_external_event(&self, name: &str) -> Task<Option<Value>> {
        let key = name.to_uppercase();
        let waiter = Task::new();
        let mut inner = self.inner.borrow_mut();

        let popped = inner
            .received_events
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());
        if let Some(event) = popped {
            let now_empty = inner
                .received_events
                .get(&key)
                .is_some_and(|queue| queue.is_empty());
            if now_empty {
                inner.received_events.remove(&key);
            }
            let data = event
                .data
                .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)));
            waiter.resolve(data);
            return waiter;
        }

        inner
            .pending_events
            .entry(key)
            .or_default()
            .push_back(waiter.clone());
        waiter
    }

    pub fn set_complete(
        &self,
        result: Option<Value>,
        status: OrchestrationStatus,
        is_result_encoded: bool,
    ) {
        let mut inner = self.inner.borrow_mut();
        if inner.is_complete {
            return;
        }
        inner.is_complete = true;
        inner.completion_status = Some(status);
        let encoded = if is_result_encoded {
            match result {
                Some(Value::String(s)) => Some(s),
                Some(other) => Some(other.to_string()),
                None => None,
            }
        } else {
            encode_input(result)
        };
        let id = {
            inner.sequence_number += 1;
            inner.sequence_number
        };
        inner.pending_actions.insert(
            id,
            OrchestratorAction::CompleteOrchestration {
                id,
                status,
                result: encoded,
                failure_details: None,
            },
        );
    }

    pub fn set_failed(&self, failure: FailureDetails) {
        let mut inner = self.inner.borrow_mut();
        if inner.is_complete {
            return;
        }
        inner.is_complete = true;
        inner.completion_status = Some(OrchestrationStatus::Failed);
        inner.pending_actions.clear();
        let id = {
            inner.sequence_number += 1;
            inner.sequence_number
        };
        inner.pending_actions.insert(
            id,
            OrchestratorAction::CompleteOrchestration {
                id,
                status: OrchestrationStatus::Failed,
                result: None,
                failure_details: Some(failure),
            },
        );
    }

    pub(crate) fn buffer_external_event(&self, name: &str, data: Option<String>) {
        let key = name.to_uppercase();
        self.inner
            .borrow_mut()
            .received_events
            .entry(key)
            .or_default()
            .push_back(ExternalEvent::new(name, data));
    }

    /// Settles the oldest waiter for `name`, if any, returning it so the
    /// caller can resume the orchestrator future. Returns `None` when no
    /// task is currently waiting (the event must be buffered instead).
    pub(crate) fn settle_pending_event(
        &self,
        name: &str,
        data: Option<String>,
    ) -> Option<Task<Option<Value>>> {
        let key = name.to_uppercase();
        let mut inner = self.inner.borrow_mut();
        let waiter = inner
            .pending_events
            .get_mut(&key)
            .and_then(|queue| queue.pop_front())?;
        let now_empty = inner
            .pending_events
            .get(&key)
            .is_some_and(|queue| queue.is_empty());
        if now_empty {
            inner.pending_events.remove(&key);
        }
        drop(inner);
        let decoded = data.map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)));
        waiter.resolve(decoded);
        Some(waiter)
    }
}

fn encode_input(input: Option<Value>) -> Option<String> {
    input.map(|value| serde_json::to_string(&value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_timer_normalizes_delta_against_current_clock() {
        let ctx = OrchestrationContext::new("inst-1");
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ctx.set_current_utc_datetime(now);
        ctx.create_timer(TimerFireAt::Delta(Duration::minutes(5)));
        let actions = ctx.take_actions();
        match &actions[0] {
            OrchestratorAction::CreateTimer { fire_at, .. } => {
                assert_eq!(*fire_at, now + Duration::minutes(5));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn sub_orchestration_id_defaults_to_deterministic_derivation() {
        let ctx = OrchestrationContext::new("parent-1");
        ctx.call_sub_orchestrator("Child", None, None);
        let actions = ctx.take_actions();
        match &actions[0] {
            OrchestratorAction::CreateSubOrchestration { instance_id, id, .. } => {
                assert_eq!(*instance_id, format!("parent-1:{:04x}", id));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn wait_for_external_event_is_case_insensitive_and_fifo() {
        let ctx = OrchestrationContext::new("inst-1");
        ctx.buffer_external_event("Approval", Some("\"first\"".to_string()));
        ctx.buffer_external_event("APPROVAL", Some("\"second\"".to_string()));
        let first = ctx.wait_for_external_event("approval");
        assert_eq!(first.is_complete(), true);

        let mut cx = std::task::Context::from_waker(std::task::Waker::noop());
        match std::future::Future::poll(std::pin::Pin::new(&mut first.clone()), &mut cx) {
            std::task::Poll::Ready(Ok(Some(Value::String(s)))) => assert_eq!(s, "first"),
            other => panic!("unexpected poll result: {other:?}"),
        }
    }

    #[test]
    fn set_failed_clears_pending_actions_and_emits_single_failure() {
        let ctx = OrchestrationContext::new("inst-1");
        ctx.call_activity("DoThing", None);
        ctx.set_failed(FailureDetails::new("Boom", "kaboom"));
        let actions = ctx.take_actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            OrchestratorAction::CompleteOrchestration {
                status: OrchestrationStatus::Failed,
                ..
            }
        ));
    }

    #[test]
    fn set_complete_is_a_no_op_once_already_complete() {
        let ctx = OrchestrationContext::new("inst-1");
        ctx.set_complete(Some(Value::from(1)), OrchestrationStatus::Completed, false);
        ctx.set_complete(Some(Value::from(2)), OrchestrationStatus::Completed, false);
        assert_eq!(ctx.take_actions().len(), 1);
    }
}
