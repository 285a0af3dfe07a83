use crate::failure::FailureDetails;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal/ongoing status of an orchestration instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestrationStatus {
    Running,
    Completed,
    Failed,
    Terminated,
    ContinuedAsNew,
}

impl OrchestrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Terminated | Self::ContinuedAsNew
        )
    }
}

impl std::fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Terminated => "TERMINATED",
            Self::ContinuedAsNew => "CONTINUED_AS_NEW",
        };
        write!(f, "{s}")
    }
}

/// A request from the worker to the sidecar, identified by the sequence
/// number that allocated it.
///
/// Every variant is acknowledged by exactly one corresponding
/// [`HistoryEvent`] on a later turn (`CreateTimer` ↔ `TimerCreated`,
/// `ScheduleTask` ↔ `TaskScheduled`, `CreateSubOrchestration` ↔
/// `SubOrchestrationInstanceCreated`) except `CompleteOrchestration`, which
/// is terminal and never acknowledged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OrchestratorAction {
    CreateTimer {
        id: i32,
        fire_at: DateTime<Utc>,
    },
    ScheduleTask {
        id: i32,
        name: String,
        input: Option<String>,
    },
    CreateSubOrchestration {
        id: i32,
        name: String,
        instance_id: String,
        input: Option<String>,
    },
    CompleteOrchestration {
        id: i32,
        status: OrchestrationStatus,
        result: Option<String>,
        failure_details: Option<FailureDetails>,
    },
}

impl OrchestratorAction {
    pub fn id(&self) -> i32 {
        match self {
            Self::CreateTimer { id, .. }
            | Self::ScheduleTask { id, .. }
            | Self::CreateSubOrchestration { id, .. }
            | Self::CompleteOrchestration { id, .. } => *id,
        }
    }

    /// Variant name for diagnostics, matching the method that produced it
    /// (`createTimer`, `scheduleTask`, `createSubOrchestration`, `completeOrchestration`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateTimer { .. } => "createTimer",
            Self::ScheduleTask { .. } => "scheduleTask",
            Self::CreateSubOrchestration { .. } => "createSubOrchestration",
            Self::CompleteOrchestration { .. } => "completeOrchestration",
        }
    }
}

/// A single immutable record of something that happened to an orchestration
/// instance. The full ordered sequence of these is the orchestration's
/// history; replaying it against the orchestrator function reconstructs the
/// in-memory state deterministically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum HistoryEvent {
    OrchestratorStarted {
        timestamp: DateTime<Utc>,
    },
    ExecutionStarted {
        name: String,
        input: Option<String>,
    },
    TimerCreated {
        event_id: i32,
    },
    TimerFired {
        timer_id: i32,
    },
    TaskScheduled {
        event_id: i32,
        name: String,
    },
    TaskCompleted {
        task_scheduled_id: i32,
        result: Option<String>,
    },
    TaskFailed {
        task_scheduled_id: i32,
        failure_details: FailureDetails,
    },
    SubOrchestrationInstanceCreated {
        event_id: i32,
        name: String,
        instance_id: String,
    },
    SubOrchestrationInstanceCompleted {
        task_scheduled_id: i32,
        result: Option<String>,
    },
    SubOrchestrationInstanceFailed {
        task_scheduled_id: i32,
        failure_details: FailureDetails,
    },
    EventRaised {
        name: String,
        input: Option<String>,
    },
    ExecutionSuspended,
    ExecutionResumed,
    ExecutionTerminated {
        input: Option<String>,
    },
}

impl HistoryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OrchestratorStarted { .. } => "orchestratorStarted",
            Self::ExecutionStarted { .. } => "executionStarted",
            Self::TimerCreated { .. } => "timerCreated",
            Self::TimerFired { .. } => "timerFired",
            Self::TaskScheduled { .. } => "taskScheduled",
            Self::TaskCompleted { .. } => "taskCompleted",
            Self::TaskFailed { .. } => "taskFailed",
            Self::SubOrchestrationInstanceCreated { .. } => "subOrchestrationInstanceCreated",
            Self::SubOrchestrationInstanceCompleted { .. } => "subOrchestrationInstanceCompleted",
            Self::SubOrchestrationInstanceFailed { .. } => "subOrchestrationInstanceFailed",
            Self::EventRaised { .. } => "eventRaised",
            Self::ExecutionSuspended => "executionSuspended",
            Self::ExecutionResumed => "executionResumed",
            Self::ExecutionTerminated { .. } => "executionTerminated",
        }
    }

    /// Whether this event must be buffered rather than processed while the
    /// orchestration is suspended. `executionResumed` itself, and anything
    /// not otherwise suspendable, passes straight through.
    pub fn is_suspendable(&self) -> bool {
        !matches!(self, Self::ExecutionResumed | Self::ExecutionTerminated { .. })
    }
}
