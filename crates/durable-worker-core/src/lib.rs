pub mod activity;
pub mod context;
pub mod executor;
pub mod registry;
pub mod task;
pub mod taxonomy;

pub use activity::{ActivityContext, ActivityError, ActivityExecutor};
pub use context::{BoxOrchestratorFuture, OrchestrationContext, OrchestratorResult, TimerFireAt};
pub use executor::OrchestrationExecutor;
pub use registry::{ActivityFn, OrchestratorFn, Registry, RegistryError};
pub use task::{Task, WhenAll, WhenAny};
pub use taxonomy::{ExecutionError, NonDeterminismError, OrchestrationStateError, OrchestratorNotRegistered};
