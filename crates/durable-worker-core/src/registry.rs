use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::activity::{ActivityContext, ActivityError};
use crate::context::{BoxOrchestratorFuture, OrchestrationContext};

/// A registered orchestrator function. Takes a handle to the per-invocation
/// context (cheaply `Clone`-able, see [`OrchestrationContext`]) and the
/// decoded input, and returns a future that the executor polls once per
/// history event — see `durable_worker_core::executor`.
pub type OrchestratorFn =
    Arc<dyn Fn(OrchestrationContext, Option<Value>) -> BoxOrchestratorFuture + Send + Sync>;

pub type ActivityFn =
    Arc<dyn Fn(&ActivityContext, Option<Value>) -> Result<Option<Value>, ActivityError> + Send + Sync>;

/// Errors raised while registering orchestrators and activities.
///
/// Mirrors the source's plain `ValueError`s with specific messages; split
/// into variants here so callers can match on the failure mode instead of
/// string-matching a message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a non-empty orchestrator name is required")]
    EmptyOrchestratorName,
    #[error("a '{0}' orchestrator already exists")]
    DuplicateOrchestrator(String),
    #[error("a non-empty activity name is required")]
    EmptyActivityName,
    #[error("a '{0}' activity already exists")]
    DuplicateActivity(String),
}

/// Name → function lookup table for orchestrators and activities.
///
/// Registration only happens before the worker starts; after that the
/// registry is read-only and shared across every concurrently-executing
/// instance via `Arc` (see `durable-worker-runtime`), so no internal locking
/// is needed.
#[derive(Default)]
pub struct Registry {
    orchestrators: HashMap<String, OrchestratorFn>,
    activities: HashMap<String, ActivityFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_orchestrator(
        &mut self,
        name: impl Into<String>,
        f: OrchestratorFn,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyOrchestratorName);
        }
        if self.orchestrators.contains_key(&name) {
            return Err(RegistryError::DuplicateOrchestrator(name));
        }
        self.orchestrators.insert(name, f);
        Ok(())
    }

    pub fn get_orchestrator(&self, name: &str) -> Option<&OrchestratorFn> {
        self.orchestrators.get(name)
    }

    pub fn add_activity(
        &mut self,
        name: impl Into<String>,
        f: ActivityFn,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyActivityName);
        }
        if self.activities.contains_key(&name) {
            return Err(RegistryError::DuplicateActivity(name));
        }
        self.activities.insert(name, f);
        Ok(())
    }

    pub fn get_activity(&self, name: &str) -> Option<&ActivityFn> {
        self.activities.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_orchestrator() -> OrchestratorFn {
        Arc::new(|_ctx, _input| Box::pin(async { Ok(None) }))
    }

    fn noop_activity() -> ActivityFn {
        Arc::new(|_ctx, _input| Ok(None))
    }

    #[test]
    fn add_orchestrator_rejects_empty_name() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.add_orchestrator("", noop_orchestrator()),
            Err(RegistryError::EmptyOrchestratorName)
        );
    }

    #[test]
    fn add_orchestrator_rejects_duplicate_name() {
        let mut registry = Registry::new();
        registry.add_orchestrator("Greet", noop_orchestrator()).unwrap();
        assert_eq!(
            registry.add_orchestrator("Greet", noop_orchestrator()),
            Err(RegistryError::DuplicateOrchestrator("Greet".to_string()))
        );
    }

    #[test]
    fn get_orchestrator_returns_none_when_missing() {
        let registry = Registry::new();
        assert!(registry.get_orchestrator("Missing").is_none());
    }

    #[test]
    fn add_activity_rejects_empty_name() {
        let mut registry = Registry::new();
        assert_eq!(
            registry.add_activity("", noop_activity()),
            Err(RegistryError::EmptyActivityName)
        );
    }

    #[test]
    fn add_activity_rejects_duplicate_name() {
        let mut registry = Registry::new();
        registry.add_activity("SayHello", noop_activity()).unwrap();
        assert_eq!(
            registry.add_activity("SayHello", noop_activity()),
            Err(RegistryError::DuplicateActivity("SayHello".to_string()))
        );
    }

    #[test]
    fn registered_orchestrator_is_retrievable() {
        let mut registry = Registry::new();
        registry.add_orchestrator("Greet", noop_orchestrator()).unwrap();
        assert!(registry.get_orchestrator("Greet").is_some());
    }
}
