use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use durable_worker_core::{ActivityFn, OrchestratorFn, Registry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::dispatcher;
use crate::worker_error::WorkerError;

const STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Running,
    Stopping,
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns registration and the dispatch loop's lifecycle. Mirrors the original
/// source's `TaskHubGrpcWorker`: orchestrators and activities may only be
/// added while idle, `start`/`stop` are idempotent-safe transitions, and
/// `run_scoped` gives callers a context-manager-shaped way to guarantee
/// `stop` runs even if the body returns early.
pub struct Worker {
    config: WorkerConfig,
    worker_id: String,
    registry: Registry,
    state: Mutex<WorkerState>,
    running: Mutex<Option<Running>>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            worker_id: uuid::Uuid::new_v4().to_string(),
            registry: Registry::new(),
            state: Mutex::new(WorkerState::Idle),
            running: Mutex::new(None),
        }
    }

    pub fn add_orchestrator(&mut self, name: impl Into<String>, f: OrchestratorFn) -> Result<(), WorkerError> {
        self.guard_idle()?;
        self.registry.add_orchestrator(name, f)?;
        Ok(())
    }

    pub fn add_activity(&mut self, name: impl Into<String>, f: ActivityFn) -> Result<(), WorkerError> {
        self.guard_idle()?;
        self.registry.add_activity(name, f)?;
        Ok(())
    }

    fn guard_idle(&self) -> Result<(), WorkerError> {
        if *self.state.lock().expect("worker state mutex poisoned") != WorkerState::Idle {
            return Err(WorkerError::AlreadyRunning);
        }
        Ok(())
    }

    /// Takes ownership of the registry built up so far and spawns the
    /// dispatch loop on its own task. Calling `start` a second time before
    /// `stop` returns `WorkerError::AlreadyRunning`.
    pub fn start(&mut self) -> Result<(), WorkerError> {
        {
            let mut state = self.state.lock().expect("worker state mutex poisoned");
            if *state != WorkerState::Idle {
                return Err(WorkerError::AlreadyRunning);
            }
            *state = WorkerState::Running;
        }

        let registry = Arc::new(std::mem::take(&mut self.registry));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatcher::run(
            registry,
            self.config.clone(),
            self.worker_id.clone(),
            shutdown.clone(),
        ));

        *self.running.lock().expect("worker running mutex poisoned") = Some(Running { shutdown, handle });
        Ok(())
    }

    /// Signals the dispatch loop to stop accepting new work and waits for it
    /// to drain, bounded by [`STOP_TIMEOUT`].
    pub async fn stop(&mut self) -> Result<(), WorkerError> {
        let running = self.running.lock().expect("worker running mutex poisoned").take();
        let Some(running) = running else {
            *self.state.lock().expect("worker state mutex poisoned") = WorkerState::Idle;
            return Ok(());
        };

        *self.state.lock().expect("worker state mutex poisoned") = WorkerState::Stopping;
        running.shutdown.cancel();

        let result = tokio::time::timeout(STOP_TIMEOUT, running.handle).await;
        *self.state.lock().expect("worker state mutex poisoned") = WorkerState::Idle;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => {
                tracing::error!(error = %join_err, "dispatcher task panicked during shutdown");
                Ok(())
            }
            Err(_) => Err(WorkerError::ShutdownTimedOut),
        }
    }

    /// Starts the worker, runs `body`, and always stops the worker before
    /// returning — the async analogue of the original source's
    /// `with worker:` context-manager usage.
    pub async fn run_scoped<F, Fut, T>(&mut self, body: F) -> Result<T, WorkerError>
    where
        F: FnOnce(&Worker) -> Fut,
        Fut: Future<Output = T>,
    {
        self.start()?;
        let result = body(self).await;
        self.stop().await?;
        Ok(result)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(running) = self.running.lock().expect("worker running mutex poisoned").take() {
            tracing::warn!("worker dropped while running, cancelling dispatcher without waiting for drain");
            running.shutdown.cancel();
            running.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_orchestrator_rejects_once_running() {
        let mut worker = Worker::new(WorkerConfig::default());
        *worker.state.lock().unwrap() = WorkerState::Running;
        let result = worker.add_orchestrator("Greet", Arc::new(|_ctx, _input| Box::pin(async { Ok(None) })));
        assert!(matches!(result, Err(WorkerError::AlreadyRunning)));
    }

    #[test]
    fn new_worker_starts_idle() {
        let worker = Worker::new(WorkerConfig::default());
        assert_eq!(*worker.state.lock().unwrap(), WorkerState::Idle);
    }

    #[test_log::test(tokio::test)]
    async fn start_then_stop_tears_down_the_dispatcher_without_hitting_the_timeout() {
        // reconnect_delay is long relative to the test; cancellation must
        // preempt it rather than the test waiting out a real sleep.
        let config = WorkerConfig::new("http://127.0.0.1:1").with_max_concurrent_work_items(1);
        let mut worker = Worker::new(config);
        worker.start().unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), worker.stop()).await;
        assert!(result.is_ok(), "stop() should return well within the timeout");
        assert!(result.unwrap().is_ok());
    }
}
