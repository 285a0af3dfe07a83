#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("cannot register orchestrators or activities once the worker has started")]
    AlreadyRunning,
    #[error(transparent)]
    Registry(#[from] durable_worker_core::RegistryError),
    #[error("failed to connect to sidecar at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("dispatcher task did not stop within the shutdown timeout")]
    ShutdownTimedOut,
}
