//! Generated protobuf types for the worker-sidecar dispatch protocol, plus
//! hand-written conversions to/from `durable-worker-types`'s domain model.
//!
//! Generated types never leak past [`conversions`] — callers in
//! `durable-worker-runtime` only see `durable_worker_types::HistoryEvent` /
//! `OrchestratorAction` / `FailureDetails`.

pub mod conversions;

pub mod proto {
    #![allow(clippy::all)]
    include!(concat!(env!("OUT_DIR"), "/durable_worker.v1.rs"));
}

pub use proto::orchestrator_service_client::OrchestratorServiceClient;
pub use proto::orchestrator_service_server::{OrchestratorService, OrchestratorServiceServer};
