pub mod config;
mod dispatcher;
pub mod worker;
pub mod worker_error;

pub use config::WorkerConfig;
pub use worker::Worker;
pub use worker_error::WorkerError;
