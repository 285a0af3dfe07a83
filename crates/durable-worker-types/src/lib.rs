pub mod external_event;
pub mod failure;
pub mod history_event;

pub use external_event::ExternalEvent;
pub use failure::FailureDetails;
pub use history_event::{HistoryEvent, OrchestrationStatus, OrchestratorAction};
