/// A named, optionally-payload-carrying signal delivered to a waiting
/// orchestration out of band (`raise_event` on the sidecar side).
///
/// Distinct from [`crate::history_event::HistoryEvent::EventRaised`]: this is
/// the decoded, buffered form held by the orchestration context between the
/// moment the history event is processed and the moment some `wait_for_external_event`
/// call consumes it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalEvent {
    pub name: String,
    pub data: Option<String>,
}

impl ExternalEvent {
    pub fn new(name: impl Into<String>, data: Option<String>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}
