use thiserror::Error;

use crate::event::EventKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    #[error("Schema violation for {kind}: {reason}")]
    SchemaViolation { kind: EventKind, reason: String },
}
