//! Error taxonomy for the invite-tree engine.

use crate::types::ParticipantId;
use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid contact: {0}")]
    InvalidIdentity(String),
    #[error("Participant {0} is at the terminal tier and cannot invite")]
    NotEligible(ParticipantId),
    #[error("Invalid invitation")]
    InvalidCredential,
    #[error("Invitation expired: the event has started")]
    Expired,
    #[error("Name or contact already used in this event")]
    DuplicateIdentity,
    #[error("Event is locked")]
    Locked,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Snapshot not available before the event starts")]
    NotAvailable,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Database busy")]
    Busy,
    #[error("Database error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Whether the error came from the store rather than from the request.
    pub fn is_storage(&self) -> bool {
        matches!(self, EngineError::Busy | EngineError::Storage(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => EngineError::Busy,
            _ => EngineError::Storage(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Storage(format!("snapshot encoding: {e}"))
    }
}
