//! Relay error taxonomy.
//!
//! Validation and state-machine errors go back to the caller of the mutating
//! operation. Transport failures are recorded against the one connection
//! they happened on and never abort a broader publish or escalation.

use crate::domain::alarm::AlarmStatus;
use crate::domain::ids::{AlarmId, ConnectionId};
use crate::ports::outbound::{StoreError, TransportError};
use std::time::Duration;

/// Stable error codes exposed to callers of the HTTP surface.
pub mod codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const INVALID_TRANSITION: &str = "invalid_transition";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const CAPACITY_EXCEEDED: &str = "capacity_exceeded";
    pub const TRANSPORT_FAILURE: &str = "transport_failure";
    pub const VALIDATION: &str = "validation";
    pub const STORAGE: &str = "storage";
}

/// Errors returned by relay and Andon operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Unknown connection, alarm, line or topic
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Duplicate active alarm for the same line, equipment and event type
    #[error("conflict: {0}")]
    Conflict(String),

    /// Alarm state machine violation
    #[error("cannot {action} an alarm in status {from}")]
    InvalidTransition {
        from: AlarmStatus,
        action: &'static str,
    },

    /// Publisher exceeded the per-connection send budget
    #[error("connection {connection_id} is rate limited (retry after {retry_after:?})")]
    RateLimited {
        connection_id: ConnectionId,
        retry_after: Duration,
    },

    /// Connection registry is full
    #[error("connection capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },

    /// Best-effort delivery failure on a single connection
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// Malformed input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Alarm storage collaborator failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl RelayError {
    pub fn connection_not_found(id: ConnectionId) -> Self {
        Self::NotFound {
            kind: "connection",
            id: id.to_string(),
        }
    }

    pub fn alarm_not_found(id: AlarmId) -> Self {
        Self::NotFound {
            kind: "alarm",
            id: id.to_string(),
        }
    }

    pub fn line_not_found(line: &str) -> Self {
        Self::NotFound {
            kind: "line",
            id: line.to_string(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::Conflict(_) => codes::CONFLICT,
            Self::InvalidTransition { .. } => codes::INVALID_TRANSITION,
            Self::RateLimited { .. } => codes::RATE_LIMITED,
            Self::CapacityExceeded { .. } => codes::CAPACITY_EXCEEDED,
            Self::TransportFailure(_) => codes::TRANSPORT_FAILURE,
            Self::Validation(_) => codes::VALIDATION,
            Self::Storage(_) => codes::STORAGE,
        }
    }

    /// HTTP status the runtime answers with
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Conflict(_) | Self::InvalidTransition { .. } => 409,
            Self::Validation(_) => 422,
            Self::RateLimited { .. } => 429,
            Self::CapacityExceeded { .. } => 503,
            Self::TransportFailure(_) => 502,
            Self::Storage(_) => 500,
        }
    }

    /// Serializable error body
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Self::RateLimited { retry_after, .. } = self {
            body["retry_after_ms"] = serde_json::json!(retry_after.as_millis() as u64);
        }
        body
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
