//! Request store and transition errors.

use thiserror::Error;

use super::status::RequestStatus;
use super::types::{RequestId, SensorId};

// ============================================================================
// Request Errors
// ============================================================================

/// Errors from request storage and state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No request with the given id exists.
    #[error("request '{request_id}' not found")]
    NotFound {
        /// The id that was looked up
        request_id: RequestId,
    },

    /// The request already carries a validator decision (or was cancelled).
    ///
    /// Exactly-once guarantee: the first resolving call wins, every later
    /// one gets this.
    #[error("request '{request_id}' is already resolved as '{status}'")]
    AlreadyResolved {
        /// The request id
        request_id: RequestId,
        /// The status it was resolved to
        status: RequestStatus,
    },

    /// The requested transition is not in the state machine's map.
    #[error("invalid transition for request '{request_id}': {from} -> {to}")]
    InvalidTransition {
        /// The request id
        request_id: RequestId,
        /// Current status
        from: RequestStatus,
        /// Attempted new status
        to: RequestStatus,
    },

    /// Another request already owns this code.
    ///
    /// Raised by the unique-code constraint on insert; the engine retries
    /// with a fresh sequence value a bounded number of times.
    #[error("request code '{code}' is already in use")]
    CodeConflict {
        /// The colliding code
        code: String,
    },

    /// The referenced sensor does not exist in the sensor store.
    #[error("sensor '{sensor_id}' not found")]
    SensorNotFound {
        /// The missing sensor id
        sensor_id: SensorId,
    },

    /// The storage backend is unavailable.
    #[error("storage unavailable: {details}")]
    Unavailable {
        /// What failed
        details: String,
    },
}
