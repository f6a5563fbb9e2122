//! Engine-level error taxonomy.
//!
//! Four families with distinct caller semantics:
//! - `Validation` / `Unauthorized`: returned before any write; nothing was
//!   recorded.
//! - Conflicts (`AlreadyResolved`, `CodeExhausted`): the operation lost to an
//!   earlier or concurrent resolution, or code sequencing ran out of retries.
//! - `Dependency`: a collaborator failed before the primary state commit.
//!   After commit the same class of failure is reported as a [`Degradation`]
//!   on an `Ok` outcome instead, so callers can tell "not recorded" apart
//!   from "recorded, downstream effect delayed".

use thiserror::Error;

use crate::authz::AuthzError;
use crate::request::{RequestError, RequestId, RequestStatus, SensorId};

// ============================================================================
// EngineError
// ============================================================================

/// Errors returned by the engine's inbound operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or missing input; rejected before any write.
    #[error("validation failed: {details}")]
    Validation {
        /// What was wrong with the input
        details: String,
    },

    /// The actor lacks the required tier or ownership.
    #[error("unauthorized: {details}")]
    Unauthorized {
        /// Which check failed
        details: String,
    },

    /// No request with the given id exists.
    #[error("request '{request_id}' not found")]
    NotFound {
        /// The id that was looked up
        request_id: RequestId,
    },

    /// A validator decision (or cancellation) was already recorded.
    #[error("request '{request_id}' is already resolved as '{status}'")]
    AlreadyResolved {
        /// The request id
        request_id: RequestId,
        /// The status it was resolved to
        status: RequestStatus,
    },

    /// The request is not in a state the operation can act on.
    #[error("invalid transition for request '{request_id}': {from} -> {to}")]
    InvalidTransition {
        /// The request id
        request_id: RequestId,
        /// Current status
        from: RequestStatus,
        /// Attempted new status
        to: RequestStatus,
    },

    /// A rejection was submitted without a reason.
    #[error("a non-empty rejection reason is required")]
    MissingReason,

    /// Code sequencing kept colliding past the retry budget.
    #[error("could not reserve a unique request code after {attempts} attempts")]
    CodeExhausted {
        /// How many reservation attempts were made
        attempts: u32,
    },

    /// The per-year sequence backend is unavailable.
    #[error("code sequence unavailable: {details}")]
    SequenceExhausted {
        /// What failed
        details: String,
    },

    /// A collaborator failed before the primary state commit.
    #[error("dependency failure: {details}")]
    Dependency {
        /// What failed
        details: String,
    },
}

impl EngineError {
    /// Shorthand for a validation error.
    #[must_use]
    pub fn validation(details: impl Into<String>) -> Self {
        Self::Validation {
            details: details.into(),
        }
    }

    /// Shorthand for an authorization error.
    #[must_use]
    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::Unauthorized {
            details: details.into(),
        }
    }
}

impl From<RequestError> for EngineError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::NotFound { request_id } => Self::NotFound { request_id },
            RequestError::AlreadyResolved { request_id, status } => {
                Self::AlreadyResolved { request_id, status }
            }
            RequestError::InvalidTransition {
                request_id,
                from,
                to,
            } => Self::InvalidTransition {
                request_id,
                from,
                to,
            },
            // A raw code conflict only escapes once the engine's retry budget
            // is spent; map it to the bounded-retry error's dependency family.
            RequestError::CodeConflict { code } => Self::Dependency {
                details: format!("unretried code conflict on '{code}'"),
            },
            RequestError::SensorNotFound { sensor_id } => Self::Dependency {
                details: format!("sensor '{sensor_id}' not found"),
            },
            RequestError::Unavailable { details } => Self::Dependency { details },
        }
    }
}

impl From<AuthzError> for EngineError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::UnknownUser { user_id } => {
                Self::unauthorized(format!("user '{user_id}' unknown to identity system"))
            }
            AuthzError::Unavailable { details } => Self::Dependency { details },
        }
    }
}

// ============================================================================
// Degradation
// ============================================================================

/// A post-commit collaborator failure on an otherwise successful operation.
///
/// The primary state transition stands; the reported effect stays pending
/// until operator-facing reconciliation retries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// The approved request's sensor could not be deactivated.
    SensorDeactivationFailed {
        /// The sensor that kept its status
        sensor_id: SensorId,
        /// Why deactivation failed
        details: String,
    },

    /// The audit append failed; the transition is committed but unlogged.
    AuditWriteFailed {
        /// Why the append failed
        details: String,
    },

    /// The notification plan could not be handed to the dispatcher.
    NotificationDispatchFailed {
        /// Why dispatch failed
        details: String,
    },
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SensorDeactivationFailed { sensor_id, details } => {
                write!(f, "sensor '{sensor_id}' deactivation failed: {details}")
            }
            Self::AuditWriteFailed { details } => write!(f, "audit write failed: {details}"),
            Self::NotificationDispatchFailed { details } => {
                write!(f, "notification dispatch failed: {details}")
            }
        }
    }
}
