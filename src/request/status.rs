//! Request lifecycle status and state machine.

use serde::{Deserialize, Serialize};

// ============================================================================
// Request Status
// ============================================================================

/// Lifecycle status of a bypass request.
///
/// State machine transitions:
/// - Pending → Approved (validator decision, tier-gated)
/// - Pending → Rejected (validator decision, tier-gated, reason required)
/// - Pending → Cancelled (requester or administrator)
/// - Approved → InProgress (work begins, driven by equipment-side tooling)
/// - InProgress → Completed (work ends, driven by equipment-side tooling)
///
/// The approval engine only ever writes the transitions out of `Pending`.
/// The `Approved → InProgress → Completed` leg belongs to external tooling
/// and goes through [`can_transition_to`](Self::can_transition_to) all the
/// same, so no caller can skip a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting a validator decision
    Pending,
    /// Validator approved the bypass
    Approved,
    /// Validator rejected the bypass
    Rejected,
    /// Bypass work is underway
    InProgress,
    /// Bypass work finished
    Completed,
    /// Withdrawn before a decision was made
    Cancelled,
}

impl RequestStatus {
    /// Returns true if the lifecycle has ended.
    ///
    /// Terminal requests are immutable; no further transition is valid.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Cancelled)
    }

    /// Returns true if a validator decision (or cancellation) has been made.
    ///
    /// A resolved request can never be validated again; a second
    /// `validate_request` call against it fails with `AlreadyResolved`.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    /// Checks if a transition from this status to another is valid.
    #[must_use]
    pub fn can_transition_to(&self, to: RequestStatus) -> bool {
        matches!(
            (self, to),
            // From Pending: the approval engine's write surface
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Pending, RequestStatus::Cancelled)
                // External work advancement
                | (RequestStatus::Approved, RequestStatus::InProgress)
                | (RequestStatus::InProgress, RequestStatus::Completed)
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
