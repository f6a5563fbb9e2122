//! Priority-to-tier routing policy.

use crate::request::{ApprovalTier, Priority};

/// Maps a request's priority to the minimum approver tier that must clear it.
///
/// Pure and total over the priority enum: routine work stays with the first
/// responsible tier, high-risk work escalates to the top tier automatically.
/// Never recomputed after creation; the result is frozen on the entity.
#[must_use]
pub fn required_tier(priority: Priority) -> ApprovalTier {
    match priority {
        Priority::Low | Priority::Normal | Priority::High => ApprovalTier::Supervisor,
        Priority::Critical | Priority::Emergency => ApprovalTier::Administrator,
    }
}
