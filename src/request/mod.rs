//! Bypass request domain: entity, status state machine, and storage.
//!
//! This module provides:
//! - The [`BypassRequest`] entity and its creation parameters
//! - The [`RequestStatus`] state machine with valid transitions
//! - Async [`RequestStore`] / [`SensorStore`] traits plus in-memory
//!   implementations with per-entry serialized transitions

pub mod error;
pub mod status;
pub mod store;
pub mod types;

pub use error::RequestError;
pub use status::RequestStatus;
pub use store::{
    Deactivation, InMemoryRequestStore, InMemorySensorStore, RequestStore, Resolution,
    SensorStatus, SensorStore,
};
pub use types::{
    ApprovalTier, BypassRequest, CreateParams, Decision, EquipmentId, Priority, RequestId,
    RiskRating, SensorId, UserId,
};

// ============================================================================
// Tests
// ============================================================================
