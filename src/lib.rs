//! Sensorgate: approval engine for safety-sensor bypass requests.
//!
//! Tracks requests to temporarily bypass a safety sensor on industrial
//! equipment and routes each one through a priority-dependent approval
//! pipeline before the bypass takes effect.
//!
//! This library provides:
//! - The [`BypassRequest`](request::BypassRequest) entity and its
//!   pending/approved/rejected lifecycle state machine
//! - Per-year unique request code issuance (`BR-<year>-<sequence>`)
//! - Priority → approver-tier routing
//! - Tier-gated, exactly-once validation and cancellation
//! - The post-approval sensor-deactivation side effect
//! - An immutable audit trail and notification planning
//!
//! Authentication, role storage, and notification delivery are external
//! collaborators behind the [`authz::AuthorizationProvider`],
//! [`request::RequestStore`] / [`request::SensorStore`], and
//! [`engine::Notifier`] seams.

pub mod authz;
pub mod config;
pub mod engine;
pub mod error;
pub mod request;

pub use authz::{AuthorizationProvider, StaticRoster, Tier};
pub use config::EngineConfig;
pub use engine::{BypassEngine, Outcome};
pub use error::{Degradation, EngineError};
