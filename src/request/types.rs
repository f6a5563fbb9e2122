//! Request domain types: identifiers, priority, risk ratings, and the
//! BypassRequest entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::RequestStatus;
use crate::authz::Tier;
use crate::error::EngineError;

// ============================================================================
// Identifiers
// ============================================================================

/// Length of the random id body (nanoid default alphabet).
const ID_BODY_LEN: usize = 21;

/// Opaque unique identifier of a bypass request.
///
/// Format: `req_<nanoid>`. Distinct from the human-readable [`code`]
/// (`BR-<year>-<sequence>`) assigned by the sequencer; the id never carries
/// business meaning and is safe to expose in URLs and logs.
///
/// [`code`]: BypassRequest::code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh request id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("req_{}", nanoid::nanoid!(ID_BODY_LEN)))
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// The raw string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifier of a user in the external identity system.
    UserId
}

string_id! {
    /// Identifier of a piece of equipment.
    EquipmentId
}

string_id! {
    /// Identifier of a safety sensor mounted on equipment.
    SensorId
}

// ============================================================================
// Priority and Tiers
// ============================================================================

/// Priority of a bypass request, fixed at creation.
///
/// Anything that is not one of these five values is rejected at the API
/// boundary before routing runs; the routing policy is total over this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
    Emergency,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
            Self::Emergency => write!(f, "emergency"),
        }
    }
}

/// Minimum approver tier a request must be cleared by.
///
/// Computed once from [`Priority`] at creation and never recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalTier {
    Supervisor,
    Administrator,
}

impl ApprovalTier {
    /// The authorization tier an actor needs to clear this approval tier.
    #[must_use]
    pub fn required_actor_tier(&self) -> Tier {
        match self {
            Self::Supervisor => Tier::Supervisor,
            Self::Administrator => Tier::Administrator,
        }
    }
}

impl std::fmt::Display for ApprovalTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Supervisor => write!(f, "supervisor"),
            Self::Administrator => write!(f, "administrator"),
        }
    }
}

/// Qualitative risk rating supplied by the requester for one impact axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRating {
    Negligible,
    Minor,
    Moderate,
    Major,
    Severe,
}

// ============================================================================
// Decision
// ============================================================================

/// Decision made by a validator on a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

// ============================================================================
// Creation Parameters
// ============================================================================

/// Input to `create_request`, as supplied by the caller.
///
/// Everything here except the scheduling window is stored verbatim on the
/// created entity. Validation happens in [`CreateParams::validate`] before
/// any write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateParams {
    /// Owning user
    pub requester_id: UserId,
    /// Short summary of the bypass
    pub title: String,
    /// Free-text description of why the bypass is needed
    pub description: String,
    /// Priority, drives approver-tier routing
    pub priority: Priority,
    /// Targeted equipment
    pub equipment_id: EquipmentId,
    /// Sensor to be suppressed on approval
    pub sensor_id: SensorId,
    /// Start of the bypass window
    pub planned_start: DateTime<Utc>,
    /// End of the bypass window, strictly after the start
    pub planned_end: DateTime<Utc>,
    /// Risk rating for personnel safety
    pub safety_impact: RiskRating,
    /// Risk rating for operations
    pub operational_impact: RiskRating,
    /// Risk rating for the environment
    pub environmental_impact: RiskRating,
    /// Ordered mitigation measures in effect during the bypass
    pub mitigation_measures: Vec<String>,
    /// Optional fallback plan if the bypass goes wrong
    pub contingency_plan: Option<String>,
}

impl CreateParams {
    /// Rejects malformed input before anything is written.
    ///
    /// Unknown priorities never reach this point: `Priority` is an enum, so
    /// out-of-vocabulary values fail deserialization at the API boundary.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.requester_id.as_str().trim().is_empty() {
            return Err(EngineError::validation("requester_id must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(EngineError::validation("title must not be empty"));
        }
        if self.equipment_id.as_str().trim().is_empty() {
            return Err(EngineError::validation("equipment_id must not be empty"));
        }
        if self.sensor_id.as_str().trim().is_empty() {
            return Err(EngineError::validation("sensor_id must not be empty"));
        }
        if self.planned_end <= self.planned_start {
            return Err(EngineError::validation(
                "planned_end must be strictly after planned_start",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// BypassRequest
// ============================================================================

/// A request to temporarily bypass a safety sensor.
///
/// The central entity of the engine. Every field except `status`,
/// `validator_id`, `validated_at`, and `rejection_reason` is immutable after
/// creation, and those four are only ever written by the state machine on
/// the single transition out of `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BypassRequest {
    // Identity
    /// Opaque unique id
    pub id: RequestId,
    /// Human-readable code, `BR-<year>-<sequence>`, globally unique and
    /// never reused even after cancellation
    pub code: String,
    /// Owning user
    pub requester_id: UserId,

    // Content
    /// Short summary
    pub title: String,
    /// Free-text description
    pub description: String,
    /// Priority, immutable
    pub priority: Priority,
    /// Targeted equipment
    pub equipment_id: EquipmentId,
    /// Sensor suppressed on approval
    pub sensor_id: SensorId,

    // Routing
    /// Minimum approver tier, a pure function of `priority` fixed at creation
    pub required_tier: ApprovalTier,

    // State
    /// Current lifecycle status, mutated only by the state machine
    pub status: RequestStatus,
    /// Validator who resolved the request, set exactly once
    pub validator_id: Option<UserId>,
    /// When the request was resolved, set exactly once
    pub validated_at: Option<DateTime<Utc>>,
    /// Reason supplied on rejection, set exactly once
    pub rejection_reason: Option<String>,

    // Scheduling
    /// Start of the bypass window
    pub planned_start: DateTime<Utc>,
    /// End of the bypass window
    pub planned_end: DateTime<Utc>,

    // Risk
    /// Risk rating for personnel safety
    pub safety_impact: RiskRating,
    /// Risk rating for operations
    pub operational_impact: RiskRating,
    /// Risk rating for the environment
    pub environmental_impact: RiskRating,
    /// Ordered mitigation measures
    pub mitigation_measures: Vec<String>,
    /// Optional fallback plan
    pub contingency_plan: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl BypassRequest {
    /// Builds a new pending request from validated creation parameters.
    ///
    /// The caller supplies the code (already reserved by the sequencer) and
    /// the required tier (already computed by the routing policy); both are
    /// immutable from here on.
    #[must_use]
    pub fn new(params: CreateParams, code: String, required_tier: ApprovalTier) -> Self {
        Self {
            id: RequestId::new(),
            code,
            requester_id: params.requester_id,
            title: params.title,
            description: params.description,
            priority: params.priority,
            equipment_id: params.equipment_id,
            sensor_id: params.sensor_id,
            required_tier,
            status: RequestStatus::Pending,
            validator_id: None,
            validated_at: None,
            rejection_reason: None,
            planned_start: params.planned_start,
            planned_end: params.planned_end,
            safety_impact: params.safety_impact,
            operational_impact: params.operational_impact,
            environmental_impact: params.environmental_impact,
            mitigation_measures: params.mitigation_measures,
            contingency_plan: params.contingency_plan,
            created_at: Utc::now(),
        }
    }
}
