//! Request and sensor storage.
//!
//! The traits are the engine's only write path to persisted state. Both are
//! async so a database-backed implementation can slot in; the in-memory
//! implementations here back tests and single-node deployments and provide
//! the concurrency guarantees the engine relies on:
//!
//! - `insert` enforces code uniqueness (the sequencer's unique constraint)
//! - `resolve` serializes per request and re-checks `Pending` under the
//!   entry lock, so of two racing validators exactly one commits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::RequestError;
use super::status::RequestStatus;
use super::types::{BypassRequest, RequestId, SensorId, UserId};

// ============================================================================
// Resolution
// ============================================================================

/// The write applied on the single transition out of `Pending`.
///
/// Carries everything that is set exactly once: the new status, the acting
/// validator, the decision time, and (for rejections) the reason. The store
/// applies it atomically with the status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `pending → approved`
    Approve {
        /// The acting validator
        validator_id: UserId,
        /// Decision time
        validated_at: DateTime<Utc>,
    },
    /// `pending → rejected`
    Reject {
        /// The acting validator
        validator_id: UserId,
        /// Decision time
        validated_at: DateTime<Utc>,
        /// Non-empty reason (checked by the engine before the write)
        reason: String,
    },
    /// `pending → cancelled`
    ///
    /// Ownership-gated rather than tier-gated; the actor lands in the audit
    /// entry, not in `validator_id`.
    Cancel,
}

impl Resolution {
    /// The status this resolution commits.
    #[must_use]
    pub fn target_status(&self) -> RequestStatus {
        match self {
            Self::Approve { .. } => RequestStatus::Approved,
            Self::Reject { .. } => RequestStatus::Rejected,
            Self::Cancel => RequestStatus::Cancelled,
        }
    }
}

// ============================================================================
// RequestStore
// ============================================================================

/// Storage for [`BypassRequest`] entities.
///
/// All mutation goes through status-checked operations; there is no raw
/// field-update surface.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persists a new pending request.
    ///
    /// Fails with [`RequestError::CodeConflict`] if another request already
    /// owns the code; the engine retries with a fresh sequence value.
    async fn insert(&self, request: BypassRequest) -> Result<Arc<BypassRequest>, RequestError>;

    /// Fetches a request by id.
    async fn get(&self, id: &RequestId) -> Result<Arc<BypassRequest>, RequestError>;

    /// Applies the single transition out of `Pending`.
    ///
    /// The status check and the write are atomic with respect to other
    /// callers: of two racing resolutions exactly one succeeds and the other
    /// observes [`RequestError::AlreadyResolved`].
    async fn resolve(
        &self,
        id: &RequestId,
        resolution: Resolution,
    ) -> Result<Arc<BypassRequest>, RequestError>;

    /// Marks bypass work as underway (`approved → in_progress`).
    ///
    /// Driven by equipment-side tooling, not by the approval operations.
    async fn begin_work(&self, id: &RequestId) -> Result<Arc<BypassRequest>, RequestError>;

    /// Marks bypass work as finished (`in_progress → completed`).
    async fn complete_work(&self, id: &RequestId) -> Result<Arc<BypassRequest>, RequestError>;

    /// Lists a requester's requests, newest first, with offset pagination.
    async fn list_for_requester(
        &self,
        requester_id: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Arc<BypassRequest>>, RequestError>;
}

/// In-memory request store on `DashMap`.
///
/// Entries hold `Arc<BypassRequest>`; reads clone the `Arc`, mutations go
/// through `get_mut` + `Arc::make_mut` so the entry lock serializes
/// transitions per request without a global lock.
#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: DashMap<RequestId, Arc<BypassRequest>>,
    /// Unique-code constraint: code → owning request id.
    by_code: DashMap<String, RequestId>,
    /// Requester index for listing.
    by_requester: DashMap<UserId, Vec<RequestId>>,
}

impl InMemoryRequestStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if no requests are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Status-checked transition used by the work-advancement operations.
    fn advance(
        &self,
        id: &RequestId,
        to: RequestStatus,
    ) -> Result<Arc<BypassRequest>, RequestError> {
        let mut entry = self
            .requests
            .get_mut(id)
            .ok_or_else(|| RequestError::NotFound {
                request_id: id.clone(),
            })?;

        let from = entry.status;
        if !from.can_transition_to(to) {
            return Err(RequestError::InvalidTransition {
                request_id: id.clone(),
                from,
                to,
            });
        }

        Arc::make_mut(&mut entry).status = to;
        Ok(entry.clone())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: BypassRequest) -> Result<Arc<BypassRequest>, RequestError> {
        // Reserve the code first; the vacant-entry insert is the uniqueness
        // constraint. A lost race surfaces as CodeConflict for the engine to
        // retry.
        match self.by_code.entry(request.code.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RequestError::CodeConflict {
                    code: request.code.clone(),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(request.id.clone());
            }
        }

        let id = request.id.clone();
        let requester = request.requester_id.clone();
        let arc = Arc::new(request);
        self.requests.insert(id.clone(), arc.clone());
        self.by_requester.entry(requester).or_default().push(id);

        Ok(arc)
    }

    async fn get(&self, id: &RequestId) -> Result<Arc<BypassRequest>, RequestError> {
        self.requests
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| RequestError::NotFound {
                request_id: id.clone(),
            })
    }

    async fn resolve(
        &self,
        id: &RequestId,
        resolution: Resolution,
    ) -> Result<Arc<BypassRequest>, RequestError> {
        let mut entry = self
            .requests
            .get_mut(id)
            .ok_or_else(|| RequestError::NotFound {
                request_id: id.clone(),
            })?;

        // Re-check under the entry lock: this is the exactly-once gate.
        let from = entry.status;
        if from != RequestStatus::Pending {
            if from.is_resolved() {
                return Err(RequestError::AlreadyResolved {
                    request_id: id.clone(),
                    status: from,
                });
            }
            return Err(RequestError::InvalidTransition {
                request_id: id.clone(),
                from,
                to: resolution.target_status(),
            });
        }

        let request = Arc::make_mut(&mut entry);
        match resolution {
            Resolution::Approve {
                validator_id,
                validated_at,
            } => {
                request.status = RequestStatus::Approved;
                request.validator_id = Some(validator_id);
                request.validated_at = Some(validated_at);
            }
            Resolution::Reject {
                validator_id,
                validated_at,
                reason,
            } => {
                request.status = RequestStatus::Rejected;
                request.validator_id = Some(validator_id);
                request.validated_at = Some(validated_at);
                request.rejection_reason = Some(reason);
            }
            Resolution::Cancel => {
                request.status = RequestStatus::Cancelled;
            }
        }

        Ok(entry.clone())
    }

    async fn begin_work(&self, id: &RequestId) -> Result<Arc<BypassRequest>, RequestError> {
        self.advance(id, RequestStatus::InProgress)
    }

    async fn complete_work(&self, id: &RequestId) -> Result<Arc<BypassRequest>, RequestError> {
        self.advance(id, RequestStatus::Completed)
    }

    async fn list_for_requester(
        &self,
        requester_id: &UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Arc<BypassRequest>>, RequestError> {
        let ids = match self.by_requester.get(requester_id) {
            Some(ids) => ids.clone(),
            None => return Ok(Vec::new()),
        };

        let mut requests: Vec<Arc<BypassRequest>> = ids
            .iter()
            .filter_map(|id| self.requests.get(id).map(|e| e.clone()))
            .collect();

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(requests.into_iter().skip(offset).take(limit).collect())
    }
}

// ============================================================================
// SensorStore
// ============================================================================

/// Monitoring status of a safety sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    /// Sensor is monitoring
    Active,
    /// Sensor is suppressed by an approved bypass
    Inactive,
}

/// What a deactivation write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deactivation {
    /// The sensor went from active to inactive.
    Deactivated,
    /// The sensor was already inactive; nothing changed.
    AlreadyInactive,
}

/// Storage for sensor state.
///
/// The engine only ever writes one thing here: `inactive`, on approval.
/// Equipment-management endpoints own every other sensor mutation; a race
/// with one of those is last-writer-wins at this layer.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Current status of a sensor.
    async fn status(&self, id: &SensorId) -> Result<SensorStatus, RequestError>;

    /// Sets the sensor to `inactive`. Idempotent.
    async fn deactivate(&self, id: &SensorId) -> Result<Deactivation, RequestError>;
}

/// In-memory sensor store.
#[derive(Debug, Default)]
pub struct InMemorySensorStore {
    sensors: DashMap<SensorId, SensorStatus>,
}

impl InMemorySensorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sensor with the given status, replacing any previous
    /// registration.
    pub fn register(&self, id: SensorId, status: SensorStatus) {
        self.sensors.insert(id, status);
    }
}

#[async_trait]
impl SensorStore for InMemorySensorStore {
    async fn status(&self, id: &SensorId) -> Result<SensorStatus, RequestError> {
        self.sensors
            .get(id)
            .map(|entry| *entry)
            .ok_or_else(|| RequestError::SensorNotFound {
                sensor_id: id.clone(),
            })
    }

    async fn deactivate(&self, id: &SensorId) -> Result<Deactivation, RequestError> {
        let mut entry = self
            .sensors
            .get_mut(id)
            .ok_or_else(|| RequestError::SensorNotFound {
                sensor_id: id.clone(),
            })?;

        if *entry == SensorStatus::Inactive {
            return Ok(Deactivation::AlreadyInactive);
        }

        *entry = SensorStatus::Inactive;
        Ok(Deactivation::Deactivated)
    }
}
