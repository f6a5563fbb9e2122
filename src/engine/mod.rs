//! The bypass approval engine.
//!
//! Coordinates the full lifecycle per inbound operation:
//!
//! ```text
//! create_request
//!     validate input → route tier → reserve code (retry on conflict)
//!     → persist pending request → audit RequestCreated
//!     → plan + dispatch notifications (requester + approver tier)
//!
//! validate_request / cancel_request
//!     load → status gate → authorization gate
//!     → commit transition (exactly once, store-serialized)
//!     → sensor deactivation (approval only, never rolls back)
//!     → audit transition (+ SensorDeactivated)
//!     → plan + dispatch notifications (requester + administrators)
//! ```
//!
//! Everything after the commit point is degradation-tolerant: audit, side
//! effect, and dispatch failures are logged, reported on the `Ok` outcome,
//! and left for operator reconciliation. They never revert the committed
//! transition.

pub mod audit;
pub mod notify;
pub mod routing;
pub mod sequencer;
pub mod side_effects;

pub use audit::{AuditAction, AuditError, AuditLogEntry, AuditRecorder, AuditTargetType, InMemoryAuditLog};
pub use notify::{MessageKind, NotificationPlan, NotificationPlanner, Notifier, NotifyError, NullNotifier};
pub use sequencer::{CodeSequencer, InMemoryCodeSequencer, SequenceError, format_code};
pub use side_effects::{SideEffectCoordinator, SideEffectError};

use chrono::{Datelike, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::authz::AuthorizationProvider;
use crate::config::EngineConfig;
use crate::error::{Degradation, EngineError};
use crate::request::{
    BypassRequest, CreateParams, Deactivation, Decision, RequestError, RequestId, RequestStatus,
    RequestStore, Resolution, SensorStore, UserId,
};

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a successful engine operation.
///
/// `degradations` is non-empty when the primary transition committed but a
/// downstream effect (audit append, sensor deactivation, notification
/// dispatch) failed and awaits reconciliation.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The request as persisted after the operation.
    pub request: Arc<BypassRequest>,
    /// Post-commit collaborator failures, if any.
    pub degradations: Vec<Degradation>,
}

impl Outcome {
    /// True if every downstream effect landed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.degradations.is_empty()
    }
}

// ============================================================================
// BypassEngine
// ============================================================================

/// The approval engine: creation, validation, and cancellation of bypass
/// requests, with routing, code issuance, side effects, audit, and
/// notification planning.
pub struct BypassEngine {
    config: EngineConfig,
    requests: Arc<dyn RequestStore>,
    sequencer: Arc<dyn CodeSequencer>,
    side_effects: SideEffectCoordinator,
    audit: Arc<dyn AuditRecorder>,
    authz: Arc<dyn AuthorizationProvider>,
    planner: NotificationPlanner,
    notifier: Arc<dyn Notifier>,
}

impl BypassEngine {
    /// Wires an engine from its collaborators.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        requests: Arc<dyn RequestStore>,
        sensors: Arc<dyn SensorStore>,
        sequencer: Arc<dyn CodeSequencer>,
        audit: Arc<dyn AuditRecorder>,
        authz: Arc<dyn AuthorizationProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            requests,
            sequencer,
            side_effects: SideEffectCoordinator::new(sensors),
            audit,
            planner: NotificationPlanner::new(authz.clone()),
            authz,
            notifier,
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Creates a new pending bypass request.
    ///
    /// Rejects malformed input before any write. The required approval tier
    /// is computed from the priority once, here, and frozen on the entity.
    /// Code reservation and persistence race against concurrent creators:
    /// a lost race on the unique-code constraint draws a fresh sequence
    /// value, up to the configured attempt budget.
    pub async fn create_request(&self, params: CreateParams) -> Result<Outcome, EngineError> {
        params.validate()?;

        let required_tier = routing::required_tier(params.priority);
        let year = Utc::now().year();

        let mut attempts = 0;
        let request = loop {
            attempts += 1;
            if attempts > self.config.max_code_attempts {
                return Err(EngineError::CodeExhausted {
                    attempts: self.config.max_code_attempts,
                });
            }

            let code = self.sequencer.next_code(year).await.map_err(|err| {
                EngineError::SequenceExhausted {
                    details: err.to_string(),
                }
            })?;

            let candidate = BypassRequest::new(params.clone(), code, required_tier);
            match self.requests.insert(candidate).await {
                Ok(request) => break request,
                Err(RequestError::CodeConflict { code }) => {
                    warn!(%code, attempt = attempts, "request code conflict, retrying");
                }
                Err(other) => return Err(other.into()),
            }
        };

        info!(
            request_id = %request.id,
            code = %request.code,
            priority = %request.priority,
            required_tier = %request.required_tier,
            "bypass request created"
        );

        let mut degradations = Vec::new();
        self.record_audit(
            &mut degradations,
            request.requester_id.clone(),
            AuditAction::RequestCreated,
            AuditTargetType::Request,
            request.id.to_string(),
            json!({
                "code": request.code,
                "title": request.title,
                "priority": request.priority,
            }),
        )
        .await;

        self.dispatch_created(&mut degradations, &request).await;

        Ok(Outcome {
            request,
            degradations,
        })
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Applies a validator decision to a pending request.
    ///
    /// Exactly once: of two racing calls only one commits, the other gets
    /// `AlreadyResolved`. The tier gate compares the actor's authorization
    /// tier against the request's frozen required tier; a supervisor cannot
    /// clear an administrator-tier request. Rejection requires a non-empty
    /// reason. On approval the sensor deactivation runs strictly after the
    /// commit and never rolls it back.
    pub async fn validate_request(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
        decision: Decision,
        rejection_reason: Option<String>,
    ) -> Result<Outcome, EngineError> {
        let request = self.requests.get(request_id).await?;

        // Status gate first: a resolved request is stale no matter who asks.
        let target = match decision {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        };
        self.gate_pending(&request, target, false)?;

        // Tier gate.
        let actor_tier = self.authz.tier_of(actor_id).await?;
        let needed = request.required_tier.required_actor_tier();
        if !actor_tier.at_least(needed) {
            return Err(EngineError::unauthorized(format!(
                "tier '{actor_tier}' cannot validate a request requiring '{}'",
                request.required_tier
            )));
        }

        // Reason gate, before any write.
        let resolution = match decision {
            Decision::Approved => Resolution::Approve {
                validator_id: actor_id.clone(),
                validated_at: Utc::now(),
            },
            Decision::Rejected => {
                let reason = rejection_reason
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .ok_or(EngineError::MissingReason)?;
                Resolution::Reject {
                    validator_id: actor_id.clone(),
                    validated_at: Utc::now(),
                    reason,
                }
            }
        };

        // Commit point. The store re-checks `pending` under its entry lock,
        // so a racer that got past the gate above loses here.
        let updated = self.requests.resolve(request_id, resolution).await?;

        info!(
            request_id = %updated.id,
            code = %updated.code,
            status = %updated.status,
            validator_id = %actor_id,
            "bypass request resolved"
        );

        let mut degradations = Vec::new();
        match updated.status {
            RequestStatus::Approved => {
                let deactivation = self
                    .run_sensor_deactivation(&mut degradations, &updated)
                    .await;

                self.record_audit(
                    &mut degradations,
                    actor_id.clone(),
                    AuditAction::RequestApproved,
                    AuditTargetType::Request,
                    updated.id.to_string(),
                    json!({
                        "code": updated.code,
                        "sensor_id": updated.sensor_id,
                        "sensor_deactivation": match deactivation {
                            Some(Deactivation::Deactivated) => "deactivated",
                            Some(Deactivation::AlreadyInactive) => "already_inactive",
                            None => "failed",
                        },
                    }),
                )
                .await;

                // One deactivation entry per approval, tied to this decision;
                // an already-inactive sensor does not add a second.
                if deactivation.is_some() {
                    self.record_audit(
                        &mut degradations,
                        actor_id.clone(),
                        AuditAction::SensorDeactivated,
                        AuditTargetType::Sensor,
                        updated.sensor_id.to_string(),
                        json!({
                            "request_id": updated.id,
                            "code": updated.code,
                            "already_inactive":
                                deactivation == Some(Deactivation::AlreadyInactive),
                        }),
                    )
                    .await;
                }

                self.dispatch_resolved(&mut degradations, &updated, MessageKind::RequestApproved)
                    .await;
            }
            RequestStatus::Rejected => {
                self.record_audit(
                    &mut degradations,
                    actor_id.clone(),
                    AuditAction::RequestRejected,
                    AuditTargetType::Request,
                    updated.id.to_string(),
                    json!({
                        "code": updated.code,
                        "rejection_reason": updated.rejection_reason,
                    }),
                )
                .await;

                self.dispatch_resolved(&mut degradations, &updated, MessageKind::RequestRejected)
                    .await;
            }
            // The store only commits the two statuses above from a resolve.
            other => {
                warn!(request_id = %updated.id, status = %other, "unexpected post-resolve status");
            }
        }

        Ok(Outcome {
            request: updated,
            degradations,
        })
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Withdraws a pending request.
    ///
    /// Only the original requester or an administrator may cancel, and only
    /// while the request is still pending. Any other state, including a
    /// prior cancellation, is `InvalidTransition`.
    pub async fn cancel_request(
        &self,
        request_id: &RequestId,
        actor_id: &UserId,
    ) -> Result<Outcome, EngineError> {
        let request = self.requests.get(request_id).await?;

        self.gate_pending(&request, RequestStatus::Cancelled, true)?;

        if *actor_id != request.requester_id {
            let actor_tier = self.authz.tier_of(actor_id).await?;
            if actor_tier != crate::authz::Tier::Administrator {
                return Err(EngineError::unauthorized(
                    "only the requester or an administrator may cancel",
                ));
            }
        }

        let updated = match self.requests.resolve(request_id, Resolution::Cancel).await {
            Ok(updated) => updated,
            // A racer resolved it first; for cancellation that reads as an
            // invalid transition, not a stale decision.
            Err(RequestError::AlreadyResolved { request_id, status }) => {
                return Err(EngineError::InvalidTransition {
                    request_id,
                    from: status,
                    to: RequestStatus::Cancelled,
                });
            }
            Err(other) => return Err(other.into()),
        };

        info!(
            request_id = %updated.id,
            code = %updated.code,
            actor_id = %actor_id,
            "bypass request cancelled"
        );

        let mut degradations = Vec::new();
        self.record_audit(
            &mut degradations,
            actor_id.clone(),
            AuditAction::RequestCancelled,
            AuditTargetType::Request,
            updated.id.to_string(),
            json!({ "code": updated.code }),
        )
        .await;

        self.dispatch_resolved(&mut degradations, &updated, MessageKind::RequestCancelled)
            .await;

        Ok(Outcome {
            request: updated,
            degradations,
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Pre-commit status gate.
    ///
    /// `cancelling` flattens `AlreadyResolved` into `InvalidTransition`: a
    /// second cancel (or a cancel after a decision) is a transition problem,
    /// while a second validation is a stale decision.
    fn gate_pending(
        &self,
        request: &BypassRequest,
        target: RequestStatus,
        cancelling: bool,
    ) -> Result<(), EngineError> {
        let status = request.status;
        if status == RequestStatus::Pending {
            return Ok(());
        }
        if status.is_resolved() && !cancelling {
            return Err(EngineError::AlreadyResolved {
                request_id: request.id.clone(),
                status,
            });
        }
        Err(EngineError::InvalidTransition {
            request_id: request.id.clone(),
            from: status,
            to: target,
        })
    }

    /// Runs the post-approval sensor deactivation; `None` means it failed
    /// and a degradation was recorded.
    async fn run_sensor_deactivation(
        &self,
        degradations: &mut Vec<Degradation>,
        request: &BypassRequest,
    ) -> Option<Deactivation> {
        match self.side_effects.on_approved(request).await {
            Ok(outcome) => Some(outcome),
            Err(SideEffectError::DeactivationFailed { sensor_id, details }) => {
                warn!(
                    request_id = %request.id,
                    sensor_id = %sensor_id,
                    %details,
                    "sensor deactivation failed; approval stands, reconciliation required"
                );
                degradations.push(Degradation::SensorDeactivationFailed { sensor_id, details });
                None
            }
        }
    }

    /// Appends an audit entry, degrading instead of failing the operation.
    async fn record_audit(
        &self,
        degradations: &mut Vec<Degradation>,
        actor_id: UserId,
        action: AuditAction,
        target_type: AuditTargetType,
        target_id: String,
        details: serde_json::Value,
    ) {
        if let Err(err) = self
            .audit
            .record(actor_id, action, target_type, target_id, details)
            .await
        {
            warn!(%action, %err, "audit append failed");
            degradations.push(Degradation::AuditWriteFailed {
                details: err.to_string(),
            });
        }
    }

    /// Plans and dispatches creation notifications; dispatch is
    /// fire-and-forget, failures degrade.
    async fn dispatch_created(
        &self,
        degradations: &mut Vec<Degradation>,
        request: &BypassRequest,
    ) {
        let plan = match self.planner.plan_created(request).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(request_id = %request.id, %err, "notification planning failed");
                degradations.push(Degradation::NotificationDispatchFailed {
                    details: err.to_string(),
                });
                return;
            }
        };
        if let Err(err) = self.notifier.dispatch(plan).await {
            warn!(request_id = %request.id, %err, "notification dispatch failed");
            degradations.push(Degradation::NotificationDispatchFailed {
                details: err.to_string(),
            });
        }
    }

    /// Plans and dispatches resolution notifications.
    async fn dispatch_resolved(
        &self,
        degradations: &mut Vec<Degradation>,
        request: &BypassRequest,
        kind: MessageKind,
    ) {
        let plan = match self.planner.plan_resolved(request, kind).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(request_id = %request.id, %err, "notification planning failed");
                degradations.push(Degradation::NotificationDispatchFailed {
                    details: err.to_string(),
                });
                return;
            }
        };
        if let Err(err) = self.notifier.dispatch(plan).await {
            warn!(request_id = %request.id, %err, "notification dispatch failed");
            degradations.push(Degradation::NotificationDispatchFailed {
                details: err.to_string(),
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{StaticRoster, Tier};
    use crate::request::{
        ApprovalTier, EquipmentId, InMemoryRequestStore, InMemorySensorStore, Priority,
        RiskRating, SensorId, SensorStatus,
    };
    use async_trait::async_trait;
    use chrono::Duration;

    struct Fixture {
        engine: BypassEngine,
        sensors: Arc<InMemorySensorStore>,
        audit: Arc<InMemoryAuditLog>,
    }

    fn roster() -> Arc<StaticRoster> {
        let roster = StaticRoster::new();
        roster.assign(UserId::new("admin"), Tier::Administrator);
        roster.assign(UserId::new("super"), Tier::Supervisor);
        roster.assign(UserId::new("alice"), Tier::User);
        roster.assign(UserId::new("bob"), Tier::User);
        Arc::new(roster)
    }

    fn fixture() -> Fixture {
        fixture_with_sequencer(Arc::new(InMemoryCodeSequencer::from_config(
            &EngineConfig::default(),
        )))
    }

    fn fixture_with_sequencer(sequencer: Arc<dyn CodeSequencer>) -> Fixture {
        let sensors = Arc::new(InMemorySensorStore::new());
        sensors.register(SensorId::new("vib-1"), SensorStatus::Active);
        let audit = Arc::new(InMemoryAuditLog::new());

        let engine = BypassEngine::new(
            EngineConfig::default(),
            Arc::new(InMemoryRequestStore::new()),
            sensors.clone(),
            sequencer,
            audit.clone(),
            roster(),
            Arc::new(NullNotifier),
        );

        Fixture {
            engine,
            sensors,
            audit,
        }
    }

    fn params(priority: Priority) -> CreateParams {
        let now = Utc::now();
        CreateParams {
            requester_id: UserId::new("alice"),
            title: "Bypass vibration sensor".to_string(),
            description: "Bearing swap on pump P-101".to_string(),
            priority,
            equipment_id: EquipmentId::new("pump-p101"),
            sensor_id: SensorId::new("vib-1"),
            planned_start: now + Duration::hours(1),
            planned_end: now + Duration::hours(4),
            safety_impact: RiskRating::Minor,
            operational_impact: RiskRating::Moderate,
            environmental_impact: RiskRating::Negligible,
            mitigation_measures: vec!["hourly manual check".to_string()],
            contingency_plan: None,
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    #[tokio::test]
    async fn create_assigns_code_and_routes_tier() {
        let fx = fixture();

        let outcome = fx.engine.create_request(params(Priority::High)).await.unwrap();
        let request = &outcome.request;

        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.required_tier, ApprovalTier::Supervisor);
        let year = Utc::now().year();
        assert_eq!(request.code, format!("BR-{year}-001"));
        assert!(outcome.is_clean());

        let critical = fx
            .engine
            .create_request(params(Priority::Critical))
            .await
            .unwrap();
        assert_eq!(critical.request.required_tier, ApprovalTier::Administrator);
        assert_eq!(critical.request.code, format!("BR-{year}-002"));
    }

    #[tokio::test]
    async fn create_honors_configured_sequence_width() {
        let config = EngineConfig {
            max_code_attempts: 3,
            min_sequence_width: 5,
        };
        let sensors = Arc::new(InMemorySensorStore::new());
        sensors.register(SensorId::new("vib-1"), SensorStatus::Active);
        let engine = BypassEngine::new(
            config.clone(),
            Arc::new(InMemoryRequestStore::new()),
            sensors,
            Arc::new(InMemoryCodeSequencer::from_config(&config)),
            Arc::new(InMemoryAuditLog::new()),
            roster(),
            Arc::new(NullNotifier),
        );

        let outcome = engine.create_request(params(Priority::Low)).await.unwrap();
        let year = Utc::now().year();
        assert_eq!(outcome.request.code, format!("BR-{year}-00001"));
    }

    #[tokio::test]
    async fn create_rejects_invalid_window_before_any_write() {
        let fx = fixture();

        let mut bad = params(Priority::Low);
        bad.planned_end = bad.planned_start;
        let result = fx.engine.create_request(bad).await;
        assert!(matches!(result, Err(EngineError::Validation { .. })));

        // Nothing was written, not even an audit entry
        assert!(fx.audit.entries().await.is_empty());
    }

    #[tokio::test]
    async fn create_audits_creation() {
        let fx = fixture();
        let outcome = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        let entries = fx
            .audit
            .entries_for(AuditTargetType::Request, outcome.request.id.as_str())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::RequestCreated);
        assert_eq!(entries[0].details["title"], "Bypass vibration sensor");
        assert_eq!(entries[0].details["priority"], "low");
    }

    /// Sequencer that issues a colliding code before recovering, to exercise
    /// the engine's bounded retry.
    struct CollidingSequencer {
        inner: InMemoryCodeSequencer,
        collisions: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl CodeSequencer for CollidingSequencer {
        async fn next_code(&self, year: i32) -> Result<String, SequenceError> {
            if self
                .collisions
                .fetch_update(
                    std::sync::atomic::Ordering::SeqCst,
                    std::sync::atomic::Ordering::SeqCst,
                    |n| if n > 0 { Some(n - 1) } else { None },
                )
                .is_ok()
            {
                // Hand out the value the previous creation already took
                return Ok(format_code(year, 1, 3));
            }
            self.inner.next_code(year).await
        }
    }

    #[tokio::test]
    async fn create_retries_code_conflicts() {
        let sequencer = Arc::new(CollidingSequencer {
            inner: InMemoryCodeSequencer::default(),
            collisions: std::sync::atomic::AtomicU32::new(0),
        });
        let fx = fixture_with_sequencer(sequencer.clone());

        // First creation owns sequence 1
        let first = fx.engine.create_request(params(Priority::Low)).await.unwrap();
        assert!(first.request.code.ends_with("-001"));

        // Next creation is handed the taken code once, then succeeds on the
        // retry with a fresh value
        sequencer.collisions.store(1, std::sync::atomic::Ordering::SeqCst);
        let second = fx.engine.create_request(params(Priority::Low)).await.unwrap();
        assert!(second.request.code.ends_with("-002"));
        assert!(second.is_clean());
    }

    #[tokio::test]
    async fn create_gives_up_after_retry_budget() {
        // Always collides: every issued code repeats sequence 1
        struct StuckSequencer;

        #[async_trait]
        impl CodeSequencer for StuckSequencer {
            async fn next_code(&self, year: i32) -> Result<String, SequenceError> {
                Ok(format_code(year, 1, 3))
            }
        }

        let fx = fixture_with_sequencer(Arc::new(StuckSequencer));

        fx.engine.create_request(params(Priority::Low)).await.unwrap();
        let result = fx.engine.create_request(params(Priority::Low)).await;
        assert!(matches!(
            result,
            Err(EngineError::CodeExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn sequencer_outage_surfaces_as_sequence_exhausted() {
        struct DownSequencer;

        #[async_trait]
        impl CodeSequencer for DownSequencer {
            async fn next_code(&self, _year: i32) -> Result<String, SequenceError> {
                Err(SequenceError::Backend {
                    details: "counter store offline".to_string(),
                })
            }
        }

        let fx = fixture_with_sequencer(Arc::new(DownSequencer));
        let result = fx.engine.create_request(params(Priority::Low)).await;
        assert!(matches!(result, Err(EngineError::SequenceExhausted { .. })));
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[tokio::test]
    async fn supervisor_approves_supervisor_tier() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::High)).await.unwrap();

        let outcome = fx
            .engine
            .validate_request(
                &created.request.id,
                &UserId::new("super"),
                Decision::Approved,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.request.status, RequestStatus::Approved);
        assert_eq!(outcome.request.validator_id, Some(UserId::new("super")));
        assert!(outcome.request.validated_at.is_some());
        assert!(outcome.is_clean());

        assert_eq!(
            fx.sensors.status(&SensorId::new("vib-1")).await.unwrap(),
            SensorStatus::Inactive
        );
    }

    #[tokio::test]
    async fn supervisor_cannot_approve_administrator_tier() {
        let fx = fixture();
        let created = fx
            .engine
            .create_request(params(Priority::Critical))
            .await
            .unwrap();

        let result = fx
            .engine
            .validate_request(
                &created.request.id,
                &UserId::new("super"),
                Decision::Approved,
                None,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized { .. })));

        // State unchanged, sensor untouched
        let request = fx.engine.requests.get(&created.request.id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(
            fx.sensors.status(&SensorId::new("vib-1")).await.unwrap(),
            SensorStatus::Active
        );
    }

    #[tokio::test]
    async fn administrator_approves_either_tier() {
        let fx = fixture();
        let created = fx
            .engine
            .create_request(params(Priority::Emergency))
            .await
            .unwrap();

        let outcome = fx
            .engine
            .validate_request(
                &created.request.id,
                &UserId::new("admin"),
                Decision::Approved,
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.request.status, RequestStatus::Approved);
    }

    #[tokio::test]
    async fn plain_user_cannot_validate() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        let result = fx
            .engine
            .validate_request(
                &created.request.id,
                &UserId::new("bob"),
                Decision::Approved,
                None,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn rejection_requires_a_reason() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        for reason in [None, Some(String::new()), Some("   ".to_string())] {
            let result = fx
                .engine
                .validate_request(
                    &created.request.id,
                    &UserId::new("super"),
                    Decision::Rejected,
                    reason,
                )
                .await;
            assert!(matches!(result, Err(EngineError::MissingReason)));
        }

        // Still pending after every failed attempt
        let request = fx.engine.requests.get(&created.request.id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn rejection_records_reason_and_skips_side_effect() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        let outcome = fx
            .engine
            .validate_request(
                &created.request.id,
                &UserId::new("super"),
                Decision::Rejected,
                Some("No isolation in place".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(outcome.request.status, RequestStatus::Rejected);
        assert_eq!(
            outcome.request.rejection_reason.as_deref(),
            Some("No isolation in place")
        );
        // Rejection never touches the sensor
        assert_eq!(
            fx.sensors.status(&SensorId::new("vib-1")).await.unwrap(),
            SensorStatus::Active
        );
    }

    #[tokio::test]
    async fn second_validation_is_already_resolved() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        fx.engine
            .validate_request(
                &created.request.id,
                &UserId::new("super"),
                Decision::Approved,
                None,
            )
            .await
            .unwrap();

        let result = fx
            .engine
            .validate_request(
                &created.request.id,
                &UserId::new("admin"),
                Decision::Rejected,
                Some("changed my mind".to_string()),
            )
            .await;
        assert!(matches!(
            result,
            Err(EngineError::AlreadyResolved {
                status: RequestStatus::Approved,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn validating_unknown_request_is_not_found() {
        let fx = fixture();
        let result = fx
            .engine
            .validate_request(
                &RequestId::new(),
                &UserId::new("admin"),
                Decision::Approved,
                None,
            )
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    #[tokio::test]
    async fn requester_cancels_own_pending_request() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        let outcome = fx
            .engine
            .cancel_request(&created.request.id, &UserId::new("alice"))
            .await
            .unwrap();
        assert_eq!(outcome.request.status, RequestStatus::Cancelled);
        // Cancellation is not a validator decision
        assert!(outcome.request.validator_id.is_none());
        assert!(outcome.request.validated_at.is_none());
    }

    #[tokio::test]
    async fn second_cancel_is_invalid_transition() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        fx.engine
            .cancel_request(&created.request.id, &UserId::new("alice"))
            .await
            .unwrap();

        let result = fx
            .engine
            .cancel_request(&created.request.id, &UserId::new("alice"))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidTransition {
                from: RequestStatus::Cancelled,
                to: RequestStatus::Cancelled,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn administrator_may_cancel_anyones_request() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        let outcome = fx
            .engine
            .cancel_request(&created.request.id, &UserId::new("admin"))
            .await
            .unwrap();
        assert_eq!(outcome.request.status, RequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn stranger_cannot_cancel() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        let result = fx
            .engine
            .cancel_request(&created.request.id, &UserId::new("bob"))
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized { .. })));

        // Supervisors hold no special cancellation right either
        let result = fx
            .engine
            .cancel_request(&created.request.id, &UserId::new("super"))
            .await;
        assert!(matches!(result, Err(EngineError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn cancel_after_approval_is_invalid_transition() {
        let fx = fixture();
        let created = fx.engine.create_request(params(Priority::Low)).await.unwrap();

        fx.engine
            .validate_request(
                &created.request.id,
                &UserId::new("super"),
                Decision::Approved,
                None,
            )
            .await
            .unwrap();

        let result = fx
            .engine
            .cancel_request(&created.request.id, &UserId::new("alice"))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::InvalidTransition {
                from: RequestStatus::Approved,
                ..
            })
        ));
    }
}
