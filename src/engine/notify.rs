//! Notification planning.
//!
//! The engine decides *who* hears about a state change and *what* the
//! message says; delivery (mail, SMS, push, chat) belongs to the external
//! [`Notifier`] collaborator, which consumes a [`NotificationPlan`] and owns
//! channel selection and retry. The engine treats dispatch as
//! fire-and-forget: a failed dispatch is logged and reported as a
//! degradation, never an operation failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::authz::{AuthorizationProvider, AuthzError, Tier};
use crate::request::{BypassRequest, UserId};

// ============================================================================
// Notification Plan
// ============================================================================

/// Which message template the dispatcher should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    RequestCreated,
    RequestApproved,
    RequestRejected,
    RequestCancelled,
}

/// A computed notification: recipients and content, no delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPlan {
    /// Deduplicated recipient list; the requester always comes first.
    pub recipients: Vec<UserId>,
    /// Message template to render
    pub kind: MessageKind,
    /// Structured template payload (code, title, status, reason)
    pub payload: serde_json::Value,
}

// ============================================================================
// Notifier
// ============================================================================

/// Errors from the delivery collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The plan could not be handed off for delivery.
    #[error("notification dispatch failed: {details}")]
    Dispatch {
        /// What failed
        details: String,
    },
}

/// External delivery collaborator. Fire-and-forget from the engine's
/// viewpoint.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hands a plan off for delivery.
    async fn dispatch(&self, plan: NotificationPlan) -> Result<(), NotifyError>;
}

/// Notifier that drops every plan. Default for deployments without a
/// delivery channel configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn dispatch(&self, _plan: NotificationPlan) -> Result<(), NotifyError> {
        Ok(())
    }
}

// ============================================================================
// NotificationPlanner
// ============================================================================

/// Computes recipient sets and message payloads for domain events.
#[derive(Clone)]
pub struct NotificationPlanner {
    authz: Arc<dyn AuthorizationProvider>,
}

impl NotificationPlanner {
    /// Creates a planner resolving recipients through the given provider.
    #[must_use]
    pub fn new(authz: Arc<dyn AuthorizationProvider>) -> Self {
        Self { authz }
    }

    /// Plan for a freshly created request.
    ///
    /// Recipients: the requester (confirmation) plus everyone whose tier
    /// meets or exceeds the request's required approval tier: supervisors
    /// and administrators for supervisor-tier requests, administrators only
    /// for administrator-tier ones.
    pub async fn plan_created(
        &self,
        request: &BypassRequest,
    ) -> Result<NotificationPlan, AuthzError> {
        let approvers = self
            .authz
            .users_with_tier_at_least(request.required_tier.required_actor_tier())
            .await?;

        Ok(NotificationPlan {
            recipients: dedup_recipients(&request.requester_id, approvers),
            kind: MessageKind::RequestCreated,
            payload: json!({
                "code": request.code,
                "title": request.title,
                "priority": request.priority,
                "required_tier": request.required_tier,
            }),
        })
    }

    /// Plan for a resolved request (approved, rejected, or cancelled).
    ///
    /// Recipients: the requester plus all administrators, regardless of the
    /// request's tier; administrators retain oversight of every decision.
    pub async fn plan_resolved(
        &self,
        request: &BypassRequest,
        kind: MessageKind,
    ) -> Result<NotificationPlan, AuthzError> {
        let admins = self
            .authz
            .users_with_tier_at_least(Tier::Administrator)
            .await?;

        Ok(NotificationPlan {
            recipients: dedup_recipients(&request.requester_id, admins),
            kind,
            payload: json!({
                "code": request.code,
                "title": request.title,
                "status": request.status,
                "validator_id": request.validator_id,
                "rejection_reason": request.rejection_reason,
            }),
        })
    }
}

/// Requester first, then the rest, with duplicates dropped.
fn dedup_recipients(requester: &UserId, others: Vec<UserId>) -> Vec<UserId> {
    let mut recipients = vec![requester.clone()];
    for user in others {
        if !recipients.contains(&user) {
            recipients.push(user);
        }
    }
    recipients
}
