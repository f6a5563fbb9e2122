//! Immutable audit trail of domain events.
//!
//! One entry per mutating action, appended after the action commits. Entries
//! carry a structured details payload with the business-relevant delta only
//! (titles, priorities, rejection reasons), never raw request bodies. The
//! engine is the sole writer; nothing mutates or deletes an entry once
//! appended. A failed append is an observability gap, not a business-rule
//! violation: the engine logs it and reports a degradation instead of
//! rolling back the committed transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::request::UserId;

// ============================================================================
// Audit Vocabulary
// ============================================================================

/// Domain events the engine records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    RequestCreated,
    RequestApproved,
    RequestRejected,
    RequestCancelled,
    SensorDeactivated,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestCreated => write!(f, "request_created"),
            Self::RequestApproved => write!(f, "request_approved"),
            Self::RequestRejected => write!(f, "request_rejected"),
            Self::RequestCancelled => write!(f, "request_cancelled"),
            Self::SensorDeactivated => write!(f, "sensor_deactivated"),
        }
    }
}

/// Kind of entity an audit entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditTargetType {
    Request,
    Sensor,
}

/// A single append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Who performed the action
    pub actor_id: UserId,
    /// What happened
    pub action: AuditAction,
    /// Kind of the affected entity
    pub target_type: AuditTargetType,
    /// Id of the affected entity (request id or sensor id)
    pub target_id: String,
    /// Structured key/value payload reconstructing the delta
    pub details: serde_json::Value,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// AuditRecorder
// ============================================================================

/// Errors from the audit backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The append could not be written.
    #[error("audit backend unavailable: {details}")]
    Unavailable {
        /// What failed
        details: String,
    },
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Appends one entry. Must never mutate or reorder existing entries.
    async fn record(
        &self,
        actor_id: UserId,
        action: AuditAction,
        target_type: AuditTargetType,
        target_id: String,
        details: serde_json::Value,
    ) -> Result<(), AuditError>;

    /// Entries for one target, in append order. Read surface for tests and
    /// operator reconciliation tooling.
    async fn entries_for(
        &self,
        target_type: AuditTargetType,
        target_id: &str,
    ) -> Result<Vec<AuditLogEntry>, AuditError>;
}

// ============================================================================
// InMemoryAuditLog
// ============================================================================

/// Append-only in-memory audit log.
///
/// A single `RwLock<Vec<_>>` rather than a keyed map: appends are strictly
/// ordered across all targets, matching what a database table with a
/// monotonic primary key gives the persistent implementation.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<Arc<AuditLogEntry>>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in append order.
    pub async fn entries(&self) -> Vec<Arc<AuditLogEntry>> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditRecorder for InMemoryAuditLog {
    async fn record(
        &self,
        actor_id: UserId,
        action: AuditAction,
        target_type: AuditTargetType,
        target_id: String,
        details: serde_json::Value,
    ) -> Result<(), AuditError> {
        let entry = Arc::new(AuditLogEntry {
            actor_id,
            action,
            target_type,
            target_id,
            details,
            created_at: Utc::now(),
        });
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries_for(
        &self,
        target_type: AuditTargetType,
        target_id: &str,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.target_type == target_type && e.target_id == target_id)
            .map(|e| (**e).clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn appends_in_order_and_filters_by_target() {
        let log = InMemoryAuditLog::new();

        log.record(
            UserId::new("alice"),
            AuditAction::RequestCreated,
            AuditTargetType::Request,
            "req_1".to_string(),
            json!({"title": "t", "priority": "high"}),
        )
        .await
        .unwrap();
        log.record(
            UserId::new("sam"),
            AuditAction::RequestApproved,
            AuditTargetType::Request,
            "req_1".to_string(),
            json!({}),
        )
        .await
        .unwrap();
        log.record(
            UserId::new("sam"),
            AuditAction::SensorDeactivated,
            AuditTargetType::Sensor,
            "vib-1".to_string(),
            json!({"request_id": "req_1"}),
        )
        .await
        .unwrap();

        let request_entries = log
            .entries_for(AuditTargetType::Request, "req_1")
            .await
            .unwrap();
        assert_eq!(request_entries.len(), 2);
        assert_eq!(request_entries[0].action, AuditAction::RequestCreated);
        assert_eq!(request_entries[1].action, AuditAction::RequestApproved);

        let sensor_entries = log
            .entries_for(AuditTargetType::Sensor, "vib-1")
            .await
            .unwrap();
        assert_eq!(sensor_entries.len(), 1);
        assert_eq!(sensor_entries[0].details["request_id"], "req_1");

        assert_eq!(log.entries().await.len(), 3);
    }
}
