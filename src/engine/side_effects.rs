//! State-contingent side effects of request transitions.
//!
//! One side effect exists today: an approval suppresses the targeted sensor.
//! The coordinator runs strictly after the approval commits, and its failure
//! never unwinds the approval: an approved request with a still-active
//! sensor is a degraded, operator-recoverable condition that stays visible
//! through the audit trail and a warning log.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::request::{BypassRequest, Deactivation, RequestError, SensorId, SensorStore};

// ============================================================================
// Side Effect Errors
// ============================================================================

/// Errors from side-effect execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SideEffectError {
    /// The sensor could not be set to inactive.
    #[error("deactivation of sensor '{sensor_id}' failed: {details}")]
    DeactivationFailed {
        /// The sensor that kept its status
        sensor_id: SensorId,
        /// What went wrong (missing sensor, store write failure)
        details: String,
    },
}

// ============================================================================
// SideEffectCoordinator
// ============================================================================

/// Executes and reports the sensor-deactivation side effect.
#[derive(Clone)]
pub struct SideEffectCoordinator {
    sensors: Arc<dyn SensorStore>,
}

impl SideEffectCoordinator {
    /// Creates a coordinator writing through the given sensor store.
    #[must_use]
    pub fn new(sensors: Arc<dyn SensorStore>) -> Self {
        Self { sensors }
    }

    /// Deactivates the approved request's sensor. Idempotent.
    ///
    /// Called exactly once per approval, never on rejection or cancellation.
    /// An already-inactive sensor is success, not an error, and the caller
    /// uses the returned [`Deactivation`] to avoid logging a duplicate
    /// deactivation audit entry.
    pub async fn on_approved(
        &self,
        request: &BypassRequest,
    ) -> Result<Deactivation, SideEffectError> {
        match self.sensors.deactivate(&request.sensor_id).await {
            Ok(Deactivation::Deactivated) => {
                info!(
                    request_id = %request.id,
                    sensor_id = %request.sensor_id,
                    "sensor deactivated for approved bypass"
                );
                Ok(Deactivation::Deactivated)
            }
            Ok(Deactivation::AlreadyInactive) => {
                debug!(
                    request_id = %request.id,
                    sensor_id = %request.sensor_id,
                    "sensor already inactive"
                );
                Ok(Deactivation::AlreadyInactive)
            }
            Err(err) => Err(SideEffectError::DeactivationFailed {
                sensor_id: request.sensor_id.clone(),
                details: match err {
                    RequestError::SensorNotFound { .. } => "sensor not found".to_string(),
                    other => other.to_string(),
                },
            }),
        }
    }
}
