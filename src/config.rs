//! Engine configuration.

// ============================================================================
// Engine Configuration
// ============================================================================

/// Tunables for the bypass engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many times creation retries a colliding request code before
    /// giving up with `CodeExhausted`.
    pub max_code_attempts: u32,
    /// Minimum zero-padded width of the per-year sequence number. Sequences
    /// past `10^width - 1` widen rather than wrap. Reaches the code format
    /// through
    /// [`InMemoryCodeSequencer::from_config`](crate::engine::InMemoryCodeSequencer::from_config).
    pub min_sequence_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_code_attempts: 3,
            min_sequence_width: 3,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SENSORGATE_MAX_CODE_ATTEMPTS` - code reservation retries (default: 3)
    /// - `SENSORGATE_MIN_SEQUENCE_WIDTH` - sequence zero-padding (default: 3)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_code_attempts = std::env::var("SENSORGATE_MAX_CODE_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_code_attempts);

        let min_sequence_width = std::env::var("SENSORGATE_MIN_SEQUENCE_WIDTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.min_sequence_width);

        Self {
            max_code_attempts,
            min_sequence_width,
        }
    }
}
