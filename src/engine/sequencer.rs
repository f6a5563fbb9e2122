//! Human-readable request code issuance.
//!
//! Codes have the form `BR-<year>-<NNN>`: zero-padded to at least three
//! digits, incrementing by one per issued code within the year, and widening
//! past 999 instead of wrapping. Issuance serializes on the year only, so
//! two years never contend, and a reserved value is never handed out twice.
//! When the enclosing creation fails and retries, the retry draws a fresh
//! value and the skipped one is simply never used. Uniqueness of the
//! final code is enforced a second time by the request store's insert.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::config::EngineConfig;

// ============================================================================
// Sequence Errors
// ============================================================================

/// Errors from the sequence backend.
///
/// Deliberately narrow: running out of padding width is not an error (the
/// format widens), and conflicts are the store's to report. The only way
/// issuance fails is the counter backend being unavailable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// The counter backend could not reserve a value.
    #[error("sequence backend unavailable: {details}")]
    Backend {
        /// What failed
        details: String,
    },
}

// ============================================================================
// CodeSequencer
// ============================================================================

/// Issues unique, monotonically increasing request codes per year.
#[async_trait]
pub trait CodeSequencer: Send + Sync {
    /// Reserves the next sequence value for `year` and returns the formatted
    /// code.
    ///
    /// Safe under concurrent callers: two simultaneous reservations for the
    /// same year never observe the same value.
    async fn next_code(&self, year: i32) -> Result<String, SequenceError>;
}

/// Formats a reserved sequence value as a request code.
///
/// `min_width` controls the zero padding; values that need more digits take
/// them (`BR-2026-1000` after `BR-2026-999` at width 3), never truncating.
#[must_use]
pub fn format_code(year: i32, sequence: u64, min_width: usize) -> String {
    format!("BR-{year}-{sequence:0min_width$}")
}

// ============================================================================
// InMemoryCodeSequencer
// ============================================================================

/// Per-year atomic counters.
///
/// `fetch_add` on the year's counter is the reservation; there is no global
/// lock across years.
#[derive(Debug)]
pub struct InMemoryCodeSequencer {
    counters: DashMap<i32, AtomicU64>,
    min_width: usize,
}

impl InMemoryCodeSequencer {
    /// Creates a sequencer with the given minimum padding width.
    #[must_use]
    pub fn new(min_width: usize) -> Self {
        Self {
            counters: DashMap::new(),
            min_width,
        }
    }

    /// Creates a sequencer with the padding width the engine config carries,
    /// so the deployment that builds both hands the same tunables to each.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.min_sequence_width)
    }

    /// Pre-seeds a year's counter, e.g. when resuming from persisted state.
    ///
    /// The next issued sequence for that year is `last_issued + 1`.
    pub fn seed(&self, year: i32, last_issued: u64) {
        self.counters.insert(year, AtomicU64::new(last_issued));
    }
}

impl Default for InMemoryCodeSequencer {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl CodeSequencer for InMemoryCodeSequencer {
    async fn next_code(&self, year: i32) -> Result<String, SequenceError> {
        let counter = self.counters.entry(year).or_insert_with(|| AtomicU64::new(0));
        let sequence = counter.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(format_code(year, sequence, self.min_width))
    }
}
