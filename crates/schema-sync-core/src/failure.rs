//! # Consecutive Failure Tracking
//!
//! Counts object-store fetch failures in a row. Once the count reaches the
//! threshold every further failing cycle escalates, not just the first.
//!
//! ```text
//!  fail  fail  fail  fail  ok    fail
//!   1     2     3     4     0     1
//!               ▲     ▲
//!               └─────┴── should_escalate() == true
//! ```

/// Failures in a row before the fetch-error hook fires.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Process-local consecutive failure counter. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureTracker {
    count: u32,
    threshold: u32,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Records a fetch failure and returns the new count.
    pub fn record_failure(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    /// Resets the counter after a successful fetch.
    pub fn record_success(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// True while the count is at or above the threshold.
    pub fn should_escalate(&self) -> bool {
        self.count >= self.threshold
    }
}
