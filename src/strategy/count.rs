use crate::storage::ServiceSnapshot;

/// Default failure count that opens the circuit
pub const DEFAULT_FAILURE_COUNT_THRESHOLD: u32 = 10;

/// Fixed-count strategy.
///
/// Opens the circuit the moment the failure counter reaches the threshold.
/// Successes forgive prior failures by decrementing the same counter
/// (floor-clamped at zero in storage), so the breaker reacts to sustained
/// failure bursts rather than isolated blips. No minimum sample size is
/// enforced, unlike [`super::Rate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count {
    pub failure_count_threshold: u32,
    pub interval_to_half_open_secs: u64,
}

impl Count {
    pub(crate) fn tripped(&self, stats: &ServiceSnapshot) -> bool {
        stats.failure_count >= u64::from(self.failure_count_threshold)
    }
}
