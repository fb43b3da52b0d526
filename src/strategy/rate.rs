use crate::storage::ServiceSnapshot;

/// Default evaluation window in seconds
pub const DEFAULT_TIME_WINDOW_SECS: u64 = 30;
/// Default failure percentage that opens the circuit
pub const DEFAULT_FAILURE_RATE_THRESHOLD: u8 = 50;
/// Default minimum sample size before the rate is trusted
pub const DEFAULT_MINIMUM_REQUESTS: u32 = 10;

/// Rate-based strategy.
///
/// Opens the circuit when the failure proportion within the trailing
/// window reaches the threshold. Services seeing fewer than
/// `minimum_requests` calls in the window are forced closed regardless of
/// the proportion, so low-traffic services do not trip on one or two
/// failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub time_window_secs: u64,
    /// Percentage, 0-100
    pub failure_rate_threshold: u8,
    pub minimum_requests: u32,
    pub interval_to_half_open_secs: u64,
}

impl Rate {
    pub(crate) fn tripped(&self, stats: &ServiceSnapshot) -> bool {
        let total = stats.success_count + stats.failure_count;
        if total < u64::from(self.minimum_requests) {
            return false;
        }
        // integer form of failure/total*100 >= threshold
        stats.failure_count * 100 >= u64::from(self.failure_rate_threshold) * total
    }
}
