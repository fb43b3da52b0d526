//! Failure-detection strategies.
//!
//! Pure decision logic: given a stored [`ServiceSnapshot`] and the current
//! time, decide whether the circuit should stay closed, open, or admit a
//! half-open probe. Two strategies exist in this domain and no third is
//! expected, so they form a closed sum type rather than a trait hierarchy.

pub mod count;
pub mod rate;

pub use count::Count;
pub use rate::Rate;

use crate::storage::{CircuitState, ServiceSnapshot};
use serde::{Deserialize, Serialize};

/// Default cooldown before a probe is allowed after opening
pub const DEFAULT_INTERVAL_TO_HALF_OPEN_SECS: u64 = 5;

/// Strategy tag, the spelling used in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Count,
    Rate,
}

/// Outcome of a strategy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Traffic flows
    Closed,
    /// Traffic is rejected
    Open,
    /// Cooldown elapsed, one trial call may go through
    HalfOpenProbe,
}

/// Failure-detection rule bound to one protected service class
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Count(Count),
    Rate(Rate),
}

impl Strategy {
    /// Decide the circuit's disposition from the stored stats.
    ///
    /// In the closed state this is the variant-specific threshold check.
    /// Once open, both strategies share the half-open rule: report a probe
    /// as soon as the cooldown since the last failure has elapsed.
    pub fn evaluate(&self, stats: &ServiceSnapshot, now: u64) -> Decision {
        match stats.state {
            CircuitState::Closed => {
                if self.tripped(stats) {
                    Decision::Open
                } else {
                    Decision::Closed
                }
            }
            CircuitState::Open | CircuitState::HalfOpen => match stats.last_failure_at {
                Some(at) if now.saturating_sub(at) >= self.interval_to_half_open_secs() => {
                    Decision::HalfOpenProbe
                }
                Some(_) => Decision::Open,
                // open with no recorded failure time: nothing to wait on
                None => Decision::HalfOpenProbe,
            },
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Count(_) => StrategyKind::Count,
            Strategy::Rate(_) => StrategyKind::Rate,
        }
    }

    pub fn interval_to_half_open_secs(&self) -> u64 {
        match self {
            Strategy::Count(count) => count.interval_to_half_open_secs,
            Strategy::Rate(rate) => rate.interval_to_half_open_secs,
        }
    }

    /// Evaluation window, set only for the rate strategy
    pub fn window_secs(&self) -> Option<u64> {
        match self {
            Strategy::Count(_) => None,
            Strategy::Rate(rate) => Some(rate.time_window_secs),
        }
    }

    fn tripped(&self, stats: &ServiceSnapshot) -> bool {
        match self {
            Strategy::Count(count) => count.tripped(stats),
            Strategy::Rate(rate) => rate.tripped(stats),
        }
    }
}
