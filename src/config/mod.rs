use crate::error::{FuseError, Result};
use crate::strategy::{
    count::DEFAULT_FAILURE_COUNT_THRESHOLD,
    rate::{DEFAULT_FAILURE_RATE_THRESHOLD, DEFAULT_MINIMUM_REQUESTS, DEFAULT_TIME_WINDOW_SECS},
    Count, Rate, Strategy, StrategyKind, DEFAULT_INTERVAL_TO_HALF_OPEN_SECS,
};
use serde::{Deserialize, Serialize};

/// Declarative breaker settings for one protected service class.
///
/// This is the configuration surface consumed at setup time: a strategy
/// kind plus its thresholds, with unset fields falling back to
/// strategy-defined defaults. [`BreakerSettings::validate`] resolves it
/// into an immutable [`BreakerConfig`]; the core never re-reads
/// configuration per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Strategy kind, spelled `count` or `rate` in config files
    pub strategy: StrategyKind,

    /// Count only: failures that open the circuit
    #[serde(default)]
    pub failure_count_threshold: Option<u32>,

    /// Rate only: trailing evaluation window in seconds
    #[serde(default)]
    pub time_window_secs: Option<u64>,

    /// Rate only: failure percentage (0-100) that opens the circuit
    #[serde(default)]
    pub failure_rate_threshold: Option<u8>,

    /// Rate only: minimum calls in the window before the rate is trusted
    #[serde(default)]
    pub minimum_requests: Option<u32>,

    /// Cooldown in seconds before a probe is allowed after opening
    #[serde(default)]
    pub interval_to_half_open_secs: Option<u64>,
}

impl BreakerSettings {
    /// Count-strategy settings with strategy-defined defaults
    pub fn count() -> Self {
        Self {
            strategy: StrategyKind::Count,
            failure_count_threshold: None,
            time_window_secs: None,
            failure_rate_threshold: None,
            minimum_requests: None,
            interval_to_half_open_secs: None,
        }
    }

    /// Rate-strategy settings with strategy-defined defaults
    pub fn rate() -> Self {
        Self {
            strategy: StrategyKind::Rate,
            ..Self::count()
        }
    }

    /// Resolve into an immutable config, rejecting contradictory or
    /// out-of-range settings. Fields belonging to the other strategy are
    /// an error, never silently defaulted into ambiguous behavior.
    pub fn validate(&self) -> Result<BreakerConfig> {
        let interval_to_half_open_secs = self
            .interval_to_half_open_secs
            .unwrap_or(DEFAULT_INTERVAL_TO_HALF_OPEN_SECS);
        if interval_to_half_open_secs == 0 {
            return Err(FuseError::Config(
                "interval_to_half_open_secs must be greater than zero".to_string(),
            ));
        }

        let strategy = match self.strategy {
            StrategyKind::Count => {
                if self.time_window_secs.is_some()
                    || self.failure_rate_threshold.is_some()
                    || self.minimum_requests.is_some()
                {
                    return Err(FuseError::Config(
                        "count strategy does not accept time_window_secs, \
                         failure_rate_threshold, or minimum_requests"
                            .to_string(),
                    ));
                }

                let failure_count_threshold = self
                    .failure_count_threshold
                    .unwrap_or(DEFAULT_FAILURE_COUNT_THRESHOLD);
                if failure_count_threshold == 0 {
                    return Err(FuseError::Config(
                        "failure_count_threshold must be greater than zero".to_string(),
                    ));
                }

                Strategy::Count(Count {
                    failure_count_threshold,
                    interval_to_half_open_secs,
                })
            }
            StrategyKind::Rate => {
                if self.failure_count_threshold.is_some() {
                    return Err(FuseError::Config(
                        "rate strategy does not accept failure_count_threshold".to_string(),
                    ));
                }

                let time_window_secs = self.time_window_secs.unwrap_or(DEFAULT_TIME_WINDOW_SECS);
                if time_window_secs == 0 {
                    return Err(FuseError::Config(
                        "time_window_secs must be greater than zero".to_string(),
                    ));
                }

                let failure_rate_threshold = self
                    .failure_rate_threshold
                    .unwrap_or(DEFAULT_FAILURE_RATE_THRESHOLD);
                if failure_rate_threshold > 100 {
                    return Err(FuseError::Config(
                        "failure_rate_threshold is a percentage and cannot exceed 100".to_string(),
                    ));
                }

                Strategy::Rate(Rate {
                    time_window_secs,
                    failure_rate_threshold,
                    minimum_requests: self.minimum_requests.unwrap_or(DEFAULT_MINIMUM_REQUESTS),
                    interval_to_half_open_secs,
                })
            }
        };

        Ok(BreakerConfig { strategy })
    }
}

/// Immutable, validated breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    strategy: Strategy,
}

impl BreakerConfig {
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn interval_to_half_open_secs(&self) -> u64 {
        self.strategy.interval_to_half_open_secs()
    }

    /// Evaluation window for sizing windowed storage; None for count
    pub fn window_secs(&self) -> Option<u64> {
        self.strategy.window_secs()
    }
}
