//! Storage contract backing the breaker's counters and state.
//!
//! Counters and state live behind a pluggable [`Storage`] trait so the
//! count and rate strategies run against the same backend, and so multiple
//! process instances can share one consistent view of a service's health.
//! [`memory::MemoryStorage`] is the in-process reference adapter;
//! [`redis::RedisStorage`] is the distributed production option.

pub mod lua_scripts;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Circuit breaker state, persisted per service name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, a single probe is permitted
    HalfOpen,
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed
    }
}

impl CircuitState {
    /// Wire spelling used by key-value backends
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "closed" => Some(CircuitState::Closed),
            "open" => Some(CircuitState::Open),
            "half_open" => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// One consistent read of a service's stored health
#[derive(Debug, Clone, Default)]
pub struct ServiceSnapshot {
    pub state: CircuitState,
    /// Successes within the evaluation window (rate) or running tally (count)
    pub success_count: u64,
    /// Failures within the evaluation window (rate) or running tally (count)
    pub failure_count: u64,
    /// Unix seconds of the last recorded failure
    pub last_failure_at: Option<u64>,
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value in storage: {0}")]
    Decode(String),
}

impl From<::redis::RedisError> for StorageError {
    fn from(err: ::redis::RedisError) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

/// Durable counters and state keyed by service name.
///
/// Increments must be atomic per service name under concurrent callers;
/// lost updates under-count failures and delay opening the circuit.
/// `compare_and_set_state` must be linearizable per service name: it is
/// the primitive that admits exactly one half-open probe.
///
/// `now` is supplied by the caller (the breaker's clock) so windowed
/// adapters place counts into reproducible time buckets.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns the new success count
    async fn increment_success(&self, service: &str, now: u64) -> Result<u64, StorageError>;

    /// Records a failure at `now` and updates the last-failure timestamp.
    /// Returns the new failure count.
    async fn increment_failure(&self, service: &str, now: u64) -> Result<u64, StorageError>;

    /// Decrements the failure counter, floor-clamped at zero. Count-mode
    /// successes forgive prior failures through this operation.
    async fn decrement_failure(&self, service: &str) -> Result<u64, StorageError>;

    async fn success_count(&self, service: &str, now: u64) -> Result<u64, StorageError>;

    async fn failure_count(&self, service: &str, now: u64) -> Result<u64, StorageError>;

    async fn last_failure_at(&self, service: &str) -> Result<Option<u64>, StorageError>;

    /// Defaults to [`CircuitState::Closed`] for unseen service names
    async fn state(&self, service: &str) -> Result<CircuitState, StorageError>;

    async fn set_state(&self, service: &str, state: CircuitState) -> Result<(), StorageError>;

    /// Atomically transitions `from` -> `to`; returns whether this caller
    /// won the transition.
    async fn compare_and_set_state(
        &self,
        service: &str,
        from: CircuitState,
        to: CircuitState,
    ) -> Result<bool, StorageError>;

    /// Zeroes both counters for the service name
    async fn reset_counters(&self, service: &str, now: u64) -> Result<(), StorageError>;

    /// One consistent read of state, counters, and last failure time
    async fn snapshot(&self, service: &str, now: u64) -> Result<ServiceSnapshot, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "Closed");
        assert_eq!(CircuitState::Open.to_string(), "Open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HalfOpen");
    }

    #[test]
    fn test_circuit_state_wire_round_trip() {
        for state in [
            CircuitState::Closed,
            CircuitState::Open,
            CircuitState::HalfOpen,
        ] {
            assert_eq!(CircuitState::parse(state.as_str()), Some(state));
        }
        assert_eq!(CircuitState::parse("blown"), None);
    }

    #[test]
    fn test_default_state_is_closed() {
        assert_eq!(CircuitState::default(), CircuitState::Closed);
    }
}
