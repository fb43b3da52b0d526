//! Circuit breaker state machine.
//!
//! One [`CircuitBreaker`] serves every service name reaching it; all
//! per-service state lives in the shared [`Storage`] backend, so breaker
//! instances are freely cloneable and multiple processes sharing one
//! backend agree on each service's health.

use crate::clock::Clock;
use crate::config::BreakerConfig;
use crate::storage::{CircuitState, Storage, StorageError};
use crate::strategy::{Decision, Strategy};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-service call metrics, tracked in-process
#[derive(Debug, Clone, Default)]
pub struct BreakerMetrics {
    /// Calls that passed the allow check
    pub total_requests: u64,
    /// Successful outcomes reported
    pub successful_requests: u64,
    /// Failed outcomes reported
    pub failed_requests: u64,
    /// Calls rejected while open or probing
    pub rejected_requests: u64,
    /// Number of times the circuit opened
    pub circuit_opened_count: u64,
    /// Number of times a probe was admitted
    pub circuit_half_opened_count: u64,
    /// Number of times the circuit closed after a probe
    pub circuit_closed_count: u64,
}

/// Circuit breaker bound to one strategy and storage backend
#[derive(Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    metrics: Arc<DashMap<String, BreakerMetrics>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        info!(
            strategy = ?config.strategy().kind(),
            interval_to_half_open_secs = config.interval_to_half_open_secs(),
            "Creating circuit breaker"
        );

        Self {
            config,
            storage,
            clock,
            metrics: Arc::new(DashMap::new()),
        }
    }

    /// Check whether a call to `service` may proceed.
    ///
    /// Closed permits, open denies until the cooldown admits a probe, and
    /// at most one probe is outstanding at a time: concurrent callers race
    /// on the storage compare-and-set and exactly one wins. If the storage
    /// backend is unreachable the breaker degrades to permissive closed
    /// behavior rather than blocking legitimate traffic.
    pub async fn allow(&self, service: &str) -> bool {
        let now = self.clock.now_secs();
        let snapshot = match self.storage.snapshot(service, now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.log_degraded(service, &e);
                self.update_metrics(service, |m| m.total_requests += 1);
                return true;
            }
        };

        match snapshot.state {
            CircuitState::Closed => {
                self.update_metrics(service, |m| m.total_requests += 1);
                true
            }
            CircuitState::Open => {
                match self.config.strategy().evaluate(&snapshot, now) {
                    Decision::HalfOpenProbe => self.admit_probe(service).await,
                    _ => {
                        debug!(service = service, "circuit open, rejecting call");
                        self.update_metrics(service, |m| m.rejected_requests += 1);
                        false
                    }
                }
            }
            CircuitState::HalfOpen => {
                debug!(service = service, "probe in flight, rejecting call");
                self.update_metrics(service, |m| m.rejected_requests += 1);
                false
            }
        }
    }

    /// Report a successful call outcome.
    ///
    /// A successful probe closes the circuit and zeroes the counters. In
    /// the closed state a count-strategy success forgives one prior
    /// failure; a rate-strategy success lands in the evaluation window.
    pub async fn record_success(&self, service: &str) {
        self.update_metrics(service, |m| m.successful_requests += 1);

        let prior = match self.storage.state(service).await {
            Ok(state) => state,
            Err(e) => {
                self.log_degraded(service, &e);
                return;
            }
        };

        let result = if prior == CircuitState::HalfOpen {
            info!(service = service, "probe succeeded, closing circuit");
            self.update_metrics(service, |m| m.circuit_closed_count += 1);
            self.close(service).await
        } else {
            match self.config.strategy() {
                Strategy::Count(_) => self
                    .storage
                    .decrement_failure(service)
                    .await
                    .map(|_| ()),
                Strategy::Rate(_) => self
                    .storage
                    .increment_success(service, self.clock.now_secs())
                    .await
                    .map(|_| ()),
            }
        };

        if let Err(e) = result {
            self.log_degraded(service, &e);
        }
    }

    /// Report a failed call outcome.
    ///
    /// Always re-bases the cooldown clock on this failure. A failed probe
    /// re-arms the open state; a closed-state failure re-evaluates the
    /// strategy and persists the open transition when tripped.
    pub async fn record_failure(&self, service: &str) {
        self.update_metrics(service, |m| m.failed_requests += 1);
        let now = self.clock.now_secs();

        let prior = match self.storage.state(service).await {
            Ok(state) => state,
            Err(e) => {
                self.log_degraded(service, &e);
                return;
            }
        };

        if let Err(e) = self.storage.increment_failure(service, now).await {
            self.log_degraded(service, &e);
            return;
        }

        match prior {
            CircuitState::HalfOpen => {
                warn!(service = service, "probe failed, reopening circuit");
                self.update_metrics(service, |m| m.circuit_opened_count += 1);
                if let Err(e) = self.storage.set_state(service, CircuitState::Open).await {
                    self.log_degraded(service, &e);
                }
            }
            CircuitState::Closed => {
                let snapshot = match self.storage.snapshot(service, now).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        self.log_degraded(service, &e);
                        return;
                    }
                };

                if self.config.strategy().evaluate(&snapshot, now) == Decision::Open {
                    info!(
                        service = service,
                        failure_count = snapshot.failure_count,
                        success_count = snapshot.success_count,
                        "failure threshold reached, opening circuit"
                    );
                    self.update_metrics(service, |m| m.circuit_opened_count += 1);
                    if let Err(e) = self.storage.set_state(service, CircuitState::Open).await {
                        self.log_degraded(service, &e);
                    }
                }
            }
            // late report after another caller already reopened
            CircuitState::Open => {}
        }
    }

    /// Current stored state; Closed when the backend is unreachable
    pub async fn state(&self, service: &str) -> CircuitState {
        self.storage.state(service).await.unwrap_or_default()
    }

    /// In-process metrics for a service name
    pub fn metrics(&self, service: &str) -> Option<BreakerMetrics> {
        self.metrics.get(service).map(|m| m.value().clone())
    }

    /// Race for the single half-open probe slot
    async fn admit_probe(&self, service: &str) -> bool {
        match self
            .storage
            .compare_and_set_state(service, CircuitState::Open, CircuitState::HalfOpen)
            .await
        {
            Ok(true) => {
                info!(service = service, "cooldown elapsed, admitting probe");
                self.update_metrics(service, |m| {
                    m.total_requests += 1;
                    m.circuit_half_opened_count += 1;
                });
                true
            }
            Ok(false) => {
                debug!(service = service, "lost probe race, rejecting call");
                self.update_metrics(service, |m| m.rejected_requests += 1);
                false
            }
            Err(e) => {
                self.log_degraded(service, &e);
                self.update_metrics(service, |m| m.total_requests += 1);
                true
            }
        }
    }

    async fn close(&self, service: &str) -> Result<(), StorageError> {
        self.storage
            .reset_counters(service, self.clock.now_secs())
            .await?;
        self.storage.set_state(service, CircuitState::Closed).await
    }

    fn update_metrics(&self, service: &str, update: impl FnOnce(&mut BreakerMetrics)) {
        let mut metrics = self.metrics.entry(service.to_string()).or_default();
        update(&mut metrics);
    }

    fn log_degraded(&self, service: &str, error: &StorageError) {
        warn!(
            service = service,
            error = %error,
            "storage unavailable, treating circuit as closed"
        );
    }
}
