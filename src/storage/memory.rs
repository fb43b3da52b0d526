use super::{CircuitState, ServiceSnapshot, Storage, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

/// In-process storage adapter.
///
/// The reference backend for tests and single-instance deployments.
/// Counters are either a running tally (count bindings) or fixed
/// per-second buckets summed over the trailing window (rate bindings),
/// expired on access so cleanup is O(window), not O(total calls).
/// DashMap's per-entry exclusive access provides the atomicity and
/// compare-and-set contract in-process.
pub struct MemoryStorage {
    records: DashMap<String, ServiceRecord>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default)]
struct ServiceRecord {
    state: CircuitState,
    last_failure_at: Option<u64>,
    success: Counter,
    failure: Counter,
}

#[derive(Debug, Default)]
struct Counter {
    /// Running tally, used when no window is configured
    total: u64,
    /// Per-second buckets, used when a window is configured
    buckets: VecDeque<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    at: u64,
    count: u64,
}

impl Counter {
    fn increment(&mut self, now: u64, window: Option<u64>) -> u64 {
        match window {
            None => {
                self.total += 1;
                self.total
            }
            Some(window) => {
                self.expire(now, window);
                match self.buckets.back_mut() {
                    Some(bucket) if bucket.at == now => bucket.count += 1,
                    _ => self.buckets.push_back(Bucket { at: now, count: 1 }),
                }
                self.sum()
            }
        }
    }

    fn decrement_floor(&mut self, window: Option<u64>) -> u64 {
        match window {
            None => {
                self.total = self.total.saturating_sub(1);
                self.total
            }
            Some(_) => {
                if let Some(bucket) = self.buckets.back_mut() {
                    bucket.count = bucket.count.saturating_sub(1);
                }
                self.sum()
            }
        }
    }

    fn value(&mut self, now: u64, window: Option<u64>) -> u64 {
        match window {
            None => self.total,
            Some(window) => {
                self.expire(now, window);
                self.sum()
            }
        }
    }

    /// Drops buckets that fell out of the trailing window
    fn expire(&mut self, now: u64, window: u64) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.buckets.front().is_some_and(|b| b.at <= cutoff) {
            self.buckets.pop_front();
        }
    }

    fn sum(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }
}

impl MemoryStorage {
    /// Storage with running tallies, for count-strategy bindings
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            window_secs: None,
        }
    }

    /// Storage with per-second buckets summed over a trailing window,
    /// for rate-strategy bindings
    pub fn windowed(window_secs: u64) -> Self {
        Self {
            records: DashMap::new(),
            window_secs: Some(window_secs),
        }
    }

    /// Number of tracked service names (for tests/monitoring)
    pub fn tracked_services(&self) -> usize {
        self.records.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn increment_success(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        Ok(record.success.increment(now, self.window_secs))
    }

    async fn increment_failure(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        record.last_failure_at = Some(now);
        Ok(record.failure.increment(now, self.window_secs))
    }

    async fn decrement_failure(&self, service: &str) -> Result<u64, StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        Ok(record.failure.decrement_floor(self.window_secs))
    }

    async fn success_count(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        Ok(record.success.value(now, self.window_secs))
    }

    async fn failure_count(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        Ok(record.failure.value(now, self.window_secs))
    }

    async fn last_failure_at(&self, service: &str) -> Result<Option<u64>, StorageError> {
        Ok(self
            .records
            .get(service)
            .and_then(|record| record.last_failure_at))
    }

    async fn state(&self, service: &str) -> Result<CircuitState, StorageError> {
        Ok(self
            .records
            .get(service)
            .map(|record| record.state)
            .unwrap_or_default())
    }

    async fn set_state(&self, service: &str, state: CircuitState) -> Result<(), StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        record.state = state;
        Ok(())
    }

    async fn compare_and_set_state(
        &self,
        service: &str,
        from: CircuitState,
        to: CircuitState,
    ) -> Result<bool, StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        if record.state == from {
            record.state = to;
            Ok(true)
        } else {
            debug!(
                service = service,
                expected = %from,
                actual = %record.state,
                "compare-and-set lost"
            );
            Ok(false)
        }
    }

    async fn reset_counters(&self, service: &str, _now: u64) -> Result<(), StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        record.success = Counter::default();
        record.failure = Counter::default();
        Ok(())
    }

    async fn snapshot(&self, service: &str, now: u64) -> Result<ServiceSnapshot, StorageError> {
        let mut record = self.records.entry(service.to_string()).or_default();
        Ok(ServiceSnapshot {
            state: record.state,
            success_count: record.success.value(now, self.window_secs),
            failure_count: record.failure.value(now, self.window_secs),
            last_failure_at: record.last_failure_at,
        })
    }
}
