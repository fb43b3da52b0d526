use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source for the breaker and storage adapters.
///
/// All bookkeeping runs on unix seconds so that windowed counters and
/// cooldown arithmetic stay consistent across processes sharing one
/// storage backend.
pub trait Clock: Send + Sync {
    /// Current time as whole seconds since the unix epoch
    fn now_secs(&self) -> u64;
}

/// Wall-clock time source used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Hand-driven time source for tests
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start_secs: u64) -> Self {
        Self(AtomicU64::new(start_secs))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.0.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
