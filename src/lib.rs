//! Circuit breaker for HTTP clients.
//!
//! Interposes a breaker between callers and unreliable remote services:
//! each call's outcome feeds a per-service failure signal, and once
//! failures cross the configured threshold the breaker rejects calls
//! immediately instead of letting them hit the failing dependency,
//! probing for recovery after a cooldown.
//!
//! Failures are detected by one of two strategies — a fixed failure count
//! or a failure rate over a trailing window — and counters live behind a
//! pluggable storage backend so multiple instances can share one view of
//! a dependency's health.
//!
//! # Example
//!
//! ```rust,no_run
//! use httpfuse::{BreakerSettings, FuseError, GuardedClient};
//!
//! #[tokio::main]
//! async fn main() -> httpfuse::Result<()> {
//!     let mut settings = BreakerSettings::rate();
//!     settings.time_window_secs = Some(30);
//!     settings.failure_rate_threshold = Some(50);
//!     settings.minimum_requests = Some(10);
//!
//!     let client = GuardedClient::builder("payments")
//!         .breaker(settings)
//!         .build()?;
//!
//!     match client.get("https://api.example.com/charges").await {
//!         Ok(response) => println!("status: {}", response.status()),
//!         Err(FuseError::CircuitOpen { service }) => {
//!             println!("breaker protecting {}", service);
//!         }
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod resolver;
pub mod storage;
pub mod strategy;

// Re-export commonly used types
pub use breaker::{BreakerMetrics, CircuitBreaker};
pub use client::{GuardedClient, GuardedClientBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BreakerConfig, BreakerSettings};
pub use error::{FuseError, Result};
pub use resolver::{DefaultServiceNameResolver, ServiceNameResolver};
pub use storage::{
    memory::MemoryStorage, redis::RedisStorage, CircuitState, ServiceSnapshot, Storage,
    StorageError,
};
pub use strategy::{Count, Decision, Rate, Strategy, StrategyKind};
