use super::lua_scripts::{
    CAS_STATE_SCRIPT, COUNTER_INCREMENT_SCRIPT, DECREMENT_FLOOR_SCRIPT, FAILURE_INCREMENT_SCRIPT,
};
use super::{CircuitState, ServiceSnapshot, Storage, StorageError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use tracing::debug;

const KEY_PREFIX: &str = "httpfuse";

/// Redis-backed storage adapter.
///
/// The production backend when multiple process instances must share one
/// view of a service's health. Counters are plain keys (count bindings) or
/// per-second bucket keys expired by Redis and summed over the trailing
/// window with a single MGET (rate bindings). Lua scripts keep increments
/// and the state compare-and-set atomic per service name.
pub struct RedisStorage {
    connection: ConnectionManager,
    window_secs: Option<u64>,
}

impl RedisStorage {
    /// Connect to Redis. Pass the strategy's window for rate bindings,
    /// `None` for count bindings.
    pub async fn new(redis_url: &str, window_secs: Option<u64>) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            window_secs,
        })
    }

    /// Test the Redis connection
    pub async fn ping(&self) -> Result<(), StorageError> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<_, ()>(&mut connection)
            .await?;
        Ok(())
    }

    fn state_key(&self, service: &str) -> String {
        format!("{}:{}:state", KEY_PREFIX, service)
    }

    fn last_failure_key(&self, service: &str) -> String {
        format!("{}:{}:last_failure_at", KEY_PREFIX, service)
    }

    /// Tally key, or the bucket key for the current second
    fn counter_key(&self, service: &str, kind: &str, now: u64) -> String {
        match self.window_secs {
            None => format!("{}:{}:{}", KEY_PREFIX, service, kind),
            Some(_) => format!("{}:{}:{}:{}", KEY_PREFIX, service, kind, now),
        }
    }

    fn counter_ttl(&self) -> u64 {
        self.window_secs.map(|window| window * 2).unwrap_or(0)
    }

    /// Bucket keys covering the trailing window ending at `now`
    fn window_keys(&self, service: &str, kind: &str, now: u64, window: u64) -> Vec<String> {
        (0..window)
            .filter_map(|age| now.checked_sub(age))
            .map(|second| format!("{}:{}:{}:{}", KEY_PREFIX, service, kind, second))
            .collect()
    }

    async fn count(&self, service: &str, kind: &str, now: u64) -> Result<u64, StorageError> {
        let mut connection = self.connection.clone();
        match self.window_secs {
            None => {
                let key = self.counter_key(service, kind, now);
                let value: Option<u64> = connection.get(key).await?;
                Ok(value.unwrap_or(0))
            }
            Some(window) => {
                let keys = self.window_keys(service, kind, now, window);
                let values: Vec<Option<u64>> = connection.mget(keys).await?;
                Ok(values.into_iter().flatten().sum())
            }
        }
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn increment_success(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        let mut connection = self.connection.clone();
        let bucket_value: u64 = Script::new(COUNTER_INCREMENT_SCRIPT)
            .key(self.counter_key(service, "success", now))
            .arg(self.counter_ttl())
            .invoke_async(&mut connection)
            .await?;

        match self.window_secs {
            None => Ok(bucket_value),
            Some(_) => self.count(service, "success", now).await,
        }
    }

    async fn increment_failure(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        let mut connection = self.connection.clone();
        let bucket_value: u64 = Script::new(FAILURE_INCREMENT_SCRIPT)
            .key(self.counter_key(service, "failure", now))
            .key(self.last_failure_key(service))
            .arg(now)
            .arg(self.counter_ttl())
            .invoke_async(&mut connection)
            .await?;

        match self.window_secs {
            None => Ok(bucket_value),
            Some(_) => self.count(service, "failure", now).await,
        }
    }

    async fn decrement_failure(&self, service: &str) -> Result<u64, StorageError> {
        let mut connection = self.connection.clone();
        let value: u64 = Script::new(DECREMENT_FLOOR_SCRIPT)
            .key(format!("{}:{}:failure", KEY_PREFIX, service))
            .invoke_async(&mut connection)
            .await?;
        Ok(value)
    }

    async fn success_count(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        self.count(service, "success", now).await
    }

    async fn failure_count(&self, service: &str, now: u64) -> Result<u64, StorageError> {
        self.count(service, "failure", now).await
    }

    async fn last_failure_at(&self, service: &str) -> Result<Option<u64>, StorageError> {
        let mut connection = self.connection.clone();
        let value: Option<u64> = connection.get(self.last_failure_key(service)).await?;
        Ok(value)
    }

    async fn state(&self, service: &str) -> Result<CircuitState, StorageError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(self.state_key(service)).await?;

        match value {
            None => Ok(CircuitState::Closed),
            Some(raw) => CircuitState::parse(&raw)
                .ok_or_else(|| StorageError::Decode(format!("unknown circuit state '{}'", raw))),
        }
    }

    async fn set_state(&self, service: &str, state: CircuitState) -> Result<(), StorageError> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(self.state_key(service), state.as_str())
            .await?;
        Ok(())
    }

    async fn compare_and_set_state(
        &self,
        service: &str,
        from: CircuitState,
        to: CircuitState,
    ) -> Result<bool, StorageError> {
        let mut connection = self.connection.clone();
        let won: u64 = Script::new(CAS_STATE_SCRIPT)
            .key(self.state_key(service))
            .arg(from.as_str())
            .arg(to.as_str())
            .invoke_async(&mut connection)
            .await?;

        debug!(
            service = service,
            from = %from,
            to = %to,
            won = won == 1,
            "state compare-and-set"
        );
        Ok(won == 1)
    }

    async fn reset_counters(&self, service: &str, now: u64) -> Result<(), StorageError> {
        let mut connection = self.connection.clone();
        let keys = match self.window_secs {
            None => vec![
                format!("{}:{}:success", KEY_PREFIX, service),
                format!("{}:{}:failure", KEY_PREFIX, service),
            ],
            Some(window) => {
                let mut keys = self.window_keys(service, "success", now, window);
                keys.extend(self.window_keys(service, "failure", now, window));
                keys
            }
        };

        connection.del::<_, ()>(keys).await?;
        Ok(())
    }

    async fn snapshot(&self, service: &str, now: u64) -> Result<ServiceSnapshot, StorageError> {
        Ok(ServiceSnapshot {
            state: self.state(service).await?,
            success_count: self.success_count(service, now).await?,
            failure_count: self.failure_count(service, now).await?,
            last_failure_at: self.last_failure_at(service).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // They are ignored by default. Run with: cargo test -- --ignored

    async fn create_test_storage(window_secs: Option<u64>) -> Option<RedisStorage> {
        RedisStorage::new("redis://127.0.0.1:6379", window_secs)
            .await
            .ok()
    }

    fn test_service(label: &str) -> String {
        format!("test-{}-{}", label, rand::random::<u32>())
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_tally_counters() {
        let storage = create_test_storage(None)
            .await
            .expect("Failed to connect to Redis");
        let service = test_service("tally");

        assert_eq!(storage.increment_failure(&service, 100).await.unwrap(), 1);
        assert_eq!(storage.increment_failure(&service, 101).await.unwrap(), 2);
        assert_eq!(storage.last_failure_at(&service).await.unwrap(), Some(101));

        assert_eq!(storage.decrement_failure(&service).await.unwrap(), 1);
        assert_eq!(storage.decrement_failure(&service).await.unwrap(), 0);
        assert_eq!(storage.decrement_failure(&service).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_windowed_counts() {
        let storage = create_test_storage(Some(30))
            .await
            .expect("Failed to connect to Redis");
        let service = test_service("window");

        storage.increment_success(&service, 1000).await.unwrap();
        storage.increment_success(&service, 1010).await.unwrap();
        assert_eq!(storage.success_count(&service, 1010).await.unwrap(), 2);

        // the t=1000 bucket falls outside the window at t=1030
        assert_eq!(storage.success_count(&service, 1030).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_state_cas() {
        let storage = create_test_storage(None)
            .await
            .expect("Failed to connect to Redis");
        let service = test_service("cas");

        assert_eq!(storage.state(&service).await.unwrap(), CircuitState::Closed);

        storage.set_state(&service, CircuitState::Open).await.unwrap();
        assert!(storage
            .compare_and_set_state(&service, CircuitState::Open, CircuitState::HalfOpen)
            .await
            .unwrap());
        assert!(!storage
            .compare_and_set_state(&service, CircuitState::Open, CircuitState::HalfOpen)
            .await
            .unwrap());
        assert_eq!(
            storage.state(&service).await.unwrap(),
            CircuitState::HalfOpen
        );
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_connection() {
        let storage = create_test_storage(None)
            .await
            .expect("Failed to connect to Redis");

        assert!(storage.ping().await.is_ok());
    }
}
