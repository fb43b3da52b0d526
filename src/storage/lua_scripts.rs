/// Lua script for incrementing a counter key.
///
/// KEYS[1] = the counter key (running tally or per-second bucket)
/// ARGV[1] = key TTL in seconds (0 = persistent tally)
///
/// Returns: the new counter value
pub const COUNTER_INCREMENT_SCRIPT: &str = r#"
local value = redis.call('INCR', KEYS[1])
local ttl = tonumber(ARGV[1])

if ttl > 0 and value == 1 then
    redis.call('EXPIRE', KEYS[1], ttl)
end

return value
"#;

/// Lua script for recording a failure: increments the failure counter and
/// stamps the last-failure time in one atomic step.
///
/// KEYS[1] = the failure counter key (running tally or per-second bucket)
/// KEYS[2] = the last-failure timestamp key
/// ARGV[1] = current timestamp (unix seconds)
/// ARGV[2] = counter key TTL in seconds (0 = persistent tally)
///
/// Returns: the new counter value
pub const FAILURE_INCREMENT_SCRIPT: &str = r#"
local value = redis.call('INCR', KEYS[1])
local now = ARGV[1]
local ttl = tonumber(ARGV[2])

if ttl > 0 and value == 1 then
    redis.call('EXPIRE', KEYS[1], ttl)
end

redis.call('SET', KEYS[2], now)

return value
"#;

/// Lua script for decrementing a counter, floor-clamped at zero.
///
/// KEYS[1] = the counter key
///
/// Returns: the new counter value
pub const DECREMENT_FLOOR_SCRIPT: &str = r#"
local value = tonumber(redis.call('GET', KEYS[1]) or '0')

if value > 0 then
    value = redis.call('DECR', KEYS[1])
end

return value
"#;

/// Lua script for a compare-and-set state transition. An absent key reads
/// as 'closed', matching the unseen-service default.
///
/// KEYS[1] = the state key
/// ARGV[1] = expected current state
/// ARGV[2] = new state
///
/// Returns: 1 if this caller won the transition, 0 otherwise
pub const CAS_STATE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1]) or 'closed'

if current == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end

return 0
"#;
