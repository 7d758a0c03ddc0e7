use crate::error::RateLimitError;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Length of one rate limiting window
pub const WINDOW: Duration = Duration::from_secs(3600);

/// Configuration for per-client hourly rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests allowed per client per hour
    pub hourly_limit: u32,

    /// Upper bound on one round trip to the counter store
    pub store_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            hourly_limit: 200,
            store_timeout: Duration::from_secs(1),
        }
    }
}

/// Shared counter backend.
///
/// `incr` must increment and read in one atomic step so that concurrent
/// requests never observe the same count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Add one to `key`, starting it at one with a `ttl` expiry when absent.
    /// Returns the count after the increment.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError>;
}

const INCR_SCRIPT: &str = r#"
local count = redis.call("INCR", KEYS[1])
if count == 1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return count
"#;

/// Redis-backed counters, shared by every instance pointing at the same server
pub struct RedisCounterStore {
    client: ConnectionManager,
    script: redis::Script,
}

impl RedisCounterStore {
    /// Connect to a Redis server given as `host:port` or a `redis://` URL
    pub async fn connect(address: &str) -> Result<Self, RateLimitError> {
        let url = redis_url(address);
        let client = redis::Client::open(url.as_str())?;
        let connection_manager = ConnectionManager::new(client).await?;
        info!("Connected to Redis at {} for rate limiting", url);

        Ok(Self {
            client: connection_manager,
            script: redis::Script::new(INCR_SCRIPT),
        })
    }

    pub async fn ping(&self) -> Result<(), RateLimitError> {
        let mut conn = self.client.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError> {
        let mut conn = self.client.clone();
        let count: u64 = self
            .script
            .key(key)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}

fn redis_url(address: &str) -> String {
    if address.starts_with("redis://") || address.starts_with("rediss://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

/// In-process counters with the same semantics as [`RedisCounterStore`]
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, (u64, Instant)>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop windows that have already expired
    pub fn cleanup_expired_entries(&self) {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, (_, expires)| *expires > now);
        debug!(
            "Removed {} expired rate limit counters",
            before.saturating_sub(self.counters.len())
        );
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, RateLimitError> {
        let now = Instant::now();
        // The entry guard holds the shard lock until the increment is done
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert((0, now + ttl));
        if entry.1 <= now {
            *entry = (0, now + ttl);
        }
        entry.0 += 1;
        Ok(entry.0)
    }
}

/// Result of one admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub limit: u32,
    /// Requests counted in the current window, this one included
    pub used: u64,
    /// Time until the current window ends
    pub retry_after: Duration,
    pub allowed: bool,
}

impl Admission {
    pub fn remaining(&self) -> u64 {
        (self.limit as u64).saturating_sub(self.used)
    }
}

/// Per-client hourly admission gate over a [`CounterStore`]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn limit(&self) -> u32 {
        self.config.hourly_limit
    }

    /// Count this request against `client` and decide whether it may proceed.
    ///
    /// A store error or timeout denies the request.
    pub async fn admit(&self, client: &str) -> Admission {
        self.admit_at(client, chrono::Utc::now().timestamp().max(0) as u64)
            .await
    }

    /// Same as [`admit`](Self::admit) with an explicit unix time in seconds
    pub async fn admit_at(&self, client: &str, now: u64) -> Admission {
        let window = WINDOW.as_secs();
        let slot = now / window;
        let retry_after = Duration::from_secs((slot + 1) * window - now);
        let key = format!("rate:{}:{}-{}", client, window, slot);

        let counted = timeout(self.config.store_timeout, self.store.incr(&key, WINDOW))
            .await
            .map_err(|_| RateLimitError::Timeout(self.config.store_timeout))
            .and_then(|result| result);

        match counted {
            Ok(used) => {
                let allowed = used <= self.config.hourly_limit as u64;
                if !allowed {
                    debug!(
                        "Rate limit exceeded for {}: {} > {}",
                        client, used, self.config.hourly_limit
                    );
                }
                Admission {
                    limit: self.config.hourly_limit,
                    used,
                    retry_after,
                    allowed,
                }
            }
            Err(e) => {
                warn!("Rate limit store unavailable, denying {}: {}", client, e);
                Admission {
                    limit: self.config.hourly_limit,
                    used: 0,
                    retry_after,
                    allowed: false,
                }
            }
        }
    }
}
