//! gateway-limiter-redis
//!
//! Distributed variant of the five kernel algorithms (spec §4.A.1-5) backed
//! by Redis. Each `allow` is exactly one [`redis::Script`] invocation (spec
//! §9: "do not decompose into separate GET/SET round-trips; that is not
//! equivalent under contention") so read-modify-write cannot interleave
//! across gateway instances sharing the same backing store.
#![warn(missing_docs)]

mod key;
mod scripts;
mod time;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use gateway_core::{CancelContext, Limiter};
use gateway_types::{Algorithm, GatewayError, Key as GwKey, LimitInfo, LimiterConfig};
use redis::aio::ConnectionManager;
use redis::Script;

struct Scripts {
    token_bucket: Script,
    leaky_bucket: Script,
    fixed_window: Script,
    sliding_log: Script,
    sliding_counter: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            token_bucket: Script::new(scripts::TOKEN_BUCKET),
            leaky_bucket: Script::new(scripts::LEAKY_BUCKET),
            fixed_window: Script::new(scripts::FIXED_WINDOW),
            sliding_log: Script::new(scripts::SLIDING_LOG),
            sliding_counter: Script::new(scripts::SLIDING_COUNTER),
        }
    }
}

/// Validate `config` is well-formed and distributed-backed, before any
/// connection is touched.
fn ensure_distributed(config: &LimiterConfig) -> Result<(), GatewayError> {
    config.validate().map_err(GatewayError::config)?;
    if config.distributed != gateway_types::Backing::Distributed {
        return Err(GatewayError::config(
            "RedisLimiter requires LimiterConfig::distributed == Backing::Distributed",
        ));
    }
    Ok(())
}

/// Distributed limiter instance bound to a single [`LimiterConfig`] and a
/// Redis connection.
///
/// Safe to share behind an `Arc` and call concurrently: [`ConnectionManager`]
/// multiplexes and auto-reconnects, and per-key atomicity is the script's job,
/// not the connection's.
pub struct RedisLimiter {
    config: LimiterConfig,
    manager: ConnectionManager,
    scripts: Scripts,
    seq: AtomicU64,
}

impl RedisLimiter {
    /// Construct a limiter for `config` over an already-connected `manager`.
    ///
    /// # Errors
    /// Returns `GatewayError::ConfigurationError` if `config` fails validation
    /// or is not configured for distributed backing.
    pub fn new(config: LimiterConfig, manager: ConnectionManager) -> Result<Self, GatewayError> {
        ensure_distributed(&config)?;
        Ok(Self {
            config,
            manager,
            scripts: Scripts::load(),
            seq: AtomicU64::new(0),
        })
    }

    /// Connect to `redis_url` and construct a limiter for `config`.
    ///
    /// # Errors
    /// Returns `GatewayError::BackingStoreUnavailable` if the connection
    /// cannot be established, or `GatewayError::ConfigurationError` per [`Self::new`].
    pub async fn connect(config: LimiterConfig, redis_url: &str) -> Result<Self, GatewayError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| GatewayError::backing_store(e.to_string()))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::backing_store(e.to_string()))?;
        Self::new(config, manager)
    }

    /// The configuration this instance enforces.
    #[must_use]
    pub const fn config(&self) -> &LimiterConfig {
        &self.config
    }

    fn ttl_secs(&self) -> u64 {
        self.config.window.as_secs().max(1).saturating_mul(2)
    }

    fn capacity_for(&self, key: &GwKey) -> u64 {
        self.config.effective_limit(key.identifier.is_premium())
    }

    async fn call(&self, gw_key: &GwKey, n: u64) -> Result<LimitInfo, GatewayError> {
        let capacity = self.capacity_for(gw_key) as f64;
        let window_secs = self.config.window.as_secs().max(1);
        let rate = capacity / window_secs as f64;
        let ttl = self.ttl_secs();
        let mut conn = self.manager.clone();

        let result: Result<(i64, i64, u64, i64), redis::RedisError> = match self.config.algorithm {
            Algorithm::TokenBucket => {
                let storage_key = key::token_bucket(&self.config, gw_key);
                self.scripts
                    .token_bucket
                    .key(storage_key)
                    .arg(capacity)
                    .arg(rate)
                    .arg(n)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await
            }
            Algorithm::LeakyBucket => {
                let storage_key = key::leaky_bucket(&self.config, gw_key);
                self.scripts
                    .leaky_bucket
                    .key(storage_key)
                    .arg(capacity)
                    .arg(rate)
                    .arg(n)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await
            }
            Algorithm::FixedWindow => {
                let now = time::now_unix();
                let window_start = time::truncate_to_window(now, window_secs);
                let storage_key = key::fixed_window(&self.config, gw_key, window_start);
                self.scripts
                    .fixed_window
                    .key(storage_key)
                    .arg(capacity)
                    .arg(n)
                    .arg(window_secs)
                    .arg(window_start)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await
            }
            Algorithm::SlidingWindowLog => {
                let storage_key = key::sliding_log(&self.config, gw_key);
                let seq_seed = self.seq.fetch_add(n.max(1), Ordering::Relaxed);
                self.scripts
                    .sliding_log
                    .key(storage_key)
                    .arg(capacity)
                    .arg(n)
                    .arg(window_secs)
                    .arg(ttl)
                    .arg(seq_seed)
                    .invoke_async(&mut conn)
                    .await
            }
            Algorithm::SlidingWindowCounter => {
                let now = time::now_unix();
                let window_start = time::truncate_to_window(now, window_secs);
                let current_key = key::sliding_counter_current(&self.config, gw_key, window_start);
                let previous_key = key::sliding_counter_previous(&self.config, gw_key, window_start);
                let prior_current_key =
                    key::sliding_counter_current(&self.config, gw_key, window_start.saturating_sub(window_secs));
                self.scripts
                    .sliding_counter
                    .key(current_key)
                    .key(previous_key)
                    .arg(capacity)
                    .arg(n)
                    .arg(window_secs)
                    .arg(window_start)
                    .arg(prior_current_key)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await
            }
        };

        match result {
            Ok((allowed, remaining, reset, retry_after_ms)) => {
                let limit = capacity as i64;
                if allowed != 0 {
                    Ok(LimitInfo::allowed(limit, remaining, reset))
                } else {
                    Ok(LimitInfo::denied(
                        limit,
                        reset,
                        std::time::Duration::from_millis(retry_after_ms.max(1) as u64),
                    ))
                }
            }
            Err(e) if self.config.fail_closed => Err(GatewayError::backing_store(e.to_string())),
            Err(_) => Ok(LimitInfo::unlimited(time::now_unix())),
        }
    }
}

#[async_trait]
impl Limiter for RedisLimiter {
    async fn allow(&self, key: &GwKey, n: u64, cx: &CancelContext) -> Result<LimitInfo, GatewayError> {
        cx.check()?;
        cx.race(self.call(key, n)).await?
    }

    async fn get_info(&self, key: &GwKey, cx: &CancelContext) -> Result<LimitInfo, GatewayError> {
        cx.check()?;
        cx.race(self.call(key, 0)).await?
    }

    async fn reset(&self, key: &GwKey, cx: &CancelContext) -> Result<(), GatewayError> {
        cx.check()?;
        let mut conn = self.manager.clone();
        let window_secs = self.config.window.as_secs().max(1);
        let now = time::now_unix();
        let window_start = time::truncate_to_window(now, window_secs);
        let storage_keys: Vec<String> = match self.config.algorithm {
            Algorithm::TokenBucket => vec![key::token_bucket(&self.config, key)],
            Algorithm::LeakyBucket => vec![key::leaky_bucket(&self.config, key)],
            Algorithm::FixedWindow => vec![key::fixed_window(&self.config, key, window_start)],
            Algorithm::SlidingWindowLog => vec![key::sliding_log(&self.config, key)],
            Algorithm::SlidingWindowCounter => vec![
                key::sliding_counter_current(&self.config, key, window_start),
                key::sliding_counter_previous(&self.config, key, window_start),
            ],
        };

        let fut = async {
            let result: redis::RedisResult<()> = redis::cmd("DEL").arg(&storage_keys).query_async(&mut conn).await;
            result
        };
        match cx.race(fut).await? {
            Ok(()) => Ok(()),
            Err(e) if self.config.fail_closed => Err(GatewayError::backing_store(e.to_string())),
            Err(_) => Ok(()),
        }
    }

    fn algorithm_name(&self) -> &'static str {
        match self.config.algorithm {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::LeakyBucket => "leaky_bucket",
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindowLog => "sliding_window_log",
            Algorithm::SlidingWindowCounter => "sliding_window_counter",
        }
    }
}
