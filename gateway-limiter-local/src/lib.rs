//! gateway-limiter-local
//!
//! Process-local variant of the five kernel algorithms (spec §4.A.1-5) over a
//! [`dashmap::DashMap`] keyed map: each key's state lives behind that shard's
//! internal lock, so concurrent calls for *distinct* keys never contend and a
//! call for the *same* key serializes for exactly the duration of its own
//! critical section (spec §5, "no single global lock").
//!
//! `allow`/`get_info`/`reset` never suspend (spec §5): the whole operation is
//! synchronous map access wrapped in an `async fn` to satisfy the shared
//! [`Limiter`] contract.
#![warn(missing_docs)]

mod algorithms;
mod time;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use gateway_core::{CancelContext, Limiter};
use gateway_types::{Algorithm, GatewayError, Key, LimitInfo, LimiterConfig};

use crate::algorithms::AlgoState;

struct Entry {
    state: AlgoState,
    last_access: Instant,
}

/// Local (in-process) limiter instance bound to a single [`LimiterConfig`].
///
/// One instance typically backs one [`gateway_types::Level`] inside the
/// multi-level composer (`gateway-middleware`); the `identifier` half of
/// [`Key`] is the map's real key space.
pub struct LocalLimiter {
    config: LimiterConfig,
    map: DashMap<Key, Entry>,
}

impl LocalLimiter {
    /// Construct a limiter for `config`.
    ///
    /// # Errors
    /// Returns `GatewayError::ConfigurationError` if `config` fails validation.
    pub fn new(config: LimiterConfig) -> Result<Self, GatewayError> {
        config.validate().map_err(GatewayError::config)?;
        Ok(Self {
            config,
            map: DashMap::new(),
        })
    }

    /// The configuration this instance enforces.
    #[must_use]
    pub const fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Remove any key whose state has been idle longer than `window * 2`
    /// (spec §3 lifecycle, §5 bounded memory). Intended to run on a periodic
    /// background task; see [`spawn_idle_sweeper`].
    pub fn sweep_idle(&self) {
        let idle_after = self.config.window.saturating_mul(2);
        let now = Instant::now();
        self.map
            .retain(|_, entry| now.saturating_duration_since(entry.last_access) < idle_after);
    }

    fn capacity_for(&self, key: &Key) -> u64 {
        self.config.effective_limit(key.identifier.is_premium())
    }

    fn dispatch(&self, key: &Key, n: u64, commit: bool) -> LimitInfo {
        let now = Instant::now();
        let capacity = self.capacity_for(key);
        let algorithm = self.config.algorithm;
        let window = self.config.window;

        let mut entry_ref = self
            .map
            .entry(key.clone())
            .or_insert_with(|| Entry {
                state: AlgoState::fresh(algorithm, now, capacity),
                last_access: now,
            });
        let entry = entry_ref.value_mut();
        entry.last_access = now;

        match algorithm {
            Algorithm::TokenBucket => algorithms::token_bucket(&mut entry.state, now, window, capacity, n, commit),
            Algorithm::LeakyBucket => algorithms::leaky_bucket(&mut entry.state, now, window, capacity, n, commit),
            Algorithm::FixedWindow => algorithms::fixed_window(&mut entry.state, window, capacity, n, commit),
            Algorithm::SlidingWindowLog => algorithms::sliding_log(&mut entry.state, now, window, capacity, n, commit),
            Algorithm::SlidingWindowCounter => algorithms::sliding_counter(&mut entry.state, window, capacity, n, commit),
        }
    }
}

#[async_trait]
impl Limiter for LocalLimiter {
    async fn allow(&self, key: &Key, n: u64, cx: &CancelContext) -> Result<LimitInfo, GatewayError> {
        cx.check()?;
        Ok(self.dispatch(key, n, true))
    }

    async fn get_info(&self, key: &Key, cx: &CancelContext) -> Result<LimitInfo, GatewayError> {
        cx.check()?;
        Ok(self.dispatch(key, 0, true))
    }

    async fn reset(&self, key: &Key, cx: &CancelContext) -> Result<(), GatewayError> {
        cx.check()?;
        self.map.remove(key);
        Ok(())
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

/// Spawn a background task that calls [`LocalLimiter::sweep_idle`] on `interval`.
///
/// The returned handle aborts the sweeper when dropped.
#[must_use]
pub fn spawn_idle_sweeper(
    limiter: std::sync::Arc<LocalLimiter>,
    interval: Duration,
) -> gateway_core::StreamHandle {
    let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => limiter.sweep_idle(),
                _ = &mut stop_rx => break,
            }
        }
    });
    gateway_core::StreamHandle::new(handle, stop_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{Backing, Identifier, Level};

    fn cfg(algorithm: Algorithm, limit: u64, window: Duration, burst: u64) -> LimiterConfig {
        LimiterConfig {
            level: Level::User,
            algorithm,
            limit,
            window,
            burst,
            premium_multiplier: 1,
            distributed: Backing::Local,
            key_prefix: "gw".into(),
            fail_closed: true,
        }
    }

    fn key(id: &str) -> Key {
        Key::new(Level::User, Identifier::plain(id))
    }

    // S1: token bucket {limit=10, window=1s, burst=0}.
    #[tokio::test]
    async fn s1_token_bucket_burst_then_deny() {
        let limiter = LocalLimiter::new(cfg(Algorithm::TokenBucket, 10, Duration::from_secs(1), 0)).unwrap();
        let cx = CancelContext::new();
        let k = key("alice");
        for expected_remaining in (0..10).rev() {
            let info = limiter.allow(&k, 1, &cx).await.unwrap();
            assert!(info.allowed);
            assert_eq!(info.remaining, expected_remaining);
        }
        let denied = limiter.allow(&k, 1, &cx).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        // retry_after ~= 1/10s = 100ms
        assert!(denied.retry_after <= Duration::from_millis(150));
        assert!(denied.retry_after >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn get_info_does_not_consume() {
        let limiter = LocalLimiter::new(cfg(Algorithm::TokenBucket, 5, Duration::from_secs(10), 0)).unwrap();
        let cx = CancelContext::new();
        let k = key("bob");
        limiter.allow(&k, 2, &cx).await.unwrap();
        let info_a = limiter.get_info(&k, &cx).await.unwrap();
        let info_b = limiter.get_info(&k, &cx).await.unwrap();
        assert_eq!(info_a.remaining, info_b.remaining);
        assert_eq!(info_a.remaining, 3);
    }

    #[tokio::test]
    async fn reset_purges_state() {
        let limiter = LocalLimiter::new(cfg(Algorithm::TokenBucket, 3, Duration::from_secs(10), 0)).unwrap();
        let cx = CancelContext::new();
        let k = key("carol");
        limiter.allow(&k, 3, &cx).await.unwrap();
        assert!(!limiter.allow(&k, 1, &cx).await.unwrap().allowed);
        limiter.reset(&k, &cx).await.unwrap();
        assert!(limiter.allow(&k, 1, &cx).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn fixed_window_resets_on_boundary() {
        let limiter = LocalLimiter::new(cfg(Algorithm::FixedWindow, 2, Duration::from_secs(1), 0)).unwrap();
        let cx = CancelContext::new();
        let k = key("dana");
        assert!(limiter.allow(&k, 1, &cx).await.unwrap().allowed);
        assert!(limiter.allow(&k, 1, &cx).await.unwrap().allowed);
        assert!(!limiter.allow(&k, 1, &cx).await.unwrap().allowed);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow(&k, 1, &cx).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn sliding_log_bounds_memory_by_capacity() {
        let limiter = LocalLimiter::new(cfg(Algorithm::SlidingWindowLog, 4, Duration::from_millis(200), 0)).unwrap();
        let cx = CancelContext::new();
        let k = key("erin");
        for _ in 0..4 {
            assert!(limiter.allow(&k, 1, &cx).await.unwrap().allowed);
        }
        assert!(!limiter.allow(&k, 1, &cx).await.unwrap().allowed);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(limiter.allow(&k, 1, &cx).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn premium_multiplier_uses_distinct_state() {
        let limiter = LocalLimiter::new(LimiterConfig {
            premium_multiplier: 3,
            ..cfg(Algorithm::TokenBucket, 2, Duration::from_secs(10), 0)
        })
        .unwrap();
        let cx = CancelContext::new();
        let plain = Key::new(Level::User, Identifier::plain("frank"));
        let premium = Key::new(Level::User, Identifier::premium("frank"));
        // Premium gets 2*3=6 capacity, independent of the plain identifier's bucket.
        for _ in 0..6 {
            assert!(limiter.allow(&premium, 1, &cx).await.unwrap().allowed);
        }
        assert!(!limiter.allow(&premium, 1, &cx).await.unwrap().allowed);
        assert!(limiter.allow(&plain, 1, &cx).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn sweep_idle_evicts_stale_keys() {
        let limiter = LocalLimiter::new(cfg(Algorithm::TokenBucket, 5, Duration::from_millis(10), 0)).unwrap();
        let cx = CancelContext::new();
        let k = key("gina");
        limiter.allow(&k, 1, &cx).await.unwrap();
        assert_eq!(limiter.map.len(), 1);
        tokio::time::sleep(Duration::from_millis(40)).await;
        limiter.sweep_idle();
        assert_eq!(limiter.map.len(), 0);
    }
}
