//! Live aggregator (component G, spec §4.G): a short rolling window of
//! recent activity per provider, kept separate from the collector/aggregator
//! pair so realtime dashboards never contend with the flush/tick path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use gateway_types::RequestMetric;
use moka::future::Cache;

/// Tuning knobs for the rolling window and the active-user cache.
#[derive(Debug, Clone, Copy)]
pub struct LiveConfig {
    /// Number of fixed-size slices kept per provider (the rolling window depth).
    pub window_slices: usize,
    /// Duration each slice covers; `window_slices * slice_duration` is the
    /// total lookback (spec §4.G default: 60 slices of 1s = a 60s window).
    pub slice_duration: Duration,
    /// EMA smoothing factor applied to latency, in `(0, 1]`.
    pub latency_ema_alpha: f64,
    /// Max tracked entries in the active-user LRU.
    pub active_users_capacity: u64,
    /// Idle duration after which a user drops out of the active-user set.
    pub active_users_ttl: Duration,
    /// Minimum success rate (in `[0, 1]`) a provider must hold to be
    /// considered healthy (spec §4.G: "update health flag using thresholds
    /// on success rate and latency").
    pub healthy_min_success_rate: f64,
    /// Maximum EMA latency, in milliseconds, a provider may carry and still
    /// be considered healthy.
    pub healthy_max_latency_ms: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            window_slices: 60,
            slice_duration: Duration::from_secs(1),
            latency_ema_alpha: 0.2,
            active_users_capacity: 100_000,
            active_users_ttl: Duration::from_secs(300),
            healthy_min_success_rate: 0.9,
            healthy_max_latency_ms: 5_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slice {
    requests: u64,
    errors: u64,
    tokens: u64,
    cost: f64,
}

/// A point-in-time read of one provider's rolling window (spec §4.G).
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveSnapshot {
    /// Requests observed across the whole window.
    pub requests_per_window: u64,
    /// Requests per second, averaged across the whole window.
    pub requests_per_second: f64,
    /// Errors / requests across the whole window, or `0` if the window is empty.
    pub error_rate: f64,
    /// Exponential moving average of per-request latency, in milliseconds.
    pub ema_latency_ms: f64,
    /// Token throughput summed across the window.
    pub tokens_per_window: u64,
    /// Estimated cost per minute, extrapolated from the window's cost total.
    pub cost_per_minute: f64,
    /// Estimated cost per hour, extrapolated from the window's cost total.
    pub estimated_hourly_cost: f64,
    /// Count of distinct users seen within the active-user TTL.
    pub active_users: u64,
    /// Distinct users seen today (resets at UTC midnight).
    pub unique_users_today: u64,
    /// Whether the provider meets the configured success-rate and latency
    /// thresholds. This is the routing-facing health signal (spec §1:
    /// "health and success-rate signals that feed routing"); the routing
    /// policy that consumes it is an external collaborator.
    pub healthy: bool,
}

struct ProviderState {
    window: VecDeque<Slice>,
    ema_latency_ms: f64,
    active_users: Cache<String, ()>,
    daily_users: dashmap::DashSet<String>,
    daily_reset_day: std::sync::atomic::AtomicI64,
}

impl ProviderState {
    fn new(config: LiveConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_slices),
            ema_latency_ms: 0.0,
            active_users: Cache::builder()
                .max_capacity(config.active_users_capacity)
                .time_to_idle(config.active_users_ttl)
                .build(),
            daily_users: dashmap::DashSet::new(),
            daily_reset_day: std::sync::atomic::AtomicI64::new(0),
        }
    }
}

/// Per-provider metrics as last materialized into the live window.
pub type ProviderLiveMetrics = LiveSnapshot;

/// Maintains a rolling window of recent activity per provider alongside a
/// moka-backed active-user LRU, independent of the slower collector/aggregator
/// pipeline (spec §4.G).
pub struct LiveAggregator {
    providers: DashMap<String, ProviderState>,
    config: LiveConfig,
}

fn day_index(unix_secs: u64) -> i64 {
    (unix_secs / 86_400) as i64
}

impl LiveAggregator {
    /// Construct a live aggregator with the given window/LRU tuning.
    #[must_use]
    pub fn new(config: LiveConfig) -> Arc<Self> {
        Arc::new(Self { providers: DashMap::new(), config })
    }

    /// Record one completed request into its provider's current slice and
    /// refresh the active/daily user sets.
    pub async fn record(&self, metric: &RequestMetric) {
        {
            let mut state = self
                .providers
                .entry(metric.provider_id.clone())
                .or_insert_with(|| ProviderState::new(self.config));

            if state.window.is_empty() {
                state.window.push_back(Slice::default());
            }
            let slice = state.window.back_mut().expect("just ensured non-empty");
            slice.requests += 1;
            if !metric.success {
                slice.errors += 1;
            }
            slice.tokens += metric.input_tokens + metric.output_tokens;
            slice.cost += metric.estimated_cost;

            let alpha = self.config.latency_ema_alpha;
            state.ema_latency_ms = if state.ema_latency_ms == 0.0 {
                metric.latency_ms as f64
            } else {
                alpha * metric.latency_ms as f64 + (1.0 - alpha) * state.ema_latency_ms
            };

            let today = day_index(metric.timestamp);
            let last_reset = state.daily_reset_day.load(std::sync::atomic::Ordering::Relaxed);
            if today != last_reset {
                state.daily_users.clear();
                state.daily_reset_day.store(today, std::sync::atomic::Ordering::Relaxed);
            }
        }

        if let Some(user_id) = &metric.user_id {
            if let Some(state) = self.providers.get(&metric.provider_id) {
                state.active_users.insert(user_id.clone(), ()).await;
                state.daily_users.insert(user_id.clone());
            }
        }
    }

    /// Advance the rolling window by one slice, dropping the oldest slice
    /// once the window is at capacity. Call on a ticker at `slice_duration`
    /// cadence.
    pub fn advance_slice(&self) {
        for mut entry in self.providers.iter_mut() {
            let state = entry.value_mut();
            state.window.push_back(Slice::default());
            while state.window.len() > self.config.window_slices {
                state.window.pop_front();
            }
        }
    }

    /// Snapshot `provider_id`'s current rolling window, or the zero value if unseen.
    #[must_use]
    pub fn snapshot(&self, provider_id: &str) -> LiveSnapshot {
        let Some(state) = self.providers.get(provider_id) else {
            return LiveSnapshot::default();
        };

        let requests: u64 = state.window.iter().map(|s| s.requests).sum();
        let errors: u64 = state.window.iter().map(|s| s.errors).sum();
        let tokens: u64 = state.window.iter().map(|s| s.tokens).sum();
        let cost: f64 = state.window.iter().map(|s| s.cost).sum();
        let window_secs = (self.config.window_slices as f64 * self.config.slice_duration.as_secs_f64()).max(1.0);
        let success_rate = if requests == 0 { 1.0 } else { (requests - errors) as f64 / requests as f64 };
        let healthy = success_rate >= self.config.healthy_min_success_rate
            && state.ema_latency_ms <= self.config.healthy_max_latency_ms;

        LiveSnapshot {
            requests_per_window: requests,
            requests_per_second: requests as f64 / window_secs,
            error_rate: if requests == 0 { 0.0 } else { errors as f64 / requests as f64 },
            ema_latency_ms: state.ema_latency_ms,
            tokens_per_window: tokens,
            cost_per_minute: cost / window_secs * 60.0,
            estimated_hourly_cost: cost / window_secs * 3_600.0,
            active_users: state.active_users.entry_count(),
            unique_users_today: state.daily_users.len() as u64,
            healthy,
        }
    }

    /// List every provider currently tracked.
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        self.providers.iter().map(|e| e.key().clone()).collect()
    }

    /// Run the slice-advance ticker until `stop` resolves (spec §4.G:
    /// "cleanup ticker: evicts stale users and drops expired windows").
    /// Active-user eviction itself is handled lazily by `moka`'s own
    /// time-to-idle bookkeeping; this loop only rotates the rolling window.
    pub async fn run(&self, mut stop: tokio::sync::oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.slice_duration);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.advance_slice(),
                _ = &mut stop => break,
            }
        }
    }
}

/// Spawn [`LiveAggregator::run`] as a background task.
#[must_use]
pub fn spawn(live: Arc<LiveAggregator>) -> gateway_core::StreamHandle {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { live.run(stop_rx).await });
    gateway_core::StreamHandle::new(handle, stop_tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(provider: &str, user: &str, ts: u64, success: bool) -> RequestMetric {
        RequestMetric {
            provider_id: provider.to_string(),
            model_id: "m".to_string(),
            user_id: Some(user.to_string()),
            tenant_id: None,
            status_code: if success { 200 } else { 500 },
            latency_ms: 100,
            input_tokens: 5,
            output_tokens: 5,
            success,
            error_kind: None,
            estimated_cost: 0.02,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn window_sums_requests_and_error_rate() {
        let agg = LiveAggregator::new(LiveConfig::default());
        agg.record(&metric("openai", "u1", 10, true)).await;
        agg.record(&metric("openai", "u2", 10, false)).await;
        let snap = agg.snapshot("openai");
        assert_eq!(snap.requests_per_window, 2);
        assert!((snap.error_rate - 0.5).abs() < 1e-9);
        assert_eq!(snap.tokens_per_window, 20);
    }

    #[tokio::test]
    async fn ema_latency_converges_toward_recent_samples() {
        let agg = LiveAggregator::new(LiveConfig { latency_ema_alpha: 0.5, ..Default::default() });
        agg.record(&metric("openai", "u1", 1, true)).await;
        let first = agg.snapshot("openai").ema_latency_ms;
        assert!((first - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn advance_slice_evicts_oldest_beyond_capacity() {
        let agg = LiveAggregator::new(LiveConfig { window_slices: 2, ..Default::default() });
        agg.record(&metric("openai", "u1", 1, true)).await;
        agg.advance_slice();
        agg.record(&metric("openai", "u1", 2, true)).await;
        agg.advance_slice();
        agg.record(&metric("openai", "u1", 3, true)).await;
        // Window holds only 2 slices; the oldest slice's request has been evicted.
        assert_eq!(agg.snapshot("openai").requests_per_window, 2);
    }

    #[tokio::test]
    async fn daily_users_reset_on_day_boundary() {
        let agg = LiveAggregator::new(LiveConfig::default());
        agg.record(&metric("openai", "u1", 0, true)).await;
        assert_eq!(agg.snapshot("openai").unique_users_today, 1);
        agg.record(&metric("openai", "u2", 86_400, true)).await;
        assert_eq!(agg.snapshot("openai").unique_users_today, 1);
    }

    #[tokio::test]
    async fn run_loop_advances_slices_on_tick() {
        let agg = LiveAggregator::new(LiveConfig {
            window_slices: 2,
            slice_duration: Duration::from_millis(20),
            ..Default::default()
        });
        agg.record(&metric("openai", "u1", 1, true)).await;
        let handle = spawn(Arc::clone(&agg));
        tokio::time::sleep(Duration::from_millis(70)).await;
        // At least one tick has rotated the window past the initial slice.
        assert_eq!(agg.snapshot("openai").requests_per_window, 0);
        handle.stop().await;
    }

    #[tokio::test]
    async fn active_users_tracks_distinct_recent_callers() {
        let agg = LiveAggregator::new(LiveConfig::default());
        agg.record(&metric("openai", "u1", 1, true)).await;
        agg.record(&metric("openai", "u1", 2, true)).await;
        agg.record(&metric("openai", "u2", 3, true)).await;
        assert_eq!(agg.snapshot("openai").active_users, 2);
    }

    #[test]
    fn unseen_provider_returns_zero_snapshot() {
        let agg = LiveAggregator::new(LiveConfig::default());
        let snap = agg.snapshot("unknown");
        assert_eq!(snap.requests_per_window, 0);
        assert_eq!(snap.active_users, 0);
        // No data recorded yet: not flagged healthy.
        assert!(!snap.healthy);
    }

    #[tokio::test]
    async fn health_flag_drops_below_success_rate_threshold() {
        let agg = LiveAggregator::new(LiveConfig { healthy_min_success_rate: 0.9, ..LiveConfig::default() });
        for _ in 0..8 {
            agg.record(&metric("openai", "u1", 1, true)).await;
        }
        for _ in 0..2 {
            agg.record(&metric("openai", "u1", 1, false)).await;
        }
        // 80% success rate is below the 90% threshold.
        assert!(!agg.snapshot("openai").healthy);
    }

    #[tokio::test]
    async fn health_flag_drops_above_latency_threshold() {
        let agg = LiveAggregator::new(LiveConfig { healthy_max_latency_ms: 50.0, ..LiveConfig::default() });
        agg.record(&metric("openai", "u1", 1, true)).await;
        assert!(!agg.snapshot("openai").healthy);
    }
}
