//! Aggregator (component F, spec §4.F): tick-driven materialization of the
//! collector's in-memory aggregates into time-bucketed persistent storage,
//! plus retention sweeps and read interfaces over that storage.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use gateway_types::{AggregatedProviderMetrics, GatewayError, TimeBucketRow};
#[cfg(feature = "tracing")]
use tracing::{debug, warn};

use crate::collector::MetricsCollector;

/// Out-of-scope persistence boundary for time-bucketed stats (spec §1: the
/// persistence schema/migrations are an external collaborator). A host
/// application backs this with whatever time-series store it runs.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Persist one materialized row.
    ///
    /// # Errors
    /// Returns any error describing why the row could not be written.
    async fn write_row(&self, row: TimeBucketRow) -> Result<(), GatewayError>;

    /// Sum every row for `provider_id` whose `bucket_start` falls in `[start, end)`.
    ///
    /// # Errors
    /// Returns any error describing why the range could not be read.
    async fn window(
        &self,
        provider_id: &str,
        start: u64,
        end: u64,
    ) -> Result<AggregatedProviderMetrics, GatewayError>;

    /// The `n` most recent rows for `provider_id`, newest last.
    ///
    /// # Errors
    /// Returns any error describing why the rows could not be read.
    async fn recent_rows(&self, provider_id: &str, n: usize) -> Result<Vec<TimeBucketRow>, GatewayError>;

    /// Delete every row (and any raw request log, per the store's own
    /// retention policy) with `bucket_start < cutoff_unix`. Returns the
    /// number of rows deleted.
    ///
    /// # Errors
    /// Returns any error describing why the sweep could not run.
    async fn delete_older_than(&self, cutoff_unix: u64) -> Result<u64, GatewayError>;
}

/// Tuning knobs for the aggregator's tick and retention cadence.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    /// How often the aggregator materializes a row per provider and resets
    /// the collector's in-memory counters.
    pub tick_interval: Duration,
    /// How often the slower retention sweep runs.
    pub retention_interval: Duration,
    /// Rows (and raw logs) older than this many days are deleted by retention.
    pub retention_days: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            retention_interval: Duration::from_secs(3_600),
            retention_days: 30,
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs()
}

fn truncate_to_minute(now: u64) -> u64 {
    (now / 60) * 60
}

/// Materializes [`MetricsCollector`] aggregates into [`AggregateStore`] rows
/// on a ticker, and runs a slower retention sweep (spec §4.F).
pub struct Aggregator {
    collector: Arc<MetricsCollector>,
    store: Arc<dyn AggregateStore>,
    config: AggregatorConfig,
}

impl Aggregator {
    /// Construct an aggregator materializing `collector`'s counters into `store`.
    #[must_use]
    pub fn new(collector: Arc<MetricsCollector>, store: Arc<dyn AggregateStore>, config: AggregatorConfig) -> Arc<Self> {
        Arc::new(Self { collector, store, config })
    }

    /// Run exactly one tick: drain-and-reset the collector's aggregates,
    /// materialize one row per provider at the current minute boundary.
    ///
    /// Boundary semantics (spec §4.F): counters are reset on every tick, so
    /// each row reflects only the traffic observed since the previous tick.
    pub async fn tick_once(&self) {
        let bucket_start = truncate_to_minute(now_unix());
        let drained = self.collector.drain_aggregates();
        for (provider_id, metrics) in drained {
            let row = TimeBucketRow { provider_id: provider_id.clone(), bucket_start, metrics };
            if let Err(_e) = self.store.write_row(row).await {
                #[cfg(feature = "tracing")]
                warn!(target = "gateway::telemetry::aggregator", provider = %provider_id, error = %_e, "failed to materialize tick row");
            }
        }
    }

    /// Run exactly one retention sweep: delete rows older than `retention_days`.
    pub async fn retention_sweep_once(&self) {
        let cutoff = now_unix().saturating_sub(u64::from(self.config.retention_days) * 86_400);
        match self.store.delete_older_than(cutoff).await {
            Ok(_n) => {
                #[cfg(feature = "tracing")]
                debug!(target = "gateway::telemetry::aggregator", deleted = _n, cutoff, "retention sweep complete");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                warn!(target = "gateway::telemetry::aggregator", error = %_e, "retention sweep failed");
            }
        }
    }

    /// Summed metrics for `provider_id` over `[start, end)`, delegating bucket
    /// inference to the store (spec §4.F: "bucket size inferred from range length").
    ///
    /// # Errors
    /// Propagates any [`AggregateStore::window`] error.
    pub async fn window(&self, provider_id: &str, start: u64, end: u64) -> Result<AggregatedProviderMetrics, GatewayError> {
        self.store.window(provider_id, start, end).await
    }

    /// The `n` most recent hourly rows for `provider_id`.
    ///
    /// # Errors
    /// Propagates any [`AggregateStore::recent_rows`] error.
    pub async fn hourly(&self, provider_id: &str, n: usize) -> Result<Vec<TimeBucketRow>, GatewayError> {
        self.store.recent_rows(provider_id, n).await
    }

    /// The `n` most recent daily rows for `provider_id`.
    ///
    /// # Errors
    /// Propagates any [`AggregateStore::recent_rows`] error.
    pub async fn daily(&self, provider_id: &str, n: usize) -> Result<Vec<TimeBucketRow>, GatewayError> {
        self.store.recent_rows(provider_id, n).await
    }

    /// Parallel single-window query across `providers` over the trailing `duration`.
    ///
    /// # Errors
    /// Returns the first error any constituent window query raises.
    pub async fn compare(
        &self,
        providers: &[String],
        duration: Duration,
    ) -> Result<Vec<(String, AggregatedProviderMetrics)>, GatewayError> {
        let end = now_unix();
        let start = end.saturating_sub(duration.as_secs());
        let futures = providers.iter().map(|p| async move { (p.clone(), self.window(p, start, end).await) });
        let results = futures::future::join_all(futures).await;
        let mut out = Vec::with_capacity(results.len());
        for (provider, res) in results {
            out.push((provider, res?));
        }
        Ok(out)
    }

    /// Run the tick and retention loops until `stop` resolves.
    pub async fn run(self: &Arc<Self>, mut stop: tokio::sync::oneshot::Receiver<()>) {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        let mut retention = tokio::time::interval(self.config.retention_interval);
        loop {
            tokio::select! {
                _ = tick.tick() => self.tick_once().await,
                _ = retention.tick() => self.retention_sweep_once().await,
                _ = &mut stop => break,
            }
        }
    }
}

/// Spawn [`Aggregator::run`] as a background task.
#[must_use]
pub fn spawn(aggregator: Arc<Aggregator>) -> gateway_core::StreamHandle {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { aggregator.run(stop_rx).await });
    gateway_core::StreamHandle::new(handle, stop_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorConfig, MetricsCollector, MetricsSink};
    use gateway_types::RequestMetric;
    use std::sync::Mutex;

    struct MemStore {
        rows: Mutex<Vec<TimeBucketRow>>,
    }

    impl MemStore {
        fn new() -> Self {
            Self { rows: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl AggregateStore for MemStore {
        async fn write_row(&self, row: TimeBucketRow) -> Result<(), GatewayError> {
            self.rows.lock().unwrap().push(row);
            Ok(())
        }

        async fn window(&self, provider_id: &str, start: u64, end: u64) -> Result<AggregatedProviderMetrics, GatewayError> {
            let mut out = AggregatedProviderMetrics::default();
            for row in self.rows.lock().unwrap().iter() {
                if row.provider_id == provider_id && row.bucket_start >= start && row.bucket_start < end {
                    out.total += row.metrics.total;
                    out.success += row.metrics.success;
                    out.error += row.metrics.error;
                    out.total_latency_ms += row.metrics.total_latency_ms;
                    out.total_tokens += row.metrics.total_tokens;
                    out.total_cost += row.metrics.total_cost;
                }
            }
            Ok(out)
        }

        async fn recent_rows(&self, provider_id: &str, n: usize) -> Result<Vec<TimeBucketRow>, GatewayError> {
            let rows = self.rows.lock().unwrap();
            let mut matching: Vec<TimeBucketRow> =
                rows.iter().filter(|r| r.provider_id == provider_id).cloned().collect();
            matching.sort_by_key(|r| r.bucket_start);
            let len = matching.len();
            Ok(matching.split_off(len.saturating_sub(n)))
        }

        async fn delete_older_than(&self, cutoff_unix: u64) -> Result<u64, GatewayError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|r| r.bucket_start >= cutoff_unix);
            Ok((before - rows.len()) as u64)
        }
    }

    struct NoopSink;
    #[async_trait]
    impl MetricsSink for NoopSink {
        async fn write_batch(&self, _batch: Vec<RequestMetric>) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn metric(provider: &str) -> RequestMetric {
        RequestMetric {
            provider_id: provider.to_string(),
            model_id: "m".to_string(),
            user_id: None,
            tenant_id: None,
            status_code: 200,
            latency_ms: 50,
            input_tokens: 1,
            output_tokens: 1,
            success: true,
            error_kind: None,
            estimated_cost: 0.001,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn tick_materializes_and_resets_collector() {
        let collector = MetricsCollector::new(Arc::new(NoopSink), CollectorConfig::default());
        collector.record(metric("openai")).await;
        collector.record(metric("openai")).await;

        let store = Arc::new(MemStore::new());
        let aggregator = Aggregator::new(Arc::clone(&collector), store.clone(), AggregatorConfig::default());
        aggregator.tick_once().await;

        assert_eq!(collector.provider_snapshot("openai").total, 0);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
        assert_eq!(store.rows.lock().unwrap()[0].metrics.total, 2);
    }

    #[tokio::test]
    async fn retention_sweep_deletes_rows_before_cutoff() {
        let store = Arc::new(MemStore::new());
        store
            .write_row(TimeBucketRow { provider_id: "openai".into(), bucket_start: 0, metrics: AggregatedProviderMetrics::default() })
            .await
            .unwrap();
        let collector = MetricsCollector::new(Arc::new(NoopSink), CollectorConfig::default());
        let aggregator = Aggregator::new(collector, store.clone(), AggregatorConfig { retention_days: 1, ..Default::default() });
        aggregator.retention_sweep_once().await;
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn compare_queries_providers_in_parallel() {
        let store = Arc::new(MemStore::new());
        store
            .write_row(TimeBucketRow { provider_id: "openai".into(), bucket_start: now_unix(), metrics: AggregatedProviderMetrics { total: 5, ..Default::default() } })
            .await
            .unwrap();
        store
            .write_row(TimeBucketRow { provider_id: "anthropic".into(), bucket_start: now_unix(), metrics: AggregatedProviderMetrics { total: 7, ..Default::default() } })
            .await
            .unwrap();
        let collector = MetricsCollector::new(Arc::new(NoopSink), CollectorConfig::default());
        let aggregator = Aggregator::new(collector, store, AggregatorConfig::default());
        let results = aggregator
            .compare(&["openai".to_string(), "anthropic".to_string()], Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(results.iter().find(|(p, _)| p == "openai").unwrap().1.total, 5);
        assert_eq!(results.iter().find(|(p, _)| p == "anthropic").unwrap().1.total, 7);
    }
}
