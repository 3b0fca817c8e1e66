//! Metrics collector (component E, spec §4.E).
//!
//! `record` updates the per-provider aggregate under a short critical
//! section (a `DashMap` shard lock, never the whole map) and appends the
//! full record to a bounded in-memory buffer; crossing the flush watermark
//! wakes the background flush task. Flush failures are logged and the batch
//! is dropped (spec §7 `TransientFlushError`: telemetry is lossy by design,
//! never operational state).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use gateway_types::{AggregatedProviderMetrics, GatewayError, RequestMetric};
use tokio::sync::{Mutex, Notify};
#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Out-of-scope persistence boundary: durably stores flushed raw records.
///
/// The collector does not own storage; a host application provides an
/// implementation backed by whatever datastore it runs (spec §1).
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Persist one batch of raw records. A failure is logged and the batch
    /// is dropped by the caller; it must not be retried internally.
    ///
    /// # Errors
    /// Returns any error describing why the batch could not be written.
    async fn write_batch(&self, batch: Vec<RequestMetric>) -> Result<(), GatewayError>;
}

/// Tuning knobs for the collector's write-behind flush (spec §4.E: "interval
/// and batch size are configurable").
#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    /// Buffer length that triggers a background flush as soon as it's crossed.
    pub flush_watermark: usize,
    /// Maximum number of records written to the sink per flush call.
    pub flush_batch_size: usize,
    /// Periodic flush cadence, independent of the watermark.
    pub flush_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            flush_watermark: 1_000,
            flush_batch_size: 500,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Thread-safe in-memory roll-up keyed by provider, with a write-behind
/// flush of raw per-request records (spec §4.E).
pub struct MetricsCollector {
    aggregates: DashMap<String, AggregatedProviderMetrics>,
    buffer: Mutex<Vec<RequestMetric>>,
    notify: Notify,
    config: CollectorConfig,
    sink: Arc<dyn MetricsSink>,
}

impl MetricsCollector {
    /// Construct a collector flushing into `sink` per `config`.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricsSink>, config: CollectorConfig) -> Arc<Self> {
        Arc::new(Self {
            aggregates: DashMap::new(),
            buffer: Mutex::new(Vec::new()),
            notify: Notify::new(),
            config,
            sink,
        })
    }

    /// Record one completed request: fold it into the provider's aggregate
    /// and append it to the flush buffer. Never suspends (spec §5); the
    /// buffer push only wakes the background flush task, it doesn't await it.
    pub async fn record(&self, metric: RequestMetric) {
        self.aggregates
            .entry(metric.provider_id.clone())
            .or_default()
            .record(&metric);

        let crossed_watermark = {
            let mut buf = self.buffer.lock().await;
            buf.push(metric);
            buf.len() >= self.config.flush_watermark
        };
        if crossed_watermark {
            self.notify.notify_one();
        }
    }

    /// Deep-copy read of every provider's current aggregate (spec §4.E:
    /// "read operations return deep copies ... callers cannot corrupt
    /// internal state"). Never resets counters.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, AggregatedProviderMetrics> {
        self.aggregates
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Deep-copy read of one provider's aggregate, or the zero value if unseen.
    #[must_use]
    pub fn provider_snapshot(&self, provider_id: &str) -> AggregatedProviderMetrics {
        self.aggregates.get(provider_id).map_or_else(AggregatedProviderMetrics::default, |e| *e)
    }

    /// Drain and reset every provider's aggregate, returning the pre-reset
    /// snapshot. Reserved for the aggregator's tick (component F); ordinary
    /// reads must use [`Self::snapshot`] instead, which never resets.
    #[must_use]
    pub fn drain_aggregates(&self) -> HashMap<String, AggregatedProviderMetrics> {
        let mut out = HashMap::with_capacity(self.aggregates.len());
        for mut entry in self.aggregates.iter_mut() {
            out.insert(entry.key().clone(), std::mem::take(entry.value_mut()));
        }
        out
    }

    /// Drain up to `flush_batch_size` buffered records and hand them to the
    /// sink. On sink failure the batch is logged and dropped (spec §7).
    async fn flush_once(&self) {
        let batch = {
            let mut buf = self.buffer.lock().await;
            if buf.is_empty() {
                return;
            }
            let take = buf.len().min(self.config.flush_batch_size);
            buf.drain(..take).collect::<Vec<_>>()
        };
        let len = batch.len();
        match self.sink.write_batch(batch).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                debug!(target = "gateway::telemetry::collector", records = len, "flushed batch");
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                warn!(target = "gateway::telemetry::collector", records = len, error = %_e, "dropping batch after flush failure");
            }
        }
    }

    /// Force-drain every buffered record, ignoring the batch-size cap. Call
    /// on shutdown (spec §4.E: "a forced flush runs on shutdown").
    pub async fn flush_all(&self) {
        loop {
            let empty = self.buffer.lock().await.is_empty();
            if empty {
                break;
            }
            self.flush_once().await;
        }
    }

    /// Run the background flush loop until `stop` resolves: flush on the
    /// configured interval, or immediately whenever the watermark is crossed.
    pub async fn run_flush_loop(self: &Arc<Self>, mut stop: tokio::sync::oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.flush_once().await,
                () = self.notify.notified() => self.flush_once().await,
                _ = &mut stop => {
                    self.flush_all().await;
                    break;
                }
            }
        }
    }
}

/// Spawn [`MetricsCollector::run_flush_loop`] as a background task.
#[must_use]
pub fn spawn_flush_loop(collector: Arc<MetricsCollector>) -> gateway_core::StreamHandle {
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { collector.run_flush_loop(stop_rx).await });
    gateway_core::StreamHandle::new(handle, stop_tx)
}
