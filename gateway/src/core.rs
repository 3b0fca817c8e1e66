use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use gateway_core::{Admitter, CancelContext, GatewayError, StreamHandle};
use gateway_middleware::{AdmissionMiddleware, AdmissionOutcome, AdmitterBuilder, MultiLevelLimiter, MultiQuota, NamedQuota, QuotaManager, RequestKeys, TenantDirectory, TenantGateMiddleware};
use gateway_sse::{ClientStream, HubConfig, SseHub};
use gateway_telemetry::aggregator::{AggregateStore, Aggregator, AggregatorConfig};
use gateway_telemetry::collector::{CollectorConfig, MetricsCollector, MetricsSink};
use gateway_telemetry::live::{LiveAggregator, LiveConfig, LiveSnapshot};
use gateway_types::{AggregatedProviderMetrics, EventType, Key, Level, PlanLevel, RequestMetric, TimeBucketRow};
use std::time::Duration;
use tokio::sync::Mutex;

/// Tunable knobs for every subsystem a [`Gateway`] wires together.
///
/// Dynamic collaborators (limiters, the tenant directory, telemetry sinks)
/// are registered on [`GatewayBuilder`] directly rather than living here,
/// mirroring the teacher's split between `BorsaConfig` (plain data) and
/// `BorsaBuilder::with_connector` (trait objects).
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Write-behind flush tuning for the metrics collector (component E).
    pub collector: CollectorConfig,
    /// Tick/retention tuning for the aggregator (component F).
    pub aggregator: AggregatorConfig,
    /// Rolling-window/active-user tuning for the live aggregator (component G).
    pub live: LiveConfig,
    /// Queue/heartbeat tuning for the SSE hub (component H).
    pub sse: HubConfig,
    /// Minimum plan level required downstream, if plan gating is enabled.
    pub minimum_plan: Option<PlanLevel>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            aggregator: AggregatorConfig::default(),
            live: LiveConfig::default(),
            sse: HubConfig::default(),
            minimum_plan: None,
        }
    }
}

struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn write_batch(&self, _batch: Vec<RequestMetric>) -> Result<(), GatewayError> {
        Ok(())
    }
}

struct NoopAggregateStore;

#[async_trait]
impl AggregateStore for NoopAggregateStore {
    async fn write_row(&self, _row: TimeBucketRow) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn window(&self, _provider_id: &str, _start: u64, _end: u64) -> Result<AggregatedProviderMetrics, GatewayError> {
        Ok(AggregatedProviderMetrics::default())
    }

    async fn recent_rows(&self, _provider_id: &str, _n: usize) -> Result<Vec<TimeBucketRow>, GatewayError> {
        Ok(Vec::new())
    }

    async fn delete_older_than(&self, _cutoff_unix: u64) -> Result<u64, GatewayError> {
        Ok(0)
    }
}

/// Builder assembling a [`Gateway`] from its constituent components.
///
/// Registration order mirrors the teacher's `BorsaBuilder`: start from
/// [`GatewayBuilder::new`], register at least one limiter via
/// [`Self::with_limiter`], layer in whatever else the deployment needs, then
/// [`Self::build`].
pub struct GatewayBuilder {
    cfg: GatewayConfig,
    limiters: Vec<(Level, Arc<dyn gateway_core::Limiter>)>,
    whitelist: HashSet<String>,
    quotas: Vec<NamedQuota>,
    quota_store: Option<Arc<dyn gateway_core::QuotaStore>>,
    tenant_directory: Option<Arc<dyn TenantDirectory>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    aggregate_store: Option<Arc<dyn AggregateStore>>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    /// Start building a gateway with default tuning and no limiters registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cfg: GatewayConfig::default(),
            limiters: Vec::new(),
            whitelist: HashSet::new(),
            quotas: Vec::new(),
            quota_store: None,
            tenant_directory: None,
            metrics_sink: None,
            aggregate_store: None,
        }
    }

    /// Replace the default tuning knobs wholesale.
    #[must_use]
    pub const fn config(mut self, cfg: GatewayConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Register the limiter enforcing `level` (component A, one instance per
    /// checked [`Level`]; local or distributed, the builder doesn't care).
    #[must_use]
    pub fn with_limiter(mut self, level: Level, limiter: Arc<dyn gateway_core::Limiter>) -> Self {
        self.limiters.push((level, limiter));
        self
    }

    /// Identifiers in `whitelist` bypass every level unconditionally (spec §4.B).
    #[must_use]
    pub fn whitelist(mut self, whitelist: HashSet<String>) -> Self {
        self.whitelist = whitelist;
        self
    }

    /// Register one named quota (component C); may be called more than once.
    #[must_use]
    pub fn with_quota(mut self, quota: NamedQuota) -> Self {
        self.quotas.push(quota);
        self
    }

    /// Override the quota backing store. Defaults to an in-process [`QuotaManager`].
    #[must_use]
    pub fn quota_store(mut self, store: Arc<dyn gateway_core::QuotaStore>) -> Self {
        self.quota_store = Some(store);
        self
    }

    /// Enable the tenant gate (component I) against `directory`.
    #[must_use]
    pub fn tenant_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.tenant_directory = Some(directory);
        self
    }

    /// Require at least `plan` for every tenant admitted through the gate.
    #[must_use]
    pub const fn minimum_plan(mut self, plan: PlanLevel) -> Self {
        self.cfg.minimum_plan = Some(plan);
        self
    }

    /// Durable sink for raw request records (component E). Defaults to a
    /// no-op sink: telemetry is lossy by design (spec §7) and a host that
    /// doesn't need durable raw logs can skip wiring one up.
    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    /// Durable store for time-bucketed rows (component F). Defaults to a
    /// no-op store for the same reason as [`Self::metrics_sink`].
    #[must_use]
    pub fn aggregate_store(mut self, store: Arc<dyn AggregateStore>) -> Self {
        self.aggregate_store = Some(store);
        self
    }

    /// Build the gateway, spawning its background tasks (flush loop,
    /// aggregator tick, SSE hub run-loop).
    ///
    /// # Errors
    /// Returns `GatewayError::ConfigurationError` if no limiter has been
    /// registered via [`Self::with_limiter`].
    pub fn build(self) -> Result<Gateway, GatewayError> {
        if self.limiters.is_empty() {
            return Err(GatewayError::config(
                "no limiters registered; add at least one via with_limiter(...)",
            ));
        }

        let composer = MultiLevelLimiter::new(self.whitelist);
        let quota = if self.quotas.is_empty() {
            None
        } else {
            let store = self.quota_store.unwrap_or_else(|| Arc::new(QuotaManager::new()));
            Some(MultiQuota::new(store, self.quotas))
        };
        let admission = AdmissionMiddleware::new(self.limiters, composer, quota);

        let tenant_admitter = self
            .tenant_directory
            .map(|directory| {
                AdmitterBuilder::new()
                    .layer(TenantGateMiddleware::new(directory, self.cfg.minimum_plan))
                    .build()
            })
            .transpose()?;

        let sink = self.metrics_sink.unwrap_or_else(|| Arc::new(NoopMetricsSink));
        let collector = MetricsCollector::new(sink, self.cfg.collector);
        let store = self.aggregate_store.unwrap_or_else(|| Arc::new(NoopAggregateStore));
        let aggregator = Aggregator::new(Arc::clone(&collector), store, self.cfg.aggregator);
        let live = LiveAggregator::new(self.cfg.live);
        let (sse, sse_handle) = SseHub::spawn(self.cfg.sse);

        let mut background = Vec::new();
        background.push(gateway_telemetry::collector::spawn_flush_loop(Arc::clone(&collector)));
        background.push(gateway_telemetry::aggregator::spawn(Arc::clone(&aggregator)));
        background.push(gateway_telemetry::live::spawn(Arc::clone(&live)));
        background.push(sse_handle);

        Ok(Gateway {
            admission,
            tenant_admitter,
            collector,
            aggregator,
            live,
            sse,
            background: Mutex::new(background),
        })
    }
}

/// A fully wired gateway request plane: tenant gate (I) in front of
/// admission (D, itself composing B and C), with telemetry (E/F/G) and the
/// SSE hub (H) fed from the same request stream.
///
/// Construct via [`GatewayBuilder`]; call [`Self::shutdown`] to stop every
/// background task gracefully.
pub struct Gateway {
    admission: AdmissionMiddleware,
    tenant_admitter: Option<Arc<dyn Admitter>>,
    collector: Arc<MetricsCollector>,
    aggregator: Arc<Aggregator>,
    live: Arc<LiveAggregator>,
    sse: SseHub,
    background: Mutex<Vec<StreamHandle>>,
}

impl Gateway {
    /// Start building a gateway.
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Validate `tenant_key` against the tenant gate, if one is configured.
    /// Unconditionally admits when no tenant directory was registered.
    ///
    /// # Errors
    /// Returns `GatewayError::TenantDenied` per [`gateway_middleware::tenant`].
    pub async fn admit_tenant(&self, tenant_key: &Key) -> Result<(), GatewayError> {
        match &self.tenant_admitter {
            Some(admitter) => admitter.admit(tenant_key).await,
            None => Ok(()),
        }
    }

    /// Run admission (component D: multi-level limiter then quota) for one request.
    ///
    /// # Errors
    /// Propagates any error [`AdmissionMiddleware::admit`] raises.
    pub async fn admit(&self, keys: &RequestKeys, n: u64, cx: &CancelContext) -> Result<AdmissionOutcome, GatewayError> {
        self.admission.admit(keys, n, cx).await
    }

    /// Record one completed request into the collector and the live window.
    pub async fn record_metric(&self, metric: RequestMetric) {
        self.live.record(&metric).await;
        self.collector.record(metric).await;
    }

    /// Point-in-time rolling-window read for `provider_id` (component G).
    #[must_use]
    pub fn live_snapshot(&self, provider_id: &str) -> LiveSnapshot {
        self.live.snapshot(provider_id)
    }

    /// Summed historical metrics for `provider_id` over `[start, end)` (component F).
    ///
    /// # Errors
    /// Propagates any error the configured [`AggregateStore`] raises.
    pub async fn window(&self, provider_id: &str, start: u64, end: u64) -> Result<AggregatedProviderMetrics, GatewayError> {
        self.aggregator.window(provider_id, start, end).await
    }

    /// The `n` most recent hourly rows for `provider_id` (component F).
    ///
    /// # Errors
    /// Propagates any error the configured [`AggregateStore`] raises.
    pub async fn hourly(&self, provider_id: &str, n: usize) -> Result<Vec<TimeBucketRow>, GatewayError> {
        self.aggregator.hourly(provider_id, n).await
    }

    /// The `n` most recent daily rows for `provider_id` (component F).
    ///
    /// # Errors
    /// Propagates any error the configured [`AggregateStore`] raises.
    pub async fn daily(&self, provider_id: &str, n: usize) -> Result<Vec<TimeBucketRow>, GatewayError> {
        self.aggregator.daily(provider_id, n).await
    }

    /// Parallel single-window comparison across `providers` (component F).
    ///
    /// # Errors
    /// Returns the first error any constituent window query raises.
    pub async fn compare(&self, providers: &[String], duration: Duration) -> Result<Vec<(String, AggregatedProviderMetrics)>, GatewayError> {
        self.aggregator.compare(providers, duration).await
    }

    /// Register a new SSE client subscribed to `channels` (component H).
    ///
    /// # Errors
    /// Propagates any error [`SseHub::register`] raises.
    pub async fn sse_register(&self, client_id: impl Into<String>, channels: HashSet<EventType>, cx: &CancelContext) -> Result<ClientStream, GatewayError> {
        self.sse.register(client_id, channels, cx).await
    }

    /// Publish `payload` on `event_type` to every current SSE subscriber (component H).
    ///
    /// # Errors
    /// Propagates any error [`SseHub::broadcast`] raises.
    pub async fn sse_broadcast(&self, event_type: EventType, payload: serde_json::Value) -> Result<(), GatewayError> {
        self.sse.broadcast(event_type, payload).await
    }

    /// Stop every background task gracefully: forces a final telemetry
    /// flush, a final aggregator tick's worth of pending state is left for
    /// the next process to resume (aggregator state itself is not
    /// persisted), and drops the SSE hub's run-loop.
    pub async fn shutdown(&self) {
        let mut handles = self.background.lock().await;
        for handle in handles.drain(..) {
            handle.stop().await;
        }
    }
}
