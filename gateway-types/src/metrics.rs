//! Wire/storage DTOs for the telemetry stack (spec §3, components E/F/G).

use serde::{Deserialize, Serialize};

/// Coarse classification of a failed request, used for aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Upstream returned a non-2xx status unrelated to timeout/quota.
    UpstreamError,
    /// The call exceeded its deadline.
    Timeout,
    /// Denied by the quota manager (component C).
    QuotaExhausted,
    /// Denied by the limiter (component B).
    RateLimited,
    /// Anything else (network errors, decode failures, etc.).
    Other,
}

/// One completed request, as handed to the metrics collector (component E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMetric {
    /// Upstream provider identifier.
    pub provider_id: String,
    /// Requested model identifier.
    pub model_id: String,
    /// Authenticated user identifier, if any.
    pub user_id: Option<String>,
    /// Owning tenant identifier, if any.
    pub tenant_id: Option<String>,
    /// HTTP status code returned to the caller.
    pub status_code: u16,
    /// Observed latency in milliseconds.
    pub latency_ms: u64,
    /// Prompt/input token count, if known.
    pub input_tokens: u64,
    /// Completion/output token count, if known.
    pub output_tokens: u64,
    /// Whether the request is counted as a success.
    pub success: bool,
    /// Failure classification; `None` when `success` is true.
    pub error_kind: Option<ErrorKind>,
    /// Estimated monetary cost of the request, in the host's billing unit.
    pub estimated_cost: f64,
    /// Unix-second timestamp the request completed.
    pub timestamp: u64,
}

/// Monotonically increasing per-provider roll-up (spec §3).
///
/// Reset only by an explicit flush (component F's tick), never on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedProviderMetrics {
    /// Total requests observed.
    pub total: u64,
    /// Requests counted as successful.
    pub success: u64,
    /// Requests counted as failed (any [`ErrorKind`]).
    pub error: u64,
    /// Requests that failed with [`ErrorKind::Timeout`].
    pub timeout: u64,
    /// Requests that failed with [`ErrorKind::QuotaExhausted`].
    pub quota_exhausted: u64,
    /// Sum of `latency_ms` across all recorded requests.
    pub total_latency_ms: u64,
    /// Sum of `input_tokens + output_tokens`.
    pub total_tokens: u64,
    /// Sum of `estimated_cost`.
    pub total_cost: f64,
    /// Unix-second timestamp of the most recent `record`.
    pub last_updated: u64,
}

impl AggregatedProviderMetrics {
    /// Fold one [`RequestMetric`] into this aggregate.
    pub fn record(&mut self, m: &RequestMetric) {
        self.total += 1;
        if m.success {
            self.success += 1;
        } else {
            self.error += 1;
            match m.error_kind {
                Some(ErrorKind::Timeout) => self.timeout += 1,
                Some(ErrorKind::QuotaExhausted) => self.quota_exhausted += 1,
                _ => {}
            }
        }
        self.total_latency_ms += m.latency_ms;
        self.total_tokens += m.input_tokens + m.output_tokens;
        self.total_cost += m.estimated_cost;
        self.last_updated = self.last_updated.max(m.timestamp);
    }

    /// Mean latency in milliseconds, or `0` if no requests were recorded.
    #[must_use]
    pub fn avg_latency_ms(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.total as f64
        }
    }

    /// Fraction of requests that succeeded, in `[0, 1]`.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

/// One materialized row of time-bucketed stats (component F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucketRow {
    /// Provider the row belongs to.
    pub provider_id: String,
    /// Unix-second timestamp truncated to the bucket's start.
    pub bucket_start: u64,
    /// Aggregate snapshot materialized at that tick.
    pub metrics: AggregatedProviderMetrics,
}
