//! gateway-telemetry
//!
//! Components E, F, G of the gateway request plane: a thread-safe in-memory
//! metrics collector with write-behind flush, a tick-driven time-bucket
//! aggregator, and a rolling-window live aggregator used to answer the
//! realtime metrics endpoint (spec §4.E-G).
//!
//! Persistence for time-bucketed rows is an out-of-scope concern (spec §1):
//! [`aggregator::AggregateStore`] is the trait boundary a host application
//! implements over whatever storage it runs.
#![warn(missing_docs)]

/// Component F: tick-driven materialization of time-bucketed stats.
pub mod aggregator;
/// Component E: per-provider aggregate roll-up with write-behind flush.
pub mod collector;
/// Component G: rolling-window live metrics.
pub mod live;

pub use aggregator::{Aggregator, AggregatorConfig, AggregateStore};
pub use collector::{CollectorConfig, MetricsCollector, MetricsSink};
pub use live::{spawn as spawn_live_ticker, LiveAggregator, LiveConfig, LiveSnapshot, ProviderLiveMetrics};
