//! Gateway wires the rate limiter kernel, quota manager, tenant gate,
//! telemetry pipeline, and SSE hub into a single request-plane facade.
//!
//! Overview
//! - Admission order is tenant gate (I) -> multi-level limiter (B) -> quota
//!   (C), exposed as [`core::Gateway::admit_tenant`] then [`core::Gateway::admit`].
//! - Every completed request feeds [`core::Gateway::record_metric`], which
//!   updates both the write-behind collector (E, eventually materialized by
//!   F) and the realtime rolling window (G) in the same call.
//! - Realtime dashboards subscribe over [`core::Gateway::sse_register`]; the
//!   hub evicts slow consumers rather than blocking the broadcast path.
//! - Provider routing, the HTTP front door, persistence, billing, and the
//!   other concerns named in [`collaborators`] are deliberately left as
//!   trait boundaries: building one out is a host application's job, not
//!   this crate's.
//!
//! Examples
//! - Wiring a minimal gateway: see the `build_wires_tenant_then_limiter`
//!   test in `core.rs`.
#![warn(missing_docs)]

/// [`Gateway`]/[`GatewayBuilder`]/[`GatewayConfig`]: the wired request plane.
pub mod core;
/// Trait-only boundary for everything this crate deliberately doesn't implement.
pub mod collaborators;

pub use core::{Gateway, GatewayBuilder, GatewayConfig};

pub use gateway_core::{Admitter, CancelContext, GatewayError as CoreGatewayError, Limiter, QuotaStore, StreamHandle};
pub use gateway_limiter_local::LocalLimiter;
pub use gateway_limiter_redis::RedisLimiter;
pub use gateway_middleware::{
    AdmissionHeaders, AdmissionMiddleware, AdmissionOutcome, AdmitterBuilder, DenialBody, EndpointAdmission, EndpointRules,
    MultiLevelLimiter, MultiQuota, NamedQuota, QuotaManager, RequestKeys, TenantDirectory, TenantGateMiddleware,
};
pub use gateway_sse::{ClientStream, HubConfig, SseHub};
pub use gateway_telemetry::{Aggregator, AggregatorConfig, CollectorConfig, LiveAggregator, LiveConfig, LiveSnapshot, MetricsCollector, MetricsSink};
pub use gateway_types::{
    Algorithm, Backing, GatewayError, Identifier, Key, Level, LimitInfo, LimiterConfig, PlanLevel, PlanPreset, QuotaConfig, QuotaKind,
    QuotaPeriod, TenantHandle, TenantRecord, TenantStatus, TenantStrategy,
};
