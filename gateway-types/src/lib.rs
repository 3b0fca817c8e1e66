//! gateway-types
//!
//! Shared DTOs and configuration primitives for the gateway request plane:
//! limiter keys and results, quota configuration and state, telemetry
//! records, SSE wire types, tenant identity, and the unified error
//! taxonomy. No I/O or business logic lives here — see `gateway-core` for
//! the traits that operate on these types.
#![warn(missing_docs)]

mod error;
mod key;
mod limit_info;
mod limiter_config;
mod metrics;
pub mod middleware;
mod quota;
mod sse;
mod tenant;

pub use error::GatewayError;
pub use key::{Identifier, Key, Level};
pub use limit_info::{LimitInfo, UNLIMITED};
pub use limiter_config::{Algorithm, Backing, LimiterConfig, PlanPreset};
pub use metrics::{AggregatedProviderMetrics, ErrorKind, RequestMetric, TimeBucketRow};
pub use middleware::{MiddlewareLayer, MiddlewareStack};
pub use quota::{QuotaConfig, QuotaEntry, QuotaInfo, QuotaKind, QuotaPeriod};
pub use sse::{ConnectedPayload, EventType, SseEvent};
pub use tenant::{PlanLevel, TenantHandle, TenantRecord, TenantStatus, TenantStrategy};
