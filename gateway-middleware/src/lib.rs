//! gateway-middleware
//!
//! Components B, C, D, I of the gateway request plane: the multi-level
//! limiter composer, the quota manager, admission middleware, and the
//! tenant gate, plus the [`builder::AdmitterBuilder`] that onion-composes
//! single-key layers around an [`gateway_core::AlwaysAdmit`] terminal.
#![warn(missing_docs)]

/// Component D: derives request keys, runs the limiter then quota, shapes
/// the admitted headers and denied body.
pub mod admission;
/// Composes single-key [`gateway_core::Admitter`] layers.
pub mod builder;
/// Per-endpoint config resolution (exact path / longest-prefix wildcard / default).
pub mod endpoint;
/// Component B: per-level limiter composition with whitelist bypass.
pub mod multi_level;
/// Quota period-boundary arithmetic shared by [`quota`].
pub mod period;
/// Component C: long-horizon soft/hard quota accounting.
pub mod quota;
/// Component I: tenant status and plan-level validation.
pub mod tenant;

pub use admission::{AdmissionHeaders, AdmissionMiddleware, AdmissionOutcome, DenialBody, EndpointAdmission, QuotaHeaders, RequestKeys, denial_body_json};
pub use builder::AdmitterBuilder;
pub use endpoint::EndpointRules;
pub use multi_level::{LevelCheck, MultiLevelLimiter};
pub use quota::{MultiQuota, MultiQuotaOutcome, NamedQuota, QuotaManager};
pub use tenant::{TenantDirectory, TenantGateMiddleware};
