//! Unified error taxonomy for the gateway request plane (spec §7).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared by every request-plane component.
///
/// Variants map directly onto the kinds enumerated in spec §7. The
/// admission middleware (component D) converts only [`Self::LimitExceeded`],
/// [`Self::QuotaExceededHard`], and the distributed-backing failure variant
/// (when configured to fail closed) into HTTP responses; everything else
/// bubbles to the caller unless explicitly recovered.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
#[non_exhaustive]
pub enum GatewayError {
    /// Rate limit denied the call. Non-fatal; never logged at error level.
    #[error("rate limit exceeded: limit={limit} remaining={remaining} retry_after_ms={retry_after_ms}")]
    LimitExceeded {
        /// Effective limit at the time of denial.
        limit: i64,
        /// Remaining units (always 0 for a denial).
        remaining: i64,
        /// Unix-second reset timestamp.
        reset: u64,
        /// Milliseconds until a retry may succeed.
        retry_after_ms: u64,
    },

    /// A hard quota denied the call.
    #[error("quota exceeded: used={used} limit={limit}")]
    QuotaExceededHard {
        /// Units consumed in the current period.
        used: u64,
        /// Configured limit.
        limit: u64,
        /// Unix-second timestamp of the next period rollover.
        reset: u64,
    },

    /// The distributed limiter/quota backing store could not be reached.
    ///
    /// Logged at warn. For hard levels (global, user) the default is to
    /// fail closed (surfaced as this variant, which the middleware then
    /// treats as a deny); fail-open is opt-in per [`crate::LimiterConfig::fail_closed`].
    #[error("backing store unavailable: {message}")]
    BackingStoreUnavailable {
        /// Description of the underlying transport failure.
        message: String,
    },

    /// Invalid configuration detected at construction time. Fatal.
    #[error("configuration error: {message}")]
    ConfigurationError {
        /// Human-readable description of the invalid tuple.
        message: String,
    },

    /// The caller's context was cancelled before the operation completed.
    ///
    /// Propagated verbatim; never coerced into a 429 or any business error.
    #[error("operation cancelled")]
    ContextCancelled,

    /// A telemetry flush failed and the batch was dropped. Collector continues.
    #[error("transient flush error: {message}")]
    TransientFlushError {
        /// Description of the storage failure.
        message: String,
    },

    /// Middleware stack configuration is invalid (missing dependency, wrong order).
    #[error("invalid middleware stack: {message}")]
    InvalidMiddlewareStack {
        /// Human-readable description of the validation failure.
        message: String,
    },

    /// The tenant could not be admitted (status/expiry/plan failure).
    #[error("tenant denied: {message}")]
    TenantDenied {
        /// Human-readable reason.
        message: String,
        /// HTTP status the gate should return (400/402/403/429).
        status: u16,
    },

    /// A subscriber's delivery queue was full at broadcast time and the
    /// client was evicted. Not logged per-event (spec §7).
    #[error("slow consumer evicted: {client_id}")]
    SlowConsumer {
        /// Id of the evicted client.
        client_id: String,
    },

    /// The requested capability/feature is not implemented here.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Unknown/opaque error, for adapting foreign error types at the boundary.
    #[error("unknown error: {0}")]
    Other(String),
}

impl GatewayError {
    /// Returns true if this error should ever be logged at error severity.
    ///
    /// `LimitExceeded`/`QuotaExceededHard` are expected, high-frequency
    /// outcomes and must never be logged at error level (spec §7).
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(
            self,
            Self::LimitExceeded { .. }
                | Self::QuotaExceededHard { .. }
                | Self::ContextCancelled
                | Self::SlowConsumer { .. }
        )
    }

    /// Helper: build a [`Self::ConfigurationError`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Helper: build a [`Self::BackingStoreUnavailable`].
    pub fn backing_store(message: impl Into<String>) -> Self {
        Self::BackingStoreUnavailable {
            message: message.into(),
        }
    }
}
