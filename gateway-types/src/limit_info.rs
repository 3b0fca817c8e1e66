//! [`LimitInfo`]: the uniform read/decision result every limiter algorithm returns.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sentinel `limit` value meaning "unlimited" (spec §3).
pub const UNLIMITED: i64 = -1;

/// Result of an `allow`/`get_info` call against any limiter algorithm.
///
/// Invariants (spec §3): `0 <= remaining <= limit` when `limit >= 0`;
/// `limit == -1` encodes unlimited; if `!allowed` then `retry_after > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitInfo {
    /// Whether the call was (or would be) admitted.
    pub allowed: bool,
    /// Configured effective limit, or [`UNLIMITED`].
    pub limit: i64,
    /// Units remaining in the current window/bucket.
    pub remaining: i64,
    /// Unix-second timestamp at which the window/bucket is expected to reset.
    pub reset: u64,
    /// Time to wait before retrying; zero when `allowed`.
    pub retry_after: Duration,
}

impl LimitInfo {
    /// Build an "allowed" result, clamping `remaining` into `[0, limit]`.
    #[must_use]
    pub fn allowed(limit: i64, remaining: i64, reset: u64) -> Self {
        let remaining = if limit < 0 {
            remaining.max(0)
        } else {
            remaining.clamp(0, limit)
        };
        Self {
            allowed: true,
            limit,
            remaining,
            reset,
            retry_after: Duration::ZERO,
        }
    }

    /// Build a "denied" result. `retry_after` must be non-zero per the
    /// invariant in spec §3; callers should round up to at least 1ms.
    #[must_use]
    pub fn denied(limit: i64, reset: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset,
            retry_after: retry_after.max(Duration::from_millis(1)),
        }
    }

    /// An always-allow result used for unlimited levels and whitelist bypass.
    #[must_use]
    pub const fn unlimited(reset: u64) -> Self {
        Self {
            allowed: true,
            limit: UNLIMITED,
            remaining: i64::MAX,
            reset,
            retry_after: Duration::ZERO,
        }
    }

    /// `retry_after` rounded up to whole seconds, as required for the
    /// `Retry-After` header (spec §6).
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.retry_after.as_millis();
        u64::try_from(millis.div_ceil(1000)).unwrap_or(u64::MAX)
    }
}
