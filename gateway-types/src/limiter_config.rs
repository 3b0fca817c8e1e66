//! Per-limiter-instance configuration (spec §3, §6).

use crate::Level;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which of the five kernel algorithms (spec §4.A.1-5) a [`LimiterConfig`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Algorithm {
    /// Lazy-refill token bucket (§4.A.1).
    TokenBucket,
    /// FIFO leaky bucket (§4.A.2).
    LeakyBucket,
    /// Truncated fixed window counter (§4.A.3).
    FixedWindow,
    /// Exact sliding window via an ordered timestamp log (§4.A.4).
    SlidingWindowLog,
    /// Two-counter sliding window estimate (§4.A.5).
    SlidingWindowCounter,
}

/// Where an algorithm instance keeps its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Backing {
    /// Striped concurrent in-memory map, process-local.
    Local,
    /// Shared key-value store with atomic server-side scripting.
    Distributed,
}

/// Configuration tuple for one limiter instance (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Aggregation level this instance enforces.
    pub level: Level,
    /// Selected algorithm.
    pub algorithm: Algorithm,
    /// Base requests allowed per `window`.
    pub limit: u64,
    /// Window length (fixed window truncation interval; look-back horizon
    /// for sliding variants; `limit / window` is the token-bucket refill rate).
    pub window: Duration,
    /// Extra units added on top of `limit` before premium scaling.
    pub burst: u64,
    /// Multiplier applied to `effective_limit` for identifiers tagged premium.
    pub premium_multiplier: u64,
    /// Local vs. distributed backing.
    pub distributed: Backing,
    /// Prefix namespacing distributed storage keys (spec §6).
    pub key_prefix: String,
    /// When the distributed backing is unreachable: fail the call closed
    /// (deny) rather than open (allow). Only consulted when `distributed ==
    /// Backing::Distributed`. Default is `true` (spec §4.A.6, §9).
    pub fail_closed: bool,
}

impl LimiterConfig {
    /// `limit + burst`, before any premium scaling.
    #[must_use]
    pub const fn base_effective_limit(&self) -> u64 {
        self.limit + self.burst
    }

    /// `limit + burst`, scaled by `premium_multiplier` when `premium` is set.
    #[must_use]
    pub fn effective_limit(&self, premium: bool) -> u64 {
        let base = self.base_effective_limit();
        if premium && self.premium_multiplier > 1 {
            base.saturating_mul(self.premium_multiplier)
        } else {
            base
        }
    }

    /// Validate the tuple, returning a human-readable reason on failure.
    ///
    /// Used at construction time to raise `ConfigurationError` (fatal,
    /// spec §7) instead of surfacing nonsensical behavior at request time.
    pub fn validate(&self) -> Result<(), String> {
        if self.window.is_zero() {
            return Err("window must be non-zero".to_string());
        }
        if self.limit == 0 && self.burst == 0 {
            return Err("limit and burst cannot both be zero".to_string());
        }
        if self.premium_multiplier == 0 {
            return Err("premium_multiplier must be >= 1".to_string());
        }
        if self.key_prefix.is_empty() {
            return Err("key_prefix must not be empty".to_string());
        }
        Ok(())
    }
}

/// One of the four built-in plan presets named in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanPreset {
    /// Free tier.
    Free,
    /// Entry paid tier.
    Basic,
    /// Mid paid tier.
    Pro,
    /// Top paid tier.
    Enterprise,
}

impl PlanPreset {
    /// Concrete `(limit, burst, premium_multiplier)` per level for this preset.
    ///
    /// Windows are fixed at 1 second for `global`/`user`/`ip` (request-rate
    /// shaping) and 60 seconds for `provider`/`model` (coarser upstream
    /// protection); callers needing different windows should build a custom
    /// [`LimiterConfig`] instead of a preset.
    #[must_use]
    pub fn tuple(self, level: Level) -> LimiterConfig {
        let (limit, burst, premium_multiplier, window_secs) = match (self, level) {
            (Self::Free, Level::Global) => (50, 0, 1, 1),
            (Self::Free, Level::User) => (5, 0, 1, 1),
            (Self::Free, Level::Ip) => (10, 0, 1, 1),
            (Self::Free, Level::Provider | Level::Model) => (100, 0, 1, 60),

            (Self::Basic, Level::Global) => (200, 20, 1, 1),
            (Self::Basic, Level::User) => (20, 5, 1, 1),
            (Self::Basic, Level::Ip) => (40, 5, 1, 1),
            (Self::Basic, Level::Provider | Level::Model) => (1_000, 100, 1, 60),

            (Self::Pro, Level::Global) => (1_000, 100, 2, 1),
            (Self::Pro, Level::User) => (100, 20, 2, 1),
            (Self::Pro, Level::Ip) => (150, 20, 2, 1),
            (Self::Pro, Level::Provider | Level::Model) => (10_000, 1_000, 2, 60),

            (Self::Enterprise, Level::Global) => (10_000, 1_000, 4, 1),
            (Self::Enterprise, Level::User) => (1_000, 200, 4, 1),
            (Self::Enterprise, Level::Ip) => (1_500, 200, 4, 1),
            (Self::Enterprise, Level::Provider | Level::Model) => (100_000, 10_000, 4, 60),
        };
        LimiterConfig {
            level,
            algorithm: Algorithm::TokenBucket,
            limit,
            window: Duration::from_secs(window_secs),
            burst,
            premium_multiplier,
            distributed: Backing::Local,
            key_prefix: "gateway".to_string(),
            fail_closed: true,
        }
    }
}
