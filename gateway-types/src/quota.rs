//! Long-horizon quota configuration and state (spec §4.C).

use serde::{Deserialize, Serialize};

/// Accounting period for a quota (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaPeriod {
    /// Calendar hour.
    Hour,
    /// Calendar day (UTC).
    Day,
    /// ISO week (UTC).
    Week,
    /// Calendar month (UTC).
    Month,
}

impl QuotaPeriod {
    /// Length of the period in seconds, used only for `next_reset`
    /// arithmetic on fixed-length periods (hour/day/week). Month length
    /// varies and is handled specially by the period-floor logic.
    #[must_use]
    pub const fn length_secs(self) -> Option<u64> {
        match self {
            Self::Hour => Some(3_600),
            Self::Day => Some(86_400),
            Self::Week => Some(604_800),
            Self::Month => None,
        }
    }
}

/// Whether a quota blocks overage or merely records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuotaKind {
    /// Advisory: overage is recorded (for billing) but never denied.
    Soft,
    /// Enforced: overage is denied before commit.
    Hard,
}

/// Configuration for a single named quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Units allowed per period.
    pub limit: u64,
    /// Accounting period.
    pub period: QuotaPeriod,
    /// Soft vs. hard enforcement.
    pub kind: QuotaKind,
    /// Fraction of `limit` (in `[0, 1]`) at which `warning` becomes true.
    pub warning_threshold: f64,
}

impl QuotaConfig {
    /// Validate the tuple; see [`crate::LimiterConfig::validate`] for rationale.
    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 {
            return Err("quota limit must be non-zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.warning_threshold) {
            return Err("warning_threshold must be in [0, 1]".to_string());
        }
        Ok(())
    }
}

/// Persisted per-key quota counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaEntry {
    /// Units consumed so far in the current period.
    pub used: u64,
    /// Configured limit at the time of last update (kept alongside `used`
    /// so `get_info` doesn't need to re-resolve config for display).
    pub limit: u64,
    /// Unix-second start of the current accounting period.
    pub period_start: u64,
}

impl QuotaEntry {
    /// A fresh entry with zero usage starting at `period_start`.
    #[must_use]
    pub const fn fresh(limit: u64, period_start: u64) -> Self {
        Self {
            used: 0,
            limit,
            period_start,
        }
    }
}

/// Result of a `use`/`get_info` call against [`QuotaConfig`] (spec §4.C, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// Whether the consumption was (or would be) admitted.
    pub allowed: bool,
    /// Configured limit.
    pub limit: u64,
    /// Units consumed in the current period (may exceed `limit` for soft quotas).
    pub used: u64,
    /// `max(0, limit - used)`.
    pub remaining: u64,
    /// Unix-second timestamp of the next period rollover.
    pub reset: u64,
    /// Whether `used >= warning_threshold * limit`.
    pub warning: bool,
    /// Soft vs. hard, echoed back for the response body's `type` field.
    pub kind: QuotaKind,
}
