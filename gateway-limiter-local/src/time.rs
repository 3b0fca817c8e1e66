//! Wall-clock helpers shared by every algorithm.
//!
//! Algorithms reason about elapsed time with [`Instant`] (monotonic, immune to
//! clock steps) but must report `reset`/`retry_after` in unix seconds for the
//! wire format (spec §3, §6); this module is the only place that crosses
//! between the two.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current unix-second timestamp, saturating at zero for clocks before the epoch.
#[must_use]
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// `now_unix()` truncated down to the nearest multiple of `window_secs`.
///
/// Used by the fixed-window and sliding-window-counter algorithms (spec §4.A.3,
/// §4.A.5) to derive the current window's start marker.
#[must_use]
pub fn truncate_to_window(now_unix: u64, window_secs: u64) -> u64 {
    if window_secs == 0 {
        now_unix
    } else {
        (now_unix / window_secs) * window_secs
    }
}
