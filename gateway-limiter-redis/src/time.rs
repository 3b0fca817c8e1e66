//! Wall-clock helpers for building script arguments. The scripts themselves
//! re-derive "now" from Redis's own `TIME` command; these are only used to
//! pick window markers for key names and TTLs before the round trip.

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
#[must_use]
pub fn truncate_to_window(now_unix: u64, window_secs: u64) -> u64 {
    if window_secs == 0 {
        now_unix
    } else {
        (now_unix / window_secs) * window_secs
    }
}
