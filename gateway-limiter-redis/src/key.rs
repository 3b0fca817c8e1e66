//! Distributed backing key layout (spec §6).
//!
//! Every key is namespaced under `{prefix}:{level}:{identifier}` and then
//! suffixed per algorithm so that two algorithms never collide even if a
//! caller reuses a [`Key`](gateway_types::Key) across a config change.

use gateway_types::{Algorithm, Key, LimiterConfig};

fn base(config: &LimiterConfig, key: &Key) -> String {
    format!("{}:{}", config.key_prefix, key.storage_path())
}

/// `{prefix}:{level}:{identifier}` — one hash holding `{tokens, last_refill}`.
pub fn token_bucket(config: &LimiterConfig, key: &Key) -> String {
    base(config, key)
}

/// `{prefix}:{level}:{identifier}` — one hash holding `{len, last_leak}`.
///
/// Spec §6 lists no explicit distributed layout for leaky bucket; this
/// mirrors the token-bucket hash shape since the two algorithms are duals of
/// each other (admit queue length vs. admit token count).
pub fn leaky_bucket(config: &LimiterConfig, key: &Key) -> String {
    base(config, key)
}

/// `{prefix}:{key}:{window_unix}` — integer counter.
pub fn fixed_window(config: &LimiterConfig, key: &Key, window_start: u64) -> String {
    format!("{}:{}", base(config, key), window_start)
}

/// `{prefix}:{key}` — sorted-set members `{timestamp}:{seq}`.
pub fn sliding_log(config: &LimiterConfig, key: &Key) -> String {
    base(config, key)
}

/// `{prefix}:{key}:current:{ws}`.
pub fn sliding_counter_current(config: &LimiterConfig, key: &Key, window_start: u64) -> String {
    format!("{}:current:{}", base(config, key), window_start)
}

/// `{prefix}:{key}:previous:{ws}`.
pub fn sliding_counter_previous(config: &LimiterConfig, key: &Key, window_start: u64) -> String {
    format!("{}:previous:{}", base(config, key), window_start)
}

/// The storage key(s) an `allow`/`get_info` call for `algorithm` touches, for logging/introspection.
#[must_use]
pub fn describe(config: &LimiterConfig, key: &Key) -> String {
    match config.algorithm {
        Algorithm::TokenBucket => token_bucket(config, key),
        Algorithm::LeakyBucket => leaky_bucket(config, key),
        Algorithm::FixedWindow => format!("{}:<window_unix>", base(config, key)),
        Algorithm::SlidingWindowLog => sliding_log(config, key),
        Algorithm::SlidingWindowCounter => format!("{}:{{current,previous}}:<ws>", base(config, key)),
    }
}
