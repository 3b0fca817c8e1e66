//! The `QuotaStore` contract for pluggable period-based quota accounting.
//!
//! Rate limiters answer "how fast"; a `QuotaStore` answers "how much, over a
//! longer rolling period" (spec §4.C). Keeping it as a separate trait from
//! [`Limiter`](crate::limiter::Limiter) means a quota backing can be swapped
//! independently of the rate-limiting algorithm in front of it.

use async_trait::async_trait;
use gateway_types::{GatewayError, Key, QuotaConfig, QuotaInfo};

use crate::cancel::CancelContext;

/// Period-based usage accounting, independent of any particular rate-limit algorithm.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Record `n` units of usage against `key` under `config`, rolling the
    /// period over if the current period has elapsed, and report the
    /// resulting quota state.
    ///
    /// # Errors
    /// Returns `GatewayError::QuotaExceededHard` if `config.kind` is
    /// `QuotaKind::Hard` and usage would exceed `config.limit`, or
    /// `GatewayError::BackingStoreUnavailable` if the backing cannot be
    /// reached.
    async fn consume(
        &self,
        key: &Key,
        n: u64,
        config: &QuotaConfig,
        cx: &CancelContext,
    ) -> Result<QuotaInfo, GatewayError>;

    /// Inspect current usage for `key` under `config` without consuming any.
    ///
    /// # Errors
    /// Returns `GatewayError::BackingStoreUnavailable` if the backing cannot be reached.
    async fn get_info(
        &self,
        key: &Key,
        config: &QuotaConfig,
        cx: &CancelContext,
    ) -> Result<QuotaInfo, GatewayError>;

    /// Reset the current period's usage for `key` to zero.
    ///
    /// # Errors
    /// Returns `GatewayError::BackingStoreUnavailable` if the backing cannot be reached.
    async fn reset(&self, key: &Key, config: &QuotaConfig, cx: &CancelContext) -> Result<(), GatewayError>;
}
