//! The `Limiter` kernel contract.
//!
//! Every rate-limiting algorithm (local or distributed) implements this one
//! trait. Higher-level composition (multi-level, whitelist bypass, premium
//! multiplier) lives in `gateway-middleware` and is built entirely on top of
//! this interface, so a new algorithm only has to satisfy `Limiter` to be
//! usable anywhere in the stack.

use async_trait::async_trait;
use gateway_types::{GatewayError, Key, LimitInfo};

use crate::cancel::CancelContext;

/// A single rate-limiting algorithm bound to one storage backing.
///
/// Implementations must be safe to share behind an `Arc` and call
/// concurrently for distinct keys; concurrent calls for the *same* key must
/// serialize enough to keep the algorithm's accounting correct (the teacher
/// pattern here is a per-key lock, not a global one).
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Attempt to consume `n` units of the limit's capacity for `key`.
    ///
    /// Returns a [`LimitInfo`] describing whether the request was allowed
    /// and the resulting state of the window/bucket. A denied request is
    /// not an error; callers inspect `LimitInfo::allowed`.
    ///
    /// # Errors
    /// Returns `GatewayError::BackingStoreUnavailable` if a distributed
    /// backing cannot be reached and the limiter is configured fail-closed,
    /// or `GatewayError::ContextCancelled` if `cx` is cancelled mid-call.
    async fn allow(&self, key: &Key, n: u64, cx: &CancelContext) -> Result<LimitInfo, GatewayError>;

    /// Inspect the current state for `key` without consuming capacity.
    ///
    /// # Errors
    /// Returns `GatewayError::BackingStoreUnavailable` under the same
    /// conditions as [`allow`](Self::allow).
    async fn get_info(&self, key: &Key, cx: &CancelContext) -> Result<LimitInfo, GatewayError>;

    /// Reset any accumulated state for `key`, as if it had never been seen.
    ///
    /// # Errors
    /// Returns `GatewayError::BackingStoreUnavailable` under the same
    /// conditions as [`allow`](Self::allow).
    async fn reset(&self, key: &Key, cx: &CancelContext) -> Result<(), GatewayError>;

    /// Human-readable algorithm name for introspection/logging.
    fn algorithm_name(&self) -> &'static str;
}
