//! Request-scoped cancellation.
//!
//! Every blocking call into a limiter or quota store takes a [`CancelContext`]
//! so that a client disconnect or deadline upstream can unwind a wait without
//! leaking the task. This is a thin wrapper over [`tokio_util::sync::CancellationToken`]
//! rather than a bespoke signal, matching the rest of the workspace's preference
//! for reusing a maintained primitive over hand-rolling one.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::GatewayError;

/// Cooperative cancellation handle threaded through limiter and quota calls.
#[derive(Debug, Clone, Default)]
pub struct CancelContext {
    token: CancellationToken,
}

impl CancelContext {
    /// Create a fresh, non-cancelled context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Derive a child context. Cancelling the parent cancels the child; the
    /// reverse is not true.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Return `true` if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Return [`GatewayError::ContextCancelled`] if cancellation has been
    /// requested, otherwise `Ok(())`. Call this at the top of any loop body
    /// that may wait (e.g. a leaky bucket waiting for queue capacity).
    ///
    /// # Errors
    /// Returns `GatewayError::ContextCancelled` if the context has been cancelled.
    pub fn check(&self) -> Result<(), GatewayError> {
        if self.is_cancelled() {
            Err(GatewayError::ContextCancelled)
        } else {
            Ok(())
        }
    }

    /// Race an arbitrary future against cancellation, returning
    /// `GatewayError::ContextCancelled` if cancellation wins.
    ///
    /// # Errors
    /// Returns `GatewayError::ContextCancelled` if cancelled before `fut` resolves.
    pub async fn race<F, T>(&self, fut: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::select! {
            () = self.token.cancelled() => Err(GatewayError::ContextCancelled),
            out = fut => Ok(out),
        }
    }

    /// Sleep for `dur`, returning early with
    /// `GatewayError::ContextCancelled` if cancelled first.
    ///
    /// # Errors
    /// Returns `GatewayError::ContextCancelled` if cancelled before `dur` elapses.
    pub async fn sleep(&self, dur: Duration) -> Result<(), GatewayError> {
        self.race(tokio::time::sleep(dur)).await
    }
}
