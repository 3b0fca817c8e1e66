//! gateway-core
//!
//! Core traits and utilities shared across the gateway request plane.
//!
//! - `limiter`: the [`Limiter`] kernel contract implemented by every rate-limiting algorithm.
//! - `quota_store`: the [`QuotaStore`] contract for period-based usage accounting.
//! - `middleware`: the `Middleware`/`Admitter` composition traits used to build an admission stack.
//! - `cancel`: request-scoped cooperative cancellation.
//! - `stream`: task-lifecycle utilities used by long-lived streaming tasks (the SSE hub).
#![warn(missing_docs)]

/// Cooperative cancellation threaded through limiter and quota calls.
pub mod cancel;
/// Shared error re-export.
pub mod error;
/// The `Limiter` kernel contract.
pub mod limiter;
/// Middleware composition traits (`Middleware`, `Admitter`, `ValidationContext`).
pub mod middleware;
/// The `QuotaStore` contract for period-based usage accounting.
pub mod quota_store;
/// Internal stream utilities used by `StreamHandle` and tests.
pub mod stream;

pub use cancel::CancelContext;
pub use error::GatewayError;
pub use limiter::Limiter;
pub use middleware::{Admitter, AlwaysAdmit, Middleware, MiddlewareDescriptor, MiddlewarePosition, ValidationContext};
pub use quota_store::QuotaStore;
pub use stream::{Abortable, Stoppable, StreamHandle};
