//! gateway-sse
//!
//! Component H of the gateway request plane: a pub/sub fan-out hub for
//! long-lived per-client Server-Sent Events streams. Delivery never blocks
//! on a slow consumer — a client whose queue is full is evicted rather than
//! stalling the broadcast path for everyone else.
//!
//! The hub is modeled as a pure state-transition function ([`hub_sm`]) driven
//! by a single run-loop task ([`hub`]), the same separation the teacher uses
//! for its streaming supervisor.
#![warn(missing_docs)]

/// The run-loop and public [`SseHub`] handle.
pub mod hub;
/// Pure `(State, Event) -> (State, Vec<Action>)` transition function.
pub mod hub_sm;

pub use hub::{ClientStream, HubConfig, SseHub};
pub use hub_sm::{Action, EvictReason, Event, HubState};
