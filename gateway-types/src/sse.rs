//! Wire types for the SSE hub (component H, spec §4.H, §6).

use serde::{Deserialize, Serialize};

/// Channel a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Aggregate/live statistics snapshots.
    Stats,
    /// Raw request log lines.
    Logs,
    /// Per-provider health/status updates.
    Providers,
    /// Individual request completions.
    Requests,
    /// Synthetic keep-alive event.
    Heartbeat,
    /// Hub-internal error notification.
    Error,
}

impl EventType {
    /// All concrete channels, in a stable order (used to build the `/all` subscription).
    pub const ALL: [Self; 6] = [
        Self::Stats,
        Self::Logs,
        Self::Providers,
        Self::Requests,
        Self::Heartbeat,
        Self::Error,
    ];

    /// SSE `event:` field value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stats => "stats",
            Self::Logs => "logs",
            Self::Providers => "providers",
            Self::Requests => "requests",
            Self::Heartbeat => "heartbeat",
            Self::Error => "error",
        }
    }
}

/// One frame as delivered to a subscriber: monotonic id, channel, and JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseEvent {
    /// Monotonically increasing id, unique per hub instance.
    pub id: u64,
    /// Channel this event belongs to.
    pub event: EventType,
    /// JSON-encoded payload.
    pub data: serde_json::Value,
}

/// Payload of the first frame sent to a client immediately after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Fixed human-readable marker.
    pub message: &'static str,
    /// Server-assigned client id.
    pub client_id: String,
    /// Channels the client is subscribed to.
    pub channels: Vec<EventType>,
    /// Unix-second timestamp of registration.
    pub timestamp: u64,
    /// Suggested SSE `retry:` hint in milliseconds.
    pub retry: u64,
}
