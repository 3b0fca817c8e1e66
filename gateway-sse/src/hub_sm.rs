//! Pure state-transition function driving the SSE hub (component H), modeled
//! on the teacher's `router::streaming::supervisor_sm` pattern: a single
//! `handle(self, event) -> (Self, Vec<Action>)` function with no side
//! effects. The run-loop (`hub.rs`) owns the actual per-client channels and
//! executes the actions this module decides on.

use std::collections::{HashMap, HashSet};

use gateway_types::{EventType, SseEvent};

/// Why a client was evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// The client's queue was full at delivery time.
    SlowConsumer,
    /// No heartbeat observed within `client_timeout`.
    Stale,
    /// The client asked to disconnect.
    Unregistered,
}

/// Input to the hub's state machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// A new client subscribed to `channels`.
    Register {
        /// Client identifier, unique per connection.
        client_id: String,
        /// Channels the client is subscribed to.
        channels: HashSet<EventType>,
        /// Unix-second timestamp of registration.
        now: u64,
    },
    /// A client disconnected or asked to stop receiving events.
    Unregister {
        /// Client identifier.
        client_id: String,
    },
    /// A payload was published on `event_type`.
    Broadcast {
        /// Channel the payload belongs to.
        event_type: EventType,
        /// JSON payload.
        payload: serde_json::Value,
    },
    /// The heartbeat ticker fired; every connected client is refreshed.
    HeartbeatTick {
        /// Unix-second timestamp of the tick.
        now: u64,
    },
    /// The stale-sweep ticker fired; clients past `client_timeout` are evicted.
    StaleSweepTick {
        /// Unix-second timestamp of the tick.
        now: u64,
    },
    /// The run-loop's non-blocking delivery to `client_id` found a full queue.
    DeliveryFailed {
        /// Client identifier whose queue rejected the event.
        client_id: String,
    },
}

/// Side effect the run-loop must carry out after a transition.
#[derive(Debug, Clone)]
pub enum Action {
    /// Enqueue `event` to one client's delivery queue (non-blocking).
    SendTo {
        /// Target client.
        client_id: String,
        /// Event to deliver.
        event: SseEvent,
    },
    /// Enqueue `event` to several clients' delivery queues (non-blocking).
    SendToMany {
        /// Target clients.
        client_ids: Vec<String>,
        /// Event to deliver.
        event: SseEvent,
    },
    /// Drop the client's delivery queue and report why.
    Evict {
        /// Client identifier to evict.
        client_id: String,
        /// Eviction reason.
        reason: EvictReason,
    },
}

#[derive(Debug, Clone)]
struct ClientMeta {
    channels: HashSet<EventType>,
    last_heartbeat: u64,
}

/// Logical hub state: which clients exist, what they're subscribed to, and
/// the monotonic event-id counter. Holds no channels or tasks — those live
/// in the run-loop.
#[derive(Debug, Clone)]
pub struct HubState {
    clients: HashMap<String, ClientMeta>,
    subscriptions: HashMap<EventType, HashSet<String>>,
    next_event_id: u64,
    retry_ms: u64,
    client_timeout_secs: u64,
}

impl HubState {
    /// Construct an empty hub state. `retry_ms` is the suggested SSE retry
    /// hint sent in the initial connected frame; `client_timeout_secs` bounds
    /// how long a client may go without a heartbeat before stale-sweep evicts it.
    #[must_use]
    pub fn new(retry_ms: u64, client_timeout_secs: u64) -> Self {
        Self {
            clients: HashMap::new(),
            subscriptions: EventType::ALL.into_iter().map(|e| (e, HashSet::new())).collect(),
            next_event_id: 0,
            retry_ms,
            client_timeout_secs,
        }
    }

    /// Number of currently registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Whether `client_id` is currently registered.
    #[must_use]
    pub fn has_client(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    fn unsubscribe_all(&mut self, client_id: &str) {
        for set in self.subscriptions.values_mut() {
            set.remove(client_id);
        }
    }

    /// Apply one event, returning the new state and the actions the run-loop
    /// must carry out.
    #[must_use]
    pub fn handle(mut self, event: Event) -> (Self, Vec<Action>) {
        match event {
            Event::Register { client_id, channels, now } => {
                for ch in &channels {
                    self.subscriptions.entry(*ch).or_default().insert(client_id.clone());
                }
                self.clients.insert(client_id.clone(), ClientMeta { channels, last_heartbeat: now });
                let id = self.next_id();
                let connected = SseEvent {
                    id,
                    event: EventType::Heartbeat,
                    data: serde_json::json!({
                        "message": "connected",
                        "client_id": client_id,
                        "retry": self.retry_ms,
                        "timestamp": now,
                    }),
                };
                (self, vec![Action::SendTo { client_id, event: connected }])
            }

            Event::Unregister { client_id } => {
                self.clients.remove(&client_id);
                self.unsubscribe_all(&client_id);
                (self, Vec::new())
            }

            Event::Broadcast { event_type, payload } => {
                let id = self.next_id();
                let subscribers: Vec<String> =
                    self.subscriptions.get(&event_type).map(|s| s.iter().cloned().collect()).unwrap_or_default();
                if subscribers.is_empty() {
                    return (self, Vec::new());
                }
                let event = SseEvent { id, event: event_type, data: payload };
                (self, vec![Action::SendToMany { client_ids: subscribers, event }])
            }

            Event::HeartbeatTick { now } => {
                let id = self.next_id();
                let mut recipients = Vec::with_capacity(self.clients.len());
                for (client_id, meta) in &mut self.clients {
                    meta.last_heartbeat = now;
                    recipients.push(client_id.clone());
                }
                if recipients.is_empty() {
                    return (self, Vec::new());
                }
                let event = SseEvent {
                    id,
                    event: EventType::Heartbeat,
                    data: serde_json::json!({ "message": "heartbeat", "timestamp": now }),
                };
                (self, vec![Action::SendToMany { client_ids: recipients, event }])
            }

            Event::StaleSweepTick { now } => {
                let stale: Vec<String> = self
                    .clients
                    .iter()
                    .filter(|(_, meta)| now.saturating_sub(meta.last_heartbeat) > self.client_timeout_secs)
                    .map(|(id, _)| id.clone())
                    .collect();
                let mut actions = Vec::with_capacity(stale.len());
                for client_id in stale {
                    self.clients.remove(&client_id);
                    self.unsubscribe_all(&client_id);
                    actions.push(Action::Evict { client_id, reason: EvictReason::Stale });
                }
                (self, actions)
            }

            Event::DeliveryFailed { client_id } => {
                if !self.clients.contains_key(&client_id) {
                    return (self, Vec::new());
                }
                self.clients.remove(&client_id);
                self.unsubscribe_all(&client_id);
                (self, vec![Action::Evict { client_id, reason: EvictReason::SlowConsumer }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(types: &[EventType]) -> HashSet<EventType> {
        types.iter().copied().collect()
    }

    #[test]
    fn register_subscribes_and_sends_connected_frame() {
        let state = HubState::new(3_000, 300);
        let (state, actions) =
            state.handle(Event::Register { client_id: "c1".into(), channels: channels(&[EventType::Stats]), now: 10 });
        assert_eq!(state.client_count(), 1);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::SendTo { client_id, event } => {
                assert_eq!(client_id, "c1");
                assert_eq!(event.event, EventType::Heartbeat);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn broadcast_delivers_only_to_subscribers() {
        let state = HubState::new(3_000, 300);
        let (state, _) =
            state.handle(Event::Register { client_id: "a".into(), channels: channels(&[EventType::Stats]), now: 0 });
        let (state, _) =
            state.handle(Event::Register { client_id: "b".into(), channels: channels(&[EventType::Logs]), now: 0 });
        let (_state, actions) =
            state.handle(Event::Broadcast { event_type: EventType::Stats, payload: serde_json::json!({"total_requests": 5}) });
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::SendToMany { client_ids, .. } => assert_eq!(client_ids, &vec!["a".to_string()]),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn broadcast_with_no_subscribers_produces_no_actions() {
        let state = HubState::new(3_000, 300);
        let (_state, actions) =
            state.handle(Event::Broadcast { event_type: EventType::Providers, payload: serde_json::json!({}) });
        assert!(actions.is_empty());
    }

    #[test]
    fn delivery_failed_evicts_and_unsubscribes() {
        let state = HubState::new(3_000, 300);
        let (state, _) =
            state.handle(Event::Register { client_id: "a".into(), channels: channels(&[EventType::Stats]), now: 0 });
        let (state, actions) = state.handle(Event::DeliveryFailed { client_id: "a".into() });
        assert_eq!(state.client_count(), 0);
        assert!(matches!(actions.as_slice(), [Action::Evict { reason: EvictReason::SlowConsumer, .. }]));

        let (_state, actions) = state.handle(Event::Broadcast { event_type: EventType::Stats, payload: serde_json::json!({}) });
        assert!(actions.is_empty(), "evicted client must not receive further broadcasts");
    }

    #[test]
    fn stale_sweep_evicts_past_timeout_only() {
        let state = HubState::new(3_000, 60);
        let (state, _) = state.handle(Event::Register { client_id: "fresh".into(), channels: channels(&[EventType::Stats]), now: 100 });
        let (state, _) = state.handle(Event::Register { client_id: "stale".into(), channels: channels(&[EventType::Stats]), now: 0 });
        let (state, actions) = state.handle(Event::StaleSweepTick { now: 120 });
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::Evict { client_id, reason } => {
                assert_eq!(client_id, "stale");
                assert_eq!(*reason, EvictReason::Stale);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert!(state.has_client("fresh"));
        assert!(!state.has_client("stale"));
    }

    #[test]
    fn heartbeat_tick_refreshes_every_client_regardless_of_subscriptions() {
        let state = HubState::new(3_000, 60);
        let (state, _) = state.handle(Event::Register { client_id: "a".into(), channels: channels(&[EventType::Logs]), now: 0 });
        let (state, actions) = state.handle(Event::HeartbeatTick { now: 30 });
        assert!(matches!(actions.as_slice(), [Action::SendToMany { .. }]));
        // A stale sweep right after a heartbeat must not evict the refreshed client.
        let (state, actions) = state.handle(Event::StaleSweepTick { now: 30 });
        assert!(actions.is_empty());
        assert!(state.has_client("a"));
    }

    #[test]
    fn unregister_removes_client_and_subscriptions() {
        let state = HubState::new(3_000, 300);
        let (state, _) = state.handle(Event::Register { client_id: "a".into(), channels: channels(&[EventType::Stats]), now: 0 });
        let (state, _) = state.handle(Event::Unregister { client_id: "a".into() });
        assert_eq!(state.client_count(), 0);
        let (_state, actions) = state.handle(Event::Broadcast { event_type: EventType::Stats, payload: serde_json::json!({}) });
        assert!(actions.is_empty());
    }

    #[test]
    fn event_ids_are_monotonic_across_kinds() {
        let state = HubState::new(3_000, 300);
        let (state, actions) = state.handle(Event::Register { client_id: "a".into(), channels: channels(&[EventType::Stats]), now: 0 });
        let first_id = match &actions[0] {
            Action::SendTo { event, .. } => event.id,
            _ => unreachable!(),
        };
        let (_state, actions) = state.handle(Event::Broadcast { event_type: EventType::Stats, payload: serde_json::json!({}) });
        let second_id = match &actions[0] {
            Action::SendToMany { event, .. } => event.id,
            _ => unreachable!(),
        };
        assert!(second_id > first_id);
    }
}
