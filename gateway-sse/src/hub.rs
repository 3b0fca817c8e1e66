//! Run-loop driving [`hub_sm::HubState`]: owns the actual per-client
//! delivery queues and dispatches [`hub_sm::Action`]s, mirroring the
//! teacher's `spawn_kind_supervisor` (`controller.rs`) convention of a
//! single `tokio::select!` loop folding external events through a pure
//! state machine.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use gateway_core::cancel::CancelContext;
use gateway_core::stream::StreamHandle;
use gateway_types::{EventType, GatewayError, SseEvent};
use tokio::sync::{mpsc, oneshot};
#[cfg(feature = "tracing")]
use tracing::debug;

use crate::hub_sm::{Action, Event, HubState};

/// Tuning knobs for the hub's timers and per-client queue (spec §4.H defaults).
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Capacity of each client's delivery queue before slow-consumer eviction.
    pub queue_capacity: usize,
    /// Cadence of the synthetic heartbeat sent to every client.
    pub heartbeat_interval: std::time::Duration,
    /// Cadence of the stale-client sweep.
    pub stale_sweep_interval: std::time::Duration,
    /// Idle duration after which a client without a heartbeat is evicted.
    pub client_timeout: std::time::Duration,
    /// Suggested SSE `retry:` hint sent in the initial connected frame, in milliseconds.
    pub retry_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            heartbeat_interval: std::time::Duration::from_secs(15),
            stale_sweep_interval: std::time::Duration::from_secs(60),
            client_timeout: std::time::Duration::from_secs(300),
            retry_ms: 3_000,
        }
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(std::time::Duration::ZERO).as_secs()
}

enum Command {
    Register {
        client_id: String,
        channels: HashSet<EventType>,
        reply: oneshot::Sender<mpsc::Receiver<SseEvent>>,
    },
    Unregister {
        client_id: String,
    },
    Broadcast {
        event_type: EventType,
        payload: serde_json::Value,
    },
}

/// A registered client's receiving end, ready to be adapted into an SSE byte
/// stream by the HTTP front door (an external collaborator; spec.md §1).
pub struct ClientStream {
    /// Server-assigned client id.
    pub client_id: String,
    /// Channels this client subscribed to.
    pub channels: HashSet<EventType>,
    /// Receiver yielding this client's events in publication order.
    pub events: mpsc::Receiver<SseEvent>,
}

/// Handle to a running SSE hub. Cloning shares the same underlying run-loop.
#[derive(Clone)]
pub struct SseHub {
    commands: mpsc::Sender<Command>,
}

impl SseHub {
    /// Spawn a new hub run-loop and return a handle plus its [`StreamHandle`].
    #[must_use]
    pub fn spawn(config: HubConfig) -> (Self, StreamHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(1_024);
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run(config, commands_rx, stop_rx));
        (Self { commands: commands_tx }, StreamHandle::new(join, stop_tx))
    }

    /// Register a new client subscribed to `channels`. Honors `cx`
    /// cancellation while waiting for the run-loop to accept the command.
    ///
    /// # Errors
    /// Returns [`GatewayError::ContextCancelled`] if `cx` cancels first, or
    /// [`GatewayError::BackingStoreUnavailable`] if the hub has shut down.
    pub async fn register(
        &self,
        client_id: impl Into<String>,
        channels: HashSet<EventType>,
        cx: &CancelContext,
    ) -> Result<ClientStream, GatewayError> {
        let client_id = client_id.into();
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = Command::Register { client_id: client_id.clone(), channels: channels.clone(), reply: reply_tx };

        cx.race(self.commands.send(cmd))
            .await?
            .map_err(|_| GatewayError::backing_store("sse hub run-loop is gone"))?;

        let events = cx
            .race(reply_rx)
            .await?
            .map_err(|_| GatewayError::backing_store("sse hub run-loop is gone"))?;
        Ok(ClientStream { client_id, channels, events })
    }

    /// Disconnect `client_id` and drop its queue.
    pub async fn unregister(&self, client_id: impl Into<String>) {
        let _ = self.commands.send(Command::Unregister { client_id: client_id.into() }).await;
    }

    /// Publish `payload` on `event_type` to every current subscriber.
    ///
    /// # Errors
    /// Returns [`GatewayError::BackingStoreUnavailable`] if the hub has shut down.
    pub async fn broadcast(&self, event_type: EventType, payload: serde_json::Value) -> Result<(), GatewayError> {
        self.commands
            .send(Command::Broadcast { event_type, payload })
            .await
            .map_err(|_| GatewayError::backing_store("sse hub run-loop is gone"))
    }
}

async fn run(config: HubConfig, mut commands: mpsc::Receiver<Command>, mut stop: oneshot::Receiver<()>) {
    let mut state = HubState::new(config.retry_ms, config.client_timeout.as_secs());
    let mut senders: HashMap<String, mpsc::Sender<SseEvent>> = HashMap::new();
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    let mut sweep = tokio::time::interval(config.stale_sweep_interval);

    loop {
        let event = tokio::select! {
            _ = &mut stop => break,
            _ = heartbeat.tick() => Event::HeartbeatTick { now: now_unix() },
            _ = sweep.tick() => Event::StaleSweepTick { now: now_unix() },
            maybe_cmd = commands.recv() => {
                match maybe_cmd {
                    Some(Command::Register { client_id, channels, reply }) => {
                        let (tx, rx) = mpsc::channel(config.queue_capacity);
                        senders.insert(client_id.clone(), tx);
                        let _ = reply.send(rx);
                        Event::Register { client_id, channels, now: now_unix() }
                    }
                    Some(Command::Unregister { client_id }) => {
                        senders.remove(&client_id);
                        Event::Unregister { client_id }
                    }
                    Some(Command::Broadcast { event_type, payload }) => Event::Broadcast { event_type, payload },
                    None => break,
                }
            }
        };

        let (next_state, actions) = state.handle(event);
        state = next_state;
        let mut failed = Vec::new();
        dispatch(&actions, &senders, &mut failed);

        // Fold delivery failures straight back through the state machine, same
        // as the teacher's controller re-entering `supervisor.handle` for
        // follow-on events produced while executing the previous batch.
        for client_id in failed {
            senders.remove(&client_id);
            let (next_state, evict_actions) = state.handle(Event::DeliveryFailed { client_id });
            state = next_state;
            dispatch(&evict_actions, &senders, &mut Vec::new());
        }
    }
}

fn dispatch(actions: &[Action], senders: &HashMap<String, mpsc::Sender<SseEvent>>, failed: &mut Vec<String>) {
    for action in actions {
        match action {
            Action::SendTo { client_id, event } => {
                if let Some(tx) = senders.get(client_id)
                    && tx.try_send(event.clone()).is_err()
                {
                    failed.push(client_id.clone());
                }
            }
            Action::SendToMany { client_ids, event } => {
                for client_id in client_ids {
                    if let Some(tx) = senders.get(client_id)
                        && tx.try_send(event.clone()).is_err()
                    {
                        failed.push(client_id.clone());
                    }
                }
            }
            Action::Evict { client_id, reason: _reason } => {
                #[cfg(feature = "tracing")]
                debug!(target = "gateway::sse::hub", client_id = %client_id, reason = ?_reason, "client evicted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::cancel::CancelContext;
    use std::time::Duration;

    #[tokio::test]
    async fn register_receives_connected_frame_first() {
        let (hub, handle) = SseHub::spawn(HubConfig::default());
        let cx = CancelContext::new();
        let mut stream = hub.register("c1", HashSet::from([EventType::Stats]), &cx).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(1), stream.events.recv()).await.unwrap().unwrap();
        assert_eq!(first.event, EventType::Heartbeat);
        assert_eq!(first.data["message"], "connected");
        handle.stop().await;
    }

    #[tokio::test]
    async fn broadcast_delivers_only_to_subscribed_client() {
        let (hub, handle) = SseHub::spawn(HubConfig::default());
        let cx = CancelContext::new();
        let mut stats_sub = hub.register("a", HashSet::from([EventType::Stats]), &cx).await.unwrap();
        let mut logs_sub = hub.register("b", HashSet::from([EventType::Logs]), &cx).await.unwrap();
        let _ = stats_sub.events.recv().await; // drain connected frame
        let _ = logs_sub.events.recv().await;

        hub.broadcast(EventType::Stats, serde_json::json!({"total_requests": 42})).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), stats_sub.events.recv()).await.unwrap().unwrap();
        assert_eq!(frame.data["total_requests"], 42);
        assert!(tokio::time::timeout(Duration::from_millis(100), logs_sub.events.recv()).await.is_err());
        handle.stop().await;
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_on_full_queue() {
        let (hub, handle) = SseHub::spawn(HubConfig { queue_capacity: 1, ..HubConfig::default() });
        let cx = CancelContext::new();
        let mut sub = hub.register("slow", HashSet::from([EventType::Stats]), &cx).await.unwrap();
        let _ = sub.events.recv().await; // drain connected frame, queue now empty, capacity 1

        hub.broadcast(EventType::Stats, serde_json::json!({"n": 1})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        hub.broadcast(EventType::Stats, serde_json::json!({"n": 2})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The first broadcast fills the one-slot queue (never drained by the
        // test); the second must find it full and evict the client rather
        // than block the hub.
        hub.broadcast(EventType::Stats, serde_json::json!({"n": 3})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Further broadcasts must not panic or hang even though the client
        // was evicted mid-stream.
        hub.broadcast(EventType::Stats, serde_json::json!({"n": 4})).await.unwrap();
        handle.stop().await;
    }

    #[tokio::test]
    async fn unregister_stops_future_deliveries() {
        let (hub, handle) = SseHub::spawn(HubConfig::default());
        let cx = CancelContext::new();
        let mut sub = hub.register("a", HashSet::from([EventType::Stats]), &cx).await.unwrap();
        let _ = sub.events.recv().await;
        hub.unregister("a").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.broadcast(EventType::Stats, serde_json::json!({})).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(100), sub.events.recv()).await.is_err());
        handle.stop().await;
    }
}
