//! External collaborator boundary.
//!
//! Everything named here is a trait only: the request plane calls out to it,
//! but building a real implementation (an HTTP server, a SQL schema, a
//! provider-probing job, a push-notification transport) is outside this
//! crate. Each trait mirrors the persistence/sink boundaries already used by
//! [`gateway_telemetry`] and [`gateway_middleware`] (`MetricsSink`,
//! `AggregateStore`, `TenantDirectory`), just named for the surfaces those
//! crates don't cover themselves.

use async_trait::async_trait;
use gateway_types::GatewayError;

/// Translates between this crate's admission/telemetry primitives and
/// whatever HTTP stack a host binary runs (request parsing, OpenAI-compatible
/// body translation, response serialization). Not implemented here.
#[async_trait]
pub trait HttpFrontDoor: Send + Sync {
    /// Render one [`gateway_middleware::DenialBody`] into the host's response type.
    ///
    /// # Errors
    /// Returns any error the host's response encoding raises.
    async fn render_denial(&self, status: u16, body: serde_json::Value) -> Result<(), GatewayError>;
}

/// Discovers and health-probes upstream providers (spec.md §1: provider
/// auto-discovery). The signals this crate publishes ([`gateway_telemetry::LiveSnapshot::healthy`])
/// are an input to whatever probing cadence a host implements here.
#[async_trait]
pub trait ProviderDiscovery: Send + Sync {
    /// Return the set of provider ids currently known to be reachable.
    ///
    /// # Errors
    /// Returns any error the discovery mechanism raises.
    async fn known_providers(&self) -> Result<Vec<String>, GatewayError>;
}

/// Evaluates alerting rules against live telemetry and dispatches through
/// whatever transport (email, webhook, pager) a host configures.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver one rendered notification.
    ///
    /// # Errors
    /// Returns any error the transport raises.
    async fn notify(&self, subject: &str, body: &str) -> Result<(), GatewayError>;
}

/// Turns materialized usage rows into invoices. Left to the host's billing
/// system; this crate only produces the [`gateway_types::AggregatedProviderMetrics`]
/// it would be computed from.
#[async_trait]
pub trait BillingExporter: Send + Sync {
    /// Export one invoice-worthy usage summary for `tenant_id`.
    ///
    /// # Errors
    /// Returns any error the billing system raises.
    async fn export_usage(&self, tenant_id: &str, metrics: &gateway_types::AggregatedProviderMetrics) -> Result<(), GatewayError>;
}

/// Fans realtime events out to mobile/desktop push, independent of the SSE
/// hub's own HTTP-facing subscribers.
#[async_trait]
pub trait PushFanout: Send + Sync {
    /// Deliver one event to every device registered for `topic`.
    ///
    /// # Errors
    /// Returns any error the push provider raises.
    async fn push(&self, topic: &str, payload: &serde_json::Value) -> Result<(), GatewayError>;
}

/// Reconciles state accumulated while a client was offline. Left to the
/// host; the SSE hub only ever serves the currently-connected set.
#[async_trait]
pub trait OfflineSync: Send + Sync {
    /// Replay events a client missed while disconnected, since `since_event_id`.
    ///
    /// # Errors
    /// Returns any error the backing log raises.
    async fn replay_since(&self, client_id: &str, since_event_id: u64) -> Result<Vec<serde_json::Value>, GatewayError>;
}

/// Administrative CLI surface (inspect limiter state, force a quota reset,
/// tail live aggregates). Left to the host binary.
pub trait AdminCli: Send + Sync {
    /// Human-readable name of the command this implementation handles.
    fn command_name(&self) -> &'static str;
}

/// Decides which upstream provider serves a given request, consuming the
/// health/success-rate signals this crate publishes
/// ([`gateway_telemetry::LiveSnapshot`]) without owning them.
pub trait RoutingPolicy: Send + Sync {
    /// Choose a provider id from `candidates`, given each one's live snapshot.
    fn select<'a>(&self, candidates: &'a [(String, gateway_telemetry::LiveSnapshot)]) -> Option<&'a str>;
}
