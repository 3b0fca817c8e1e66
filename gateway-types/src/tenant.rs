//! Tenant identity and plan ordering (component I, spec §4.I).

use serde::{Deserialize, Serialize};

/// Strategy used to extract a tenant identifier from a request (spec §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantStrategy {
    /// Leftmost label of the request's host header.
    Subdomain,
    /// Exact host-to-tenant mapping for bring-your-own-domain setups.
    CustomDomain,
    /// A configured request header carries the tenant id directly.
    Header,
    /// A configured path segment carries the tenant id.
    Path,
}

/// Minimum plan required downstream; enforced with the total order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlanLevel {
    /// Free plan.
    Free,
    /// Entry paid plan.
    Starter,
    /// Mid paid plan.
    Pro,
    /// Top paid plan.
    Enterprise,
}

/// Lifecycle status of a tenant account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantStatus {
    /// Tenant is active and may be served.
    Active,
    /// Tenant is in a trial period; `trial_ends_at` governs expiry.
    Trialing,
    /// Tenant's subscription or trial has lapsed.
    Expired,
    /// Tenant was explicitly suspended (billing, abuse, etc.).
    Suspended,
}

/// A resolved tenant record, as looked up by the tenant gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Stable tenant id.
    pub id: String,
    /// Current plan level.
    pub plan: PlanLevel,
    /// Current lifecycle status.
    pub status: TenantStatus,
    /// Unix-second trial expiry, if the tenant is on a trial.
    pub trial_ends_at: Option<u64>,
    /// Unix-second subscription expiry, if applicable.
    pub subscription_ends_at: Option<u64>,
}

/// Handle attached to the request context after a successful gate pass.
///
/// Downstream code scopes all data access through this handle rather than
/// re-deriving the tenant identity (spec §4.I invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantHandle {
    /// The tenant id the request was admitted under.
    pub id: String,
    /// The plan level at admission time (may differ from a later re-lookup).
    pub plan: PlanLevel,
}
