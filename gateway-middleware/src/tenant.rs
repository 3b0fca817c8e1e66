//! Tenant gate (component I, spec §4.I): resolves and validates the tenant
//! owning a request before any downstream data access is scoped.
//!
//! Strategy-based extraction of the raw tenant id from a request (host
//! label, header, path segment) is a concern of the HTTP-facing adapter,
//! not of this middleware: by the time [`TenantGateMiddleware::admit`] is
//! called the extraction has already happened and is carried as the
//! [`Key`]'s identifier, matching every other single-key `Admitter` in the
//! stack.

use std::any::Any;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use gateway_core::middleware::ValidationContext;
use gateway_core::{Admitter, GatewayError, Middleware};
use gateway_types::{Key, PlanLevel, TenantRecord, TenantStatus};
use serde_json::json;

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Out-of-scope persistence boundary: resolves a tenant id to its record.
///
/// The gate does not own tenant storage; callers provide an implementation
/// backed by whatever directory (database, config file, control-plane API)
/// they run.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Look up the tenant record for `tenant_id`, if one exists.
    async fn lookup(&self, tenant_id: &str) -> Result<Option<TenantRecord>, GatewayError>;
}

/// Validates a resolved [`TenantRecord`] is active and unexpired.
fn validate_record(record: &TenantRecord, now: u64) -> Result<(), GatewayError> {
    match record.status {
        TenantStatus::Suspended => {
            return Err(GatewayError::TenantDenied {
                message: format!("tenant {} is suspended", record.id),
                status: 403,
            })
        }
        TenantStatus::Expired => {
            return Err(GatewayError::TenantDenied {
                message: format!("tenant {} subscription has expired", record.id),
                status: 402,
            })
        }
        TenantStatus::Trialing => {
            if let Some(ends_at) = record.trial_ends_at {
                if now >= ends_at {
                    return Err(GatewayError::TenantDenied {
                        message: format!("tenant {} trial has ended", record.id),
                        status: 402,
                    });
                }
            }
        }
        TenantStatus::Active => {
            if let Some(ends_at) = record.subscription_ends_at {
                if now >= ends_at {
                    return Err(GatewayError::TenantDenied {
                        message: format!("tenant {} subscription has ended", record.id),
                        status: 402,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Middleware implementation of the tenant gate: looks up the tenant,
/// validates status/expiry, and (implicitly, via `admit`'s single-key
/// contract) lets the caller attach the resulting [`gateway_types::TenantHandle`]
/// once `admit` returns `Ok`.
pub struct TenantGateMiddleware {
    directory: Arc<dyn TenantDirectory>,
    minimum_plan: Option<PlanLevel>,
}

impl TenantGateMiddleware {
    /// Construct a gate backed by `directory`. `minimum_plan`, if set, adds
    /// the secondary plan-level check (spec §4.I: "free < starter < pro <
    /// enterprise").
    #[must_use]
    pub fn new(directory: Arc<dyn TenantDirectory>, minimum_plan: Option<PlanLevel>) -> Self {
        Self { directory, minimum_plan }
    }

    async fn resolve(&self, tenant_id: &str) -> Result<TenantRecord, GatewayError> {
        let record = self
            .directory
            .lookup(tenant_id)
            .await?
            .ok_or_else(|| GatewayError::TenantDenied {
                message: format!("unknown tenant {tenant_id}"),
                status: 400,
            })?;
        validate_record(&record, now_unix())?;
        if let Some(minimum) = self.minimum_plan {
            if record.plan < minimum {
                return Err(GatewayError::TenantDenied {
                    message: format!(
                        "tenant {} plan {:?} does not meet required {:?}",
                        record.id, record.plan, minimum
                    ),
                    status: 403,
                });
            }
        }
        Ok(record)
    }
}

struct TenantGateAdmitter {
    gate: TenantGateMiddleware,
    inner: Arc<dyn Admitter>,
}

#[async_trait]
impl Admitter for TenantGateAdmitter {
    async fn admit(&self, key: &Key) -> Result<(), GatewayError> {
        self.gate.resolve(key.identifier.raw()).await?;
        self.inner.admit(key).await
    }
}

impl Middleware for TenantGateMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn Admitter>) -> Arc<dyn Admitter> {
        Arc::new(TenantGateAdmitter { gate: *self, inner })
    }

    fn name(&self) -> &'static str {
        "tenant_gate"
    }

    fn config_json(&self) -> serde_json::Value {
        json!({ "minimum_plan": self.minimum_plan.map(|p| format!("{p:?}")) })
    }

    fn validate(&self, _ctx: &ValidationContext) -> Result<(), GatewayError> {
        Ok(())
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}
