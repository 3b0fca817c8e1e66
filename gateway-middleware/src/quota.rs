//! Quota manager (component C, spec §4.C): long-horizon usage accounting
//! layered on top of (but independent from) the rate limiter kernel.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use gateway_core::{CancelContext, QuotaStore};
use gateway_types::{GatewayError, Identifier, Key, QuotaConfig, QuotaEntry, QuotaInfo, QuotaKind};

use crate::period;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Process-local [`QuotaStore`] implementation over a striped concurrent map.
///
/// One instance can serve any number of named quotas (daily, monthly, ...):
/// callers pass the relevant [`QuotaConfig`] per call and the entry's storage
/// key already disambiguates by [`Key`], so a single map is sufficient as
/// long as each named quota uses a distinctly-suffixed `Key` (see
/// [`MultiQuota`]).
pub struct QuotaManager {
    entries: DashMap<Key, QuotaEntry>,
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaManager {
    /// Construct an empty quota manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl QuotaStore for QuotaManager {
    async fn consume(
        &self,
        key: &Key,
        n: u64,
        config: &QuotaConfig,
        cx: &CancelContext,
    ) -> Result<QuotaInfo, GatewayError> {
        cx.check()?;
        config.validate().map_err(GatewayError::config)?;
        let now = now_unix();
        let computed_start = period::period_start(now, config.period);

        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| QuotaEntry::fresh(config.limit, computed_start));
        if entry.period_start < computed_start {
            *entry = QuotaEntry::fresh(config.limit, computed_start);
        }
        entry.limit = config.limit;

        let new_used = entry.used + n;
        let within_limit = new_used <= config.limit;
        let allowed = matches!(config.kind, QuotaKind::Soft) || within_limit;

        if allowed {
            entry.used = new_used;
        }

        let reset = period::next_reset(entry.period_start, config.period);
        let warning = (entry.used as f64) >= config.warning_threshold * config.limit as f64;

        if !allowed {
            return Err(GatewayError::QuotaExceededHard {
                used: entry.used,
                limit: config.limit,
                reset,
            });
        }

        Ok(QuotaInfo {
            allowed: true,
            limit: config.limit,
            used: entry.used,
            remaining: config.limit.saturating_sub(entry.used),
            reset,
            warning,
            kind: config.kind,
        })
    }

    async fn get_info(&self, key: &Key, config: &QuotaConfig, cx: &CancelContext) -> Result<QuotaInfo, GatewayError> {
        cx.check()?;
        let now = now_unix();
        let computed_start = period::period_start(now, config.period);
        let entry = self
            .entries
            .get(key)
            .map(|e| *e)
            .unwrap_or_else(|| QuotaEntry::fresh(config.limit, computed_start));
        let used = if entry.period_start < computed_start { 0 } else { entry.used };
        let reset = period::next_reset(computed_start, config.period);
        Ok(QuotaInfo {
            allowed: used <= config.limit || matches!(config.kind, QuotaKind::Soft),
            limit: config.limit,
            used,
            remaining: config.limit.saturating_sub(used),
            reset,
            warning: (used as f64) >= config.warning_threshold * config.limit as f64,
            kind: config.kind,
        })
    }

    async fn reset(&self, key: &Key, _config: &QuotaConfig, cx: &CancelContext) -> Result<(), GatewayError> {
        cx.check()?;
        self.entries.remove(key);
        Ok(())
    }
}

/// One named quota within a [`MultiQuota`] composition.
pub struct NamedQuota {
    /// Distinguishing name (e.g. `"daily"`, `"monthly"`), echoed in responses.
    pub name: String,
    /// The quota's configuration.
    pub config: QuotaConfig,
}

/// Outcome of probing every configured quota for one `use` call (spec §4.C:
/// "all are probed in order; on the first hard deny, short-circuit and
/// return partial results").
pub struct MultiQuotaOutcome {
    /// Per-quota results for every quota probed before (and including) a deny.
    pub results: Vec<(String, QuotaInfo)>,
    /// The name and error of the first hard deny, if any.
    pub denied: Option<(String, GatewayError)>,
}

impl MultiQuotaOutcome {
    /// Whether every probed quota admitted.
    #[must_use]
    pub const fn allowed(&self) -> bool {
        self.denied.is_none()
    }
}

/// Composes several named quotas (e.g. "daily" and "monthly") over one [`QuotaStore`].
pub struct MultiQuota {
    store: std::sync::Arc<dyn QuotaStore>,
    quotas: Vec<NamedQuota>,
}

impl MultiQuota {
    /// Construct a composition backed by `store`, probing `quotas` in order.
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn QuotaStore>, quotas: Vec<NamedQuota>) -> Self {
        Self { store, quotas }
    }

    fn sub_key(key: &Key, name: &str) -> Key {
        Key::new(key.level, Identifier::plain(format!("{}#{name}", key.identifier.raw())))
    }

    /// Probe every configured quota in order, short-circuiting on first hard deny.
    pub async fn consume(&self, key: &Key, n: u64, cx: &CancelContext) -> Result<MultiQuotaOutcome, GatewayError> {
        cx.check()?;
        let mut results = Vec::with_capacity(self.quotas.len());
        for quota in &self.quotas {
            let sub_key = Self::sub_key(key, &quota.name);
            match self.store.consume(&sub_key, n, &quota.config, cx).await {
                Ok(info) => results.push((quota.name.clone(), info)),
                Err(e @ GatewayError::QuotaExceededHard { used, limit, reset }) => {
                    results.push((
                        quota.name.clone(),
                        QuotaInfo {
                            allowed: false,
                            limit,
                            used,
                            remaining: 0,
                            reset,
                            warning: true,
                            kind: quota.config.kind,
                        },
                    ));
                    return Ok(MultiQuotaOutcome {
                        results,
                        denied: Some((quota.name.clone(), e)),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(MultiQuotaOutcome { results, denied: None })
    }

    /// Read current usage for every configured quota without consuming any.
    pub async fn get_info(&self, key: &Key, cx: &CancelContext) -> Result<Vec<(String, QuotaInfo)>, GatewayError> {
        cx.check()?;
        let mut out = Vec::with_capacity(self.quotas.len());
        for quota in &self.quotas {
            let sub_key = Self::sub_key(key, &quota.name);
            out.push((quota.name.clone(), self.store.get_info(&sub_key, &quota.config, cx).await?));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{Level, QuotaPeriod};

    fn hard(limit: u64) -> QuotaConfig {
        QuotaConfig {
            limit,
            period: QuotaPeriod::Day,
            kind: QuotaKind::Hard,
            warning_threshold: 0.8,
        }
    }

    // S3: quota {limit=1000, period=daily, type=hard, warning=0.8}.
    #[tokio::test]
    async fn s3_hard_quota_warns_then_denies() {
        let manager = QuotaManager::new();
        let cx = CancelContext::new();
        let key = Key::plain(Level::User, "tenant-1");
        let config = hard(1000);

        let info = manager.consume(&key, 800, &config, &cx).await.unwrap();
        assert!(info.allowed);
        assert!(info.warning);

        let info = manager.consume(&key, 0, &config, &cx).await.unwrap();
        assert!(info.warning);

        let err = manager.consume(&key, 201, &config, &cx).await.unwrap_err();
        assert!(matches!(err, GatewayError::QuotaExceededHard { used: 800, limit: 1000, .. }));
    }

    #[tokio::test]
    async fn soft_quota_never_denies_but_records_overage() {
        let manager = QuotaManager::new();
        let cx = CancelContext::new();
        let key = Key::plain(Level::User, "tenant-2");
        let config = QuotaConfig {
            limit: 10,
            period: QuotaPeriod::Day,
            kind: QuotaKind::Soft,
            warning_threshold: 0.5,
        };
        let info = manager.consume(&key, 15, &config, &cx).await.unwrap();
        assert!(info.allowed);
        assert_eq!(info.used, 15);
        assert_eq!(info.remaining, 0);
    }

    #[tokio::test]
    async fn multi_quota_short_circuits_on_first_hard_deny() {
        let store: std::sync::Arc<dyn QuotaStore> = std::sync::Arc::new(QuotaManager::new());
        let multi = MultiQuota::new(
            store,
            vec![
                NamedQuota {
                    name: "daily".into(),
                    config: hard(5),
                },
                NamedQuota {
                    name: "monthly".into(),
                    config: hard(1000),
                },
            ],
        );
        let cx = CancelContext::new();
        let key = Key::plain(Level::User, "tenant-3");

        let outcome = multi.consume(&key, 5, &cx).await.unwrap();
        assert!(outcome.allowed());
        assert_eq!(outcome.results.len(), 2);

        let outcome = multi.consume(&key, 1, &cx).await.unwrap();
        assert!(!outcome.allowed());
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.denied.as_ref().unwrap().0, "daily");
    }
}
