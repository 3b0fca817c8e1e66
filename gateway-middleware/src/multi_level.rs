//! Multi-level limiter (component B, spec §4.B): checks several [`Level`]s
//! of the same request against independently-configured limiters, with a
//! whitelist bypass and "most restrictive wins" short-circuit semantics.

use std::collections::HashSet;
use std::sync::Arc;

use gateway_core::{CancelContext, Limiter};
use gateway_types::{GatewayError, Identifier, Key, Level, LimitInfo};

/// One level's limiter plus the key it should be checked under for a request.
pub struct LevelCheck {
    /// The limiter enforcing this level.
    pub limiter: Arc<dyn Limiter>,
    /// The key to check against that limiter.
    pub key: Key,
}

/// Composes per-level limiters behind a single `check` call.
///
/// Per spec §4.B: levels are probed in the order given; the first denial
/// short-circuits the remaining probes (already-consumed levels are **not**
/// rolled back — see the matching entry in `DESIGN.md`); if every level
/// admits, the returned [`LimitInfo`] is the one with the smallest
/// `remaining`, since that is the level the caller is closest to exhausting.
pub struct MultiLevelLimiter {
    whitelist: HashSet<String>,
}

impl Default for MultiLevelLimiter {
    fn default() -> Self {
        Self::new(HashSet::new())
    }
}

impl MultiLevelLimiter {
    /// Construct a composer. `whitelist` holds raw identifiers (spec §4.B.:
    /// "an identifier in the whitelist bypasses every level") that are never
    /// rate-limited regardless of which level they appear at.
    #[must_use]
    pub fn new(whitelist: HashSet<String>) -> Self {
        Self { whitelist }
    }

    fn is_whitelisted(&self, identifier: &Identifier) -> bool {
        self.whitelist.contains(identifier.raw())
    }

    /// Attempt to admit `n` units across every `check` in order.
    ///
    /// `checks` whose identifier is whitelisted are skipped entirely (they
    /// neither consume nor deny). If `checks` is empty or every check is
    /// whitelisted, the call is unconditionally allowed.
    ///
    /// # Errors
    /// Returns `GatewayError::LimitExceeded` on the first denying level, or
    /// propagates any error a constituent limiter raises (e.g.
    /// `GatewayError::BackingStoreUnavailable`).
    pub async fn allow(&self, checks: &[LevelCheck], n: u64, cx: &CancelContext) -> Result<LimitInfo, GatewayError> {
        cx.check()?;
        let mut tightest: Option<LimitInfo> = None;

        for check in checks {
            if self.is_whitelisted(&check.key.identifier) {
                continue;
            }
            let info = check.limiter.allow(&check.key, n, cx).await?;
            if !info.allowed {
                return Err(GatewayError::LimitExceeded {
                    limit: info.limit,
                    remaining: info.remaining,
                    reset: info.reset,
                    retry_after_ms: u64::try_from(info.retry_after.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tightest = Some(match tightest {
                Some(current) if current.remaining <= info.remaining => current,
                _ => info,
            });
        }

        Ok(tightest.unwrap_or_else(|| LimitInfo::unlimited(now_unix())))
    }

    /// Inspect every level without consuming capacity, for status reporting.
    pub async fn get_info(&self, checks: &[LevelCheck], cx: &CancelContext) -> Result<Vec<(Level, LimitInfo)>, GatewayError> {
        cx.check()?;
        let mut out = Vec::with_capacity(checks.len());
        for check in checks {
            if self.is_whitelisted(&check.key.identifier) {
                continue;
            }
            out.push((check.key.level, check.limiter.get_info(&check.key, cx).await?));
        }
        Ok(out)
    }
}

fn now_unix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_limiter_local::LocalLimiter;
    use gateway_types::{Algorithm, Backing, LimiterConfig};
    use std::time::Duration;

    fn limiter(level: Level, limit: u64) -> Arc<dyn Limiter> {
        Arc::new(
            LocalLimiter::new(LimiterConfig {
                level,
                algorithm: Algorithm::FixedWindow,
                limit,
                window: Duration::from_secs(60),
                burst: 0,
                premium_multiplier: 1,
                distributed: Backing::Local,
                key_prefix: "gw".into(),
                fail_closed: true,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn most_restrictive_level_denies_first() {
        let composer = MultiLevelLimiter::default();
        let cx = CancelContext::new();
        let checks = vec![
            LevelCheck {
                limiter: limiter(Level::Global, 1000),
                key: Key::plain(Level::Global, "*"),
            },
            LevelCheck {
                limiter: limiter(Level::User, 2),
                key: Key::plain(Level::User, "alice"),
            },
        ];

        composer.allow(&checks, 1, &cx).await.unwrap();
        composer.allow(&checks, 1, &cx).await.unwrap();
        let err = composer.allow(&checks, 1, &cx).await.unwrap_err();
        assert!(matches!(err, GatewayError::LimitExceeded { .. }));
    }

    #[tokio::test]
    async fn whitelisted_identifier_bypasses_every_level() {
        let mut whitelist = HashSet::new();
        whitelist.insert("trusted-bot".to_string());
        let composer = MultiLevelLimiter::new(whitelist);
        let cx = CancelContext::new();
        let checks = vec![LevelCheck {
            limiter: limiter(Level::User, 1),
            key: Key::plain(Level::User, "trusted-bot"),
        }];

        for _ in 0..10 {
            let info = composer.allow(&checks, 1, &cx).await.unwrap();
            assert!(info.allowed);
        }
    }

    #[tokio::test]
    async fn tightest_remaining_wins_when_all_admit() {
        let composer = MultiLevelLimiter::default();
        let cx = CancelContext::new();
        let checks = vec![
            LevelCheck {
                limiter: limiter(Level::Global, 1000),
                key: Key::plain(Level::Global, "*"),
            },
            LevelCheck {
                limiter: limiter(Level::User, 5),
                key: Key::plain(Level::User, "bob"),
            },
        ];
        let info = composer.allow(&checks, 1, &cx).await.unwrap();
        assert_eq!(info.limit, 5);
    }
}
