//! Admission middleware (component D, spec §4.D): derives keys from
//! transport context, calls the multi-level limiter then the quota
//! composition, and shapes the response headers/429 body.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use gateway_core::CancelContext;
use gateway_types::{GatewayError, Key, Level, QuotaInfo};
use serde::Serialize;
use serde_json::{json, Value};

use crate::multi_level::{LevelCheck, MultiLevelLimiter};
use crate::quota::MultiQuota;

/// Transport-context keys derived for one request (spec §4.D: "one global
/// key, plus user/ip, plus optional provider/model").
pub struct RequestKeys {
    /// Always present: the deployment-wide key.
    pub global: Key,
    /// From the authenticated principal, if any.
    pub user: Option<Key>,
    /// From the peer address, if any.
    pub ip: Option<Key>,
    /// Parsed from request metadata, if present.
    pub provider: Option<Key>,
    /// Parsed from request metadata, if present.
    pub model: Option<Key>,
}

impl RequestKeys {
    fn checks(&self, limiters: &[(Level, Arc<dyn gateway_core::Limiter>)]) -> Vec<LevelCheck> {
        let key_for = |level: Level| -> Option<&Key> {
            match level {
                Level::Global => Some(&self.global),
                Level::User => self.user.as_ref(),
                Level::Ip => self.ip.as_ref(),
                Level::Provider => self.provider.as_ref(),
                Level::Model => self.model.as_ref(),
            }
        };
        limiters
            .iter()
            .filter_map(|(level, limiter)| {
                key_for(*level).map(|key| LevelCheck {
                    limiter: Arc::clone(limiter),
                    key: key.clone(),
                })
            })
            .collect()
    }
}

/// The standard header set set on every gated request (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionHeaders {
    /// `X-RateLimit-Limit`.
    pub rate_limit_limit: i64,
    /// `X-RateLimit-Remaining`.
    pub rate_limit_remaining: i64,
    /// `X-RateLimit-Reset`.
    pub rate_limit_reset: u64,
    /// The combined `RateLimit` header value.
    pub rate_limit_combined: String,
    /// Per-named-quota header groups, if quota checking is configured.
    pub quota: Vec<QuotaHeaders>,
}

/// `X-Quota-*` headers for one named quota.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaHeaders {
    /// Which named quota these headers describe (e.g. `"daily"`).
    pub name: String,
    /// `X-Quota-Limit`.
    pub limit: u64,
    /// `X-Quota-Used`.
    pub used: u64,
    /// `X-Quota-Remaining`.
    pub remaining: u64,
    /// `X-Quota-Reset`.
    pub reset: u64,
    /// `X-Quota-Warning`, present only when true.
    pub warning: bool,
}

fn combined_header(limit: i64, remaining: i64, reset: u64) -> String {
    format!("limit={limit}, remaining={remaining}, reset={reset}")
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// The JSON body of a denial response (spec §6: rate-limit or quota 429/others).
#[derive(Debug, Clone, Serialize)]
pub struct DenialBody {
    /// `"rate_limit_exceeded"` | `"quota_exceeded"`.
    pub error: &'static str,
    /// Human-readable description.
    pub message: String,
    /// Effective limit.
    pub limit: i64,
    /// Remaining units (0 for a denial).
    pub remaining: i64,
    /// Unix-second reset timestamp.
    pub reset: u64,
    /// Seconds until retry may succeed.
    pub retry_after: u64,
    /// `"soft"` | `"hard"`, present only for quota denials.
    pub kind: Option<&'static str>,
}

/// Outcome of [`AdmissionMiddleware::admit`].
pub enum AdmissionOutcome {
    /// Request admitted; headers to attach to the downstream response.
    Allowed(AdmissionHeaders),
    /// Request denied; HTTP status and JSON body to return immediately.
    Denied {
        /// HTTP status code (429 for limiter/quota denial).
        status: u16,
        /// The structured denial body.
        body: DenialBody,
    },
}

/// Composes the multi-level limiter and (optionally) quota checking for
/// whole requests, per the per-endpoint config resolved by the caller.
pub struct AdmissionMiddleware {
    limiters: Vec<(Level, Arc<dyn gateway_core::Limiter>)>,
    composer: MultiLevelLimiter,
    quota: Option<MultiQuota>,
}

impl AdmissionMiddleware {
    /// Construct an admission layer over `limiters` (one per level checked)
    /// and an optional quota composition.
    #[must_use]
    pub fn new(
        limiters: Vec<(Level, Arc<dyn gateway_core::Limiter>)>,
        composer: MultiLevelLimiter,
        quota: Option<MultiQuota>,
    ) -> Self {
        Self {
            limiters,
            composer,
            quota,
        }
    }

    /// Run admission for one request, consuming `n` units from each checked level/quota.
    pub async fn admit(&self, keys: &RequestKeys, n: u64, cx: &CancelContext) -> Result<AdmissionOutcome, GatewayError> {
        cx.check()?;
        let checks = keys.checks(&self.limiters);
        let info = match self.composer.allow(&checks, n, cx).await {
            Ok(info) => info,
            Err(GatewayError::LimitExceeded {
                limit,
                remaining,
                reset,
                retry_after_ms,
            }) => {
                return Ok(AdmissionOutcome::Denied {
                    status: 429,
                    body: DenialBody {
                        error: "rate_limit_exceeded",
                        message: "rate limit exceeded".to_string(),
                        limit,
                        remaining,
                        reset,
                        retry_after: retry_after_ms.div_ceil(1000),
                        kind: None,
                    },
                });
            }
            Err(e) => return Err(e),
        };

        let mut quota_headers = Vec::new();
        if let Some(quota) = &self.quota {
            let outcome = quota.consume(&keys.global, n, cx).await?;
            quota_headers = outcome
                .results
                .iter()
                .map(|(name, qi)| quota_headers_for(name, qi))
                .collect();
            if let Some((name, err)) = outcome.denied {
                if let GatewayError::QuotaExceededHard { used: _, limit, reset } = err {
                    return Ok(AdmissionOutcome::Denied {
                        status: 429,
                        body: DenialBody {
                            error: "quota_exceeded",
                            message: format!("{name} quota exceeded"),
                            limit: i64::try_from(limit).unwrap_or(i64::MAX),
                            remaining: 0,
                            reset,
                            retry_after: reset.saturating_sub(now_unix()),
                            kind: Some("hard"),
                        },
                    });
                }
                return Err(err);
            }
        }

        Ok(AdmissionOutcome::Allowed(AdmissionHeaders {
            rate_limit_limit: info.limit,
            rate_limit_remaining: info.remaining,
            rate_limit_reset: info.reset,
            rate_limit_combined: combined_header(info.limit, info.remaining, info.reset),
            quota: quota_headers,
        }))
    }
}

/// Per-endpoint variant of admission (spec §4.D): resolves the request path
/// against a set of [`crate::endpoint::EndpointRules`] to pick which
/// [`AdmissionMiddleware`] profile governs the call, then runs it.
pub struct EndpointAdmission {
    rules: crate::endpoint::EndpointRules<AdmissionMiddleware>,
}

impl EndpointAdmission {
    /// Wrap a pre-built rule set.
    #[must_use]
    pub fn new(rules: crate::endpoint::EndpointRules<AdmissionMiddleware>) -> Self {
        Self { rules }
    }

    /// Resolve `path` to an admission profile and run it.
    pub async fn admit(&self, path: &str, keys: &RequestKeys, n: u64, cx: &CancelContext) -> Result<AdmissionOutcome, GatewayError> {
        self.rules.resolve(path).admit(keys, n, cx).await
    }
}

fn quota_headers_for(name: &str, info: &QuotaInfo) -> QuotaHeaders {
    QuotaHeaders {
        name: name.to_string(),
        limit: info.limit,
        used: info.used,
        remaining: info.remaining,
        reset: info.reset,
        warning: info.warning,
    }
}

/// Serialize a [`DenialBody`] to the JSON wire shape (spec §6).
#[must_use]
pub fn denial_body_json(body: &DenialBody) -> Value {
    let mut value = json!({
        "error": body.error,
        "message": body.message,
        "limit": body.limit,
        "remaining": body.remaining,
        "reset": body.reset,
        "retry_after": body.retry_after,
    });
    if let Some(kind) = body.kind {
        value["type"] = json!(kind);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{MultiQuota, NamedQuota, QuotaManager};
    use gateway_limiter_local::LocalLimiter;
    use gateway_types::{Algorithm, Backing, LimiterConfig, QuotaConfig, QuotaKind, QuotaPeriod};
    use std::time::Duration;

    fn local(level: Level, limit: u64) -> Arc<dyn gateway_core::Limiter> {
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

    fn keys() -> RequestKeys {
        RequestKeys {
            global: Key::plain(Level::Global, "*"),
            user: Some(Key::plain(Level::User, "alice")),
            ip: None,
            provider: None,
            model: None,
        }
    }

    #[tokio::test]
    async fn admitted_request_carries_standard_headers() {
        let mw = AdmissionMiddleware::new(
            vec![(Level::Global, local(Level::Global, 100)), (Level::User, local(Level::User, 10))],
            MultiLevelLimiter::default(),
            None,
        );
        let cx = CancelContext::new();
        let outcome = mw.admit(&keys(), 1, &cx).await.unwrap();
        match outcome {
            AdmissionOutcome::Allowed(headers) => {
                assert_eq!(headers.rate_limit_limit, 10);
                assert!(headers.rate_limit_combined.contains("limit=10"));
            }
            AdmissionOutcome::Denied { .. } => panic!("expected admission"),
        }
    }

    #[tokio::test]
    async fn denied_request_yields_429_body() {
        let mw = AdmissionMiddleware::new(vec![(Level::User, local(Level::User, 1))], MultiLevelLimiter::default(), None);
        let cx = CancelContext::new();
        mw.admit(&keys(), 1, &cx).await.unwrap();
        let outcome = mw.admit(&keys(), 1, &cx).await.unwrap();
        match outcome {
            AdmissionOutcome::Denied { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body.error, "rate_limit_exceeded");
                assert!(body.retry_after > 0);
            }
            AdmissionOutcome::Allowed(_) => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn endpoint_admission_resolves_by_longest_matching_prefix() {
        let chat = AdmissionMiddleware::new(vec![(Level::Global, local(Level::Global, 1))], MultiLevelLimiter::default(), None);
        let default = AdmissionMiddleware::new(vec![(Level::Global, local(Level::Global, 100))], MultiLevelLimiter::default(), None);
        let rules = crate::endpoint::EndpointRules::new(default).with_prefix("/v1/chat/", chat);
        let endpoint = EndpointAdmission::new(rules);
        let cx = CancelContext::new();

        // The narrower /v1/chat/ profile has a limit of 1: the first call admits...
        let first = endpoint.admit("/v1/chat/completions", &keys(), 1, &cx).await.unwrap();
        assert!(matches!(first, AdmissionOutcome::Allowed(_)));
        // ...and the second is denied, proving the chat-specific profile (not
        // the default's limit of 100) governed this path.
        let second = endpoint.admit("/v1/chat/completions", &keys(), 1, &cx).await.unwrap();
        assert!(matches!(second, AdmissionOutcome::Denied { .. }));

        // An unrelated path falls through to the default profile untouched.
        let other = endpoint.admit("/v1/models", &keys(), 1, &cx).await.unwrap();
        assert!(matches!(other, AdmissionOutcome::Allowed(_)));
    }

    #[tokio::test]
    async fn quota_denial_short_circuits_after_limiter_admits() {
        let store: Arc<dyn gateway_core::QuotaStore> = Arc::new(QuotaManager::new());
        let quota = MultiQuota::new(
            store,
            vec![NamedQuota {
                name: "daily".into(),
                config: QuotaConfig {
                    limit: 1,
                    period: QuotaPeriod::Day,
                    kind: QuotaKind::Hard,
                    warning_threshold: 0.8,
                },
            }],
        );
        let mw = AdmissionMiddleware::new(
            vec![(Level::Global, local(Level::Global, 1000))],
            MultiLevelLimiter::default(),
            Some(quota),
        );
        let cx = CancelContext::new();
        mw.admit(&keys(), 1, &cx).await.unwrap();
        let outcome = mw.admit(&keys(), 1, &cx).await.unwrap();
        match outcome {
            AdmissionOutcome::Denied { body, .. } => assert_eq!(body.error, "quota_exceeded"),
            AdmissionOutcome::Allowed(_) => panic!("expected quota denial"),
        }
    }
}
