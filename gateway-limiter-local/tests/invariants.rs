//! Property-based invariant checks shared across algorithms (spec §8).

use std::time::Duration;

use gateway_core::{CancelContext, Limiter};
use gateway_limiter_local::LocalLimiter;
use gateway_types::{Algorithm, Backing, Identifier, Key, Level, LimiterConfig};
use proptest::prelude::*;

fn cfg(algorithm: Algorithm, limit: u64) -> LimiterConfig {
    LimiterConfig {
        level: Level::User,
        algorithm,
        limit,
        window: Duration::from_millis(500),
        burst: 0,
        premium_multiplier: 1,
        distributed: Backing::Local,
        key_prefix: "gw".into(),
        fail_closed: true,
    }
}

fn algorithms() -> impl Strategy<Value = Algorithm> {
    prop_oneof![
        Just(Algorithm::TokenBucket),
        Just(Algorithm::LeakyBucket),
        Just(Algorithm::FixedWindow),
        Just(Algorithm::SlidingWindowLog),
        Just(Algorithm::SlidingWindowCounter),
    ]
}

proptest! {
    // remaining never exceeds limit and never drops below zero (spec §3 invariant).
    #[test]
    fn remaining_stays_in_bounds(algorithm in algorithms(), limit in 1u64..50, calls in 1usize..40) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let limiter = LocalLimiter::new(cfg(algorithm, limit)).unwrap();
            let cx = CancelContext::new();
            let key = Key::new(Level::User, Identifier::plain("p"));
            for _ in 0..calls {
                let info = limiter.allow(&key, 1, &cx).await.unwrap();
                prop_assert!(info.remaining >= 0);
                prop_assert!(info.remaining <= info.limit);
                if !info.allowed {
                    prop_assert!(info.retry_after > Duration::ZERO);
                }
            }
            Ok(())
        })?;
    }

    // a denial always carries a positive retry_after (spec §3 invariant).
    #[test]
    fn denial_always_has_retry_after(algorithm in algorithms(), limit in 1u64..10) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let limiter = LocalLimiter::new(cfg(algorithm, limit)).unwrap();
            let cx = CancelContext::new();
            let key = Key::new(Level::User, Identifier::plain("q"));
            let mut saw_denial = false;
            for _ in 0..(limit * 3 + 5) {
                let info = limiter.allow(&key, 1, &cx).await.unwrap();
                if !info.allowed {
                    saw_denial = true;
                    prop_assert!(info.retry_after > Duration::ZERO);
                }
            }
            prop_assert!(saw_denial);
            Ok(())
        })?;
    }
}
