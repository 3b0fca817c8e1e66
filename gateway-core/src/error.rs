//! Re-export of the shared error taxonomy.
//!
//! The taxonomy itself lives in `gateway-types` because it must be
//! serializable into the 429 response body (spec §6); every crate in the
//! workspace that only needs to construct or match on it depends on
//! `gateway-core` and uses this re-export instead of adding a direct
//! `gateway-types` dependency for a single type.

pub use gateway_types::GatewayError;
