//! Limiter keys: the `{Level, Identifier}` pair every algorithm is keyed on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One axis of rate-limit aggregation.
///
/// Order here is significant only as a default iteration order for
/// [`crate::LimiterConfig`] collections; the multi-level composer (component B)
/// is free to override it via explicit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Level {
    /// Applies across every request regardless of caller.
    Global,
    /// Per authenticated principal.
    User,
    /// Per peer IP address.
    Ip,
    /// Per upstream provider.
    Provider,
    /// Per requested model.
    Model,
}

impl Level {
    /// Stable short name used in distributed backing key layout (§6).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::User => "user",
            Self::Ip => "ip",
            Self::Provider => "provider",
            Self::Model => "model",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque, printable identifier unique within a [`Level`].
///
/// The `Premium` variant exists so the multi-level composer can switch to a
/// premium-tagged identifier at lookup time (spec §4.B) without mutating
/// shared counter state or threading a boolean through every call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    /// A plain identifier, e.g. a user id or IP address string.
    Plain(String),
    /// The same logical identifier, but consuming the premium-scaled budget.
    Premium(String),
}

impl Identifier {
    /// Create a plain identifier.
    pub fn plain(id: impl Into<String>) -> Self {
        Self::Plain(id.into())
    }

    /// Create a premium identifier.
    pub fn premium(id: impl Into<String>) -> Self {
        Self::Premium(id.into())
    }

    /// The underlying logical id, irrespective of premium tagging.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Plain(s) | Self::Premium(s) => s,
        }
    }

    /// Whether this identifier is tagged as premium.
    #[must_use]
    pub const fn is_premium(&self) -> bool {
        matches!(self, Self::Premium(_))
    }

    /// The printable storage-key segment: premium identifiers get a
    /// distinguishing suffix so they never collide with the plain key's state.
    #[must_use]
    pub fn storage_segment(&self) -> String {
        match self {
            Self::Plain(s) => s.clone(),
            Self::Premium(s) => format!("{s}#premium"),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_segment())
    }
}

/// `{Level, Identifier}`: the unit every limiter algorithm tracks state for.
///
/// Lifecycle: implicit on first reference (no explicit registration call);
/// swept when its algorithmic state has been idle longer than `window * 2`
/// (local variant: idle sweep task; distributed variant: storage TTL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    /// The aggregation axis.
    pub level: Level,
    /// The identifier within that axis.
    pub identifier: Identifier,
}

impl Key {
    /// Construct a new key.
    #[must_use]
    pub const fn new(level: Level, identifier: Identifier) -> Self {
        Self { level, identifier }
    }

    /// Convenience constructor for a plain identifier.
    pub fn plain(level: Level, id: impl Into<String>) -> Self {
        Self::new(level, Identifier::plain(id))
    }

    /// The distributed backing key prefix segment: `{level}:{identifier}`.
    #[must_use]
    pub fn storage_path(&self) -> String {
        format!("{}:{}", self.level, self.identifier.storage_segment())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.identifier)
    }
}
