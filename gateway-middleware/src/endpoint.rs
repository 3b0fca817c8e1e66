//! Per-endpoint configuration resolution (spec §4.D: "the middleware resolves
//! the best matching configuration by {exact path, longest-prefix wildcard,
//! default}").
//!
//! Precedence mirrors the teacher's own routing policy (`RoutingPolicy`'s
//! most-specific-scope-wins resolution for provider/exchange preferences):
//! an exact match always wins, then the most specific (longest) matching
//! wildcard prefix, then the default.

use std::collections::HashMap;

/// A set of per-endpoint rules resolving a request path to the best-matching
/// `T`, with a mandatory default for paths that match nothing more specific.
#[derive(Debug, Clone)]
pub struct EndpointRules<T> {
    exact: HashMap<String, T>,
    prefixes: Vec<(String, T)>,
    default: T,
}

impl<T> EndpointRules<T> {
    /// Start from a bare default; no per-endpoint overrides registered yet.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self {
            exact: HashMap::new(),
            prefixes: Vec::new(),
            default,
        }
    }

    /// Register an exact-path rule. Exact matches always outrank any prefix.
    #[must_use]
    pub fn with_exact(mut self, path: impl Into<String>, value: T) -> Self {
        self.exact.insert(path.into(), value);
        self
    }

    /// Register a prefix-wildcard rule, e.g. `"/v1/chat/"` to match
    /// `/v1/chat/completions`. Among several matching prefixes, the longest
    /// (most specific) one wins.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>, value: T) -> Self {
        self.prefixes.push((prefix.into(), value));
        self
    }

    /// Resolve the best-matching value for `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> &T {
        if let Some(v) = self.exact.get(path) {
            return v;
        }
        self.prefixes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(&self.default, |(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_when_nothing_matches() {
        let rules = EndpointRules::new("default");
        assert_eq!(*rules.resolve("/unmatched"), "default");
    }

    #[test]
    fn exact_beats_any_prefix() {
        let rules = EndpointRules::new("default")
            .with_prefix("/v1/", "broad")
            .with_exact("/v1/chat/completions", "exact");
        assert_eq!(*rules.resolve("/v1/chat/completions"), "exact");
    }

    #[test]
    fn longest_prefix_wins_among_overlapping_matches() {
        let rules = EndpointRules::new("default").with_prefix("/v1/", "broad").with_prefix("/v1/chat/", "narrow");
        assert_eq!(*rules.resolve("/v1/chat/completions"), "narrow");
        assert_eq!(*rules.resolve("/v1/models"), "broad");
    }
}
