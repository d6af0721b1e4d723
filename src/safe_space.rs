//! Safe-space filtering of vulnerable identifiers.
//!
//! A safe space is an operator-declared namespace glob (for example
//! `@mycompany/*`) whose members are never reported, even when they are
//! missing from the public registry.

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

/// Compiled set of safe-space patterns.
#[derive(Debug, Clone, Default)]
pub struct SafeSpaces {
    matchers: Vec<GlobMatcher>,
}

impl SafeSpaces {
    /// Compile the given globs. A malformed pattern is logged and never matches.
    pub fn new(patterns: &[String]) -> Self {
        let matchers = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter_map(|pattern| {
                // `*` stops at `/`, same as shell path matching.
                match GlobBuilder::new(pattern).literal_separator(true).build() {
                    Ok(glob) => Some(glob.compile_matcher()),
                    Err(e) => {
                        warn!(
                            "Ignoring malformed safe-space pattern {}: {}",
                            pattern, e
                        );
                        None
                    }
                }
            })
            .collect();

        Self { matchers }
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// True when any pattern matches the identifier.
    pub fn is_safe(&self, identifier: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(identifier))
    }

    /// Remove identifiers covered by a safe space, keeping order.
    pub fn filter(&self, identifiers: Vec<String>) -> Vec<String> {
        if self.is_empty() {
            return identifiers;
        }
        identifiers
            .into_iter()
            .filter(|name| !self.is_safe(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaces(patterns: &[&str]) -> SafeSpaces {
        let owned: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        SafeSpaces::new(&owned)
    }

    #[test]
    fn test_scoped_namespace() {
        let safe = spaces(&["@company/*"]);
        assert!(safe.is_safe("@company/foo"));
        assert!(!safe.is_safe("@other/foo"));
        assert!(!safe.is_safe("company-foo"));
    }

    #[test]
    fn test_star_does_not_cross_separator() {
        let safe = spaces(&["@company/*"]);
        assert!(!safe.is_safe("@company/foo/bar"));
    }

    #[test]
    fn test_prefix_pattern() {
        let safe = spaces(&["internal-*", "com.acme:*"]);
        assert!(safe.is_safe("internal-auth"));
        assert!(safe.is_safe("com.acme:billing"));
        assert!(!safe.is_safe("requests"));
    }

    #[test]
    fn test_malformed_pattern_is_no_match() {
        let safe = spaces(&["[unclosed", "@company/*"]);
        assert!(safe.is_safe("@company/foo"));
        assert!(!safe.is_safe("[unclosed"));
    }

    #[test]
    fn test_filter_keeps_order() {
        let safe = spaces(&["@company/*"]);
        let filtered = safe.filter(vec![
            "b".to_string(),
            "@company/x".to_string(),
            "a".to_string(),
        ]);
        assert_eq!(filtered, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_empty_patterns() {
        let safe = spaces(&["", "  "]);
        assert!(safe.is_empty());
        assert!(!safe.is_safe("anything"));
    }
}
