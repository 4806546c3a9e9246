//! Path filtering for filesystem diffs.
//!
//! Glob-style patterns over `/`-separated in-image paths, used to ignore
//! subtrees during the filesystem walk or to restrict the report to matching
//! paths.
//!
//! # Pattern Syntax
//!
//! - `etc` - matches literal segment "etc"
//! - `*` - matches any single path segment
//! - `**` - matches any number of path segments (including zero)
//! - `/var/cache` - matches nested path "/var/cache"
//! - `**/__pycache__` - matches "__pycache__" at any depth
//!
//! A leading `/` is optional; patterns are always anchored at the image root.
//!
//! # Examples
//!
//! ```
//! use idiff_rs::filter::{FilterConfig, PathPattern};
//!
//! let pattern = PathPattern::parse("/etc/passwd");
//! assert!(pattern.matches("/etc/passwd"));
//!
//! let pattern = PathPattern::parse("**/__pycache__");
//! assert!(pattern.matches("/usr/lib/python3.6/__pycache__"));
//!
//! let filter = FilterConfig::new().ignore("/var/cache");
//! assert!(!filter.should_descend("/var/cache"));
//! assert!(filter.should_include("/etc/hosts"));
//! ```

/// A single segment in a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    /// Matches an exact string
    Literal(String),
    /// Matches any single path segment (*)
    SingleWildcard,
    /// Matches any number of path segments (**)
    DoubleWildcard,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pub segments: Vec<PatternSegment>,
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = split(pattern)
            .into_iter()
            .map(|s| match s {
                "**" => PatternSegment::DoubleWildcard,
                "*" => PatternSegment::SingleWildcard,
                _ => PatternSegment::Literal(s.to_string()),
            })
            .collect();
        Self { segments }
    }

    pub fn matches(&self, path: &str) -> bool {
        matches_segments(&self.segments, &split(path))
    }
}

fn matches_segments(pattern: &[PatternSegment], path: &[&str]) -> bool {
    match (pattern.first(), path.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(_), None) => pattern
            .iter()
            .all(|s| matches!(s, PatternSegment::DoubleWildcard)),
        (Some(seg), Some(path_seg)) => match seg {
            PatternSegment::Literal(lit) => {
                lit == path_seg && matches_segments(&pattern[1..], &path[1..])
            }
            PatternSegment::SingleWildcard => matches_segments(&pattern[1..], &path[1..]),
            PatternSegment::DoubleWildcard => {
                matches_segments(&pattern[1..], path) || matches_segments(pattern, &path[1..])
            }
        },
    }
}

/// Ignore and include patterns for the filesystem differ.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Paths (and everything below them) left out of the walk
    pub ignore_patterns: Vec<PathPattern>,
    /// If non-empty, only matching paths are reported
    pub only_patterns: Vec<PathPattern>,
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.ignore_patterns.push(PathPattern::parse(pattern));
        self
    }

    pub fn only(mut self, pattern: &str) -> Self {
        self.only_patterns.push(PathPattern::parse(pattern));
        self
    }

    /// False when `path` is ignored; the walk prunes its subtree.
    pub fn should_descend(&self, path: &str) -> bool {
        !self.ignore_patterns.iter().any(|p| p.matches(path))
    }

    pub fn should_include(&self, path: &str) -> bool {
        if !self.should_descend(path) {
            return false;
        }

        // If only patterns are specified, at least one must match
        self.only_patterns.is_empty() || self.only_patterns.iter().any(|p| p.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ignores_leading_slash() {
        assert_eq!(
            PathPattern::parse("/etc/*").segments,
            PathPattern::parse("etc/*").segments
        );
    }

    #[test]
    fn test_single_wildcard() {
        let pattern = PathPattern::parse("/usr/*/python3.6");
        assert!(pattern.matches("/usr/lib/python3.6"));
        assert!(!pattern.matches("/usr/local/lib/python3.6"));
    }

    #[test]
    fn test_double_wildcard_matches_zero_segments() {
        let pattern = PathPattern::parse("/app/**");
        assert!(pattern.matches("/app"));
        assert!(pattern.matches("/app/node_modules/left-pad/index.js"));
        assert!(!pattern.matches("/srv/app"));
    }

    #[test]
    fn test_only_patterns() {
        let filter = FilterConfig::new().only("/etc/**");
        assert!(filter.should_include("/etc/hosts"));
        assert!(!filter.should_include("/usr/bin/env"));
        assert!(filter.should_descend("/usr"));
    }
}
