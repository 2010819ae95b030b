// src/version/mod.rs

//! Version handling and constraint satisfaction for registry search
//!
//! Search terms take the form `<identifier>[@<range>]`. The range grammar
//! supports the comparison operators `=`, `!=`, `>`, `>=`, `<`, `<=`, the
//! wildcard `*`, comma-separated conjunctions (`>= 1.0, < 2.0`) and
//! `||`-separated alternatives (`>4.3.1 || =1.1.0`).

use crate::error::{Error, Result};
use semver::Version;
use std::fmt;

/// Parse a search term into its identifier and optional version range
///
/// Examples:
/// - "foo" → ("foo", None)
/// - "foo@>1.0.0" → ("foo", Some(GreaterThan(1.0.0)))
/// - "foo@>4.3.1 || =1.1.0" → ("foo", Some(Or(..)))
pub fn parse_search_term(term: &str) -> Result<(String, Option<VersionConstraint>)> {
    match term.split_once('@') {
        Some((ident, range)) => {
            if ident.is_empty() {
                return Err(Error::Validation(format!(
                    "search term '{}' has an empty identifier",
                    term
                )));
            }
            Ok((ident.to_string(), Some(VersionConstraint::parse(range)?)))
        }
        None => Ok((term.to_string(), None)),
    }
}

/// Parse a version string leniently
///
/// Registry entries may carry short versions like "1.0"; normalize them to
/// major.minor.patch before comparison.
pub fn parse_lenient(s: &str) -> Result<Version> {
    let s = s.trim();
    if let Ok(v) = Version::parse(s) {
        return Ok(v);
    }

    let parts: Vec<&str> = s.split('.').collect();
    let numeric = |idx: usize| -> Option<u64> { parts.get(idx).and_then(|p| p.parse().ok()) };
    match numeric(0) {
        Some(major) => Ok(Version::new(
            major,
            numeric(1).unwrap_or(0),
            numeric(2).unwrap_or(0),
        )),
        None => Err(Error::Validation(format!("invalid version '{}'", s))),
    }
}

/// Version constraint operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// Any version is acceptable
    Any,
    /// Exact version match
    Exact(Version),
    /// Not equal
    NotEqual(Version),
    /// Greater than
    GreaterThan(Version),
    /// Greater than or equal
    GreaterOrEqual(Version),
    /// Less than
    LessThan(Version),
    /// Less than or equal
    LessOrEqual(Version),
    /// Both constraints must be satisfied (for ranges like ">= 1.0, < 2.0")
    And(Box<VersionConstraint>, Box<VersionConstraint>),
    /// Either constraint may be satisfied (for ranges like ">4.3.1 || =1.1.0")
    Or(Box<VersionConstraint>, Box<VersionConstraint>),
}

impl VersionConstraint {
    /// Parse a version constraint string
    ///
    /// Examples:
    /// - ">= 1.2.3" → GreaterOrEqual(1.2.3)
    /// - "< 2.0.0" → LessThan(2.0.0)
    /// - "= 1.5.0" → Exact(1.5.0)
    /// - "> 1.0" → GreaterThan(1.0.0)
    /// - ">1.0, <2.0" → And(GreaterThan, LessThan)
    /// - ">4.3.1 || =1.1.0" → Or(GreaterThan, Exact)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        if s.is_empty() || s == "*" {
            return Ok(VersionConstraint::Any);
        }

        // Alternatives bind loosest
        if let Some((left, right)) = s.split_once("||") {
            return Ok(VersionConstraint::Or(
                Box::new(Self::parse(left)?),
                Box::new(Self::parse(right)?),
            ));
        }

        // Then conjunctions (e.g. ">= 1.0, < 2.0")
        if let Some((left, right)) = s.split_once(',') {
            return Ok(VersionConstraint::And(
                Box::new(Self::parse(left)?),
                Box::new(Self::parse(right)?),
            ));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            Ok(VersionConstraint::GreaterOrEqual(parse_lenient(rest)?))
        } else if let Some(rest) = s.strip_prefix("<=") {
            Ok(VersionConstraint::LessOrEqual(parse_lenient(rest)?))
        } else if let Some(rest) = s.strip_prefix("!=") {
            Ok(VersionConstraint::NotEqual(parse_lenient(rest)?))
        } else if let Some(rest) = s.strip_prefix('>') {
            Ok(VersionConstraint::GreaterThan(parse_lenient(rest)?))
        } else if let Some(rest) = s.strip_prefix('<') {
            Ok(VersionConstraint::LessThan(parse_lenient(rest)?))
        } else if let Some(rest) = s.strip_prefix('=') {
            Ok(VersionConstraint::Exact(parse_lenient(rest)?))
        } else {
            // No operator means exact match
            Ok(VersionConstraint::Exact(parse_lenient(s)?))
        }
    }

    /// Check if a version satisfies this constraint
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Exact(v) => version == v,
            VersionConstraint::NotEqual(v) => version != v,
            VersionConstraint::GreaterThan(v) => version > v,
            VersionConstraint::GreaterOrEqual(v) => version >= v,
            VersionConstraint::LessThan(v) => version < v,
            VersionConstraint::LessOrEqual(v) => version <= v,
            VersionConstraint::And(left, right) => {
                left.satisfies(version) && right.satisfies(version)
            }
            VersionConstraint::Or(left, right) => {
                left.satisfies(version) || right.satisfies(version)
            }
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "*"),
            VersionConstraint::Exact(v) => write!(f, "= {}", v),
            VersionConstraint::NotEqual(v) => write!(f, "!= {}", v),
            VersionConstraint::GreaterThan(v) => write!(f, "> {}", v),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">= {}", v),
            VersionConstraint::LessThan(v) => write!(f, "< {}", v),
            VersionConstraint::LessOrEqual(v) => write!(f, "<= {}", v),
            VersionConstraint::And(left, right) => write!(f, "{}, {}", left, right),
            VersionConstraint::Or(left, right) => write!(f, "{} || {}", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_term_without_range() {
        let (ident, range) = parse_search_term("foo").unwrap();
        assert_eq!(ident, "foo");
        assert!(range.is_none());
    }

    #[test]
    fn test_parse_search_term_with_range() {
        let (ident, range) = parse_search_term("foo@>1.0.0").unwrap();
        assert_eq!(ident, "foo");
        let v = Version::new(1, 2, 0);
        assert!(range.unwrap().satisfies(&v));
    }

    #[test]
    fn test_parse_lenient_short_version() {
        assert_eq!(parse_lenient("1.0").unwrap(), Version::new(1, 0, 0));
        assert_eq!(parse_lenient("2").unwrap(), Version::new(2, 0, 0));
    }

    #[test]
    fn test_constraint_exact() {
        let c = VersionConstraint::parse("1.2.3").unwrap();
        assert!(c.satisfies(&Version::new(1, 2, 3)));
        assert!(!c.satisfies(&Version::new(1, 2, 4)));
    }

    #[test]
    fn test_constraint_greater_or_equal() {
        let c = VersionConstraint::parse(">= 1.2.0").unwrap();
        assert!(c.satisfies(&Version::new(1, 2, 0)));
        assert!(c.satisfies(&Version::new(1, 3, 0)));
        assert!(!c.satisfies(&Version::new(1, 1, 0)));
    }

    #[test]
    fn test_constraint_conjunction() {
        let c = VersionConstraint::parse(">= 1.0, < 2.0").unwrap();
        assert!(c.satisfies(&Version::new(1, 5, 0)));
        assert!(!c.satisfies(&Version::new(2, 0, 0)));
        assert!(!c.satisfies(&Version::new(0, 9, 0)));
    }

    #[test]
    fn test_constraint_alternatives() {
        let c = VersionConstraint::parse(">4.3.1 || =1.1.0").unwrap();
        assert!(c.satisfies(&Version::new(4, 4, 0)));
        assert!(c.satisfies(&Version::new(1, 1, 0)));
        assert!(!c.satisfies(&Version::new(2, 0, 0)));
    }

    #[test]
    fn test_constraint_wildcard() {
        let c = VersionConstraint::parse("*").unwrap();
        assert!(c.satisfies(&Version::new(0, 0, 1)));
    }

    #[test]
    fn test_constraint_not_equal() {
        let c = VersionConstraint::parse("!=1.0.0").unwrap();
        assert!(!c.satisfies(&Version::new(1, 0, 0)));
        assert!(c.satisfies(&Version::new(1, 0, 1)));
    }
}
