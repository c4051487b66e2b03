//! Loose version comparison and dependency constraints
//!
//! Versions are dot-separated segments compared left to right. Numeric
//! segments compare numerically; anything else compares as text and sorts
//! before any number, so `1.0.0-beta` < `1.0.0`. When one version is a prefix
//! of the other, the shorter one is smaller (`1.0` < `1.0.0`).

use std::cmp::Ordering;
use std::fmt;

use crate::manifest::ANY_VERSION;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Text(String),
    Number(u64),
}

fn segments(version: &str) -> Vec<Segment> {
    let version = version.trim();
    let version = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);

    version
        .split('.')
        .map(|part| match part.parse::<u64>() {
            Ok(n) => Segment::Number(n),
            Err(_) => Segment::Text(part.to_string()),
        })
        .collect()
}

/// Compare two loose version strings segment by segment
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    segments(a).cmp(&segments(b))
}

/// A version-matching rule attached to a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// `*`
    Any,
    /// `^1.2`: same first segment, at least 1.2
    Caret(String),
    /// `~1.2.3`: same first and second segment, at least 1.2.3
    Tilde(String),
    GreaterOrEqual(String),
    Greater(String),
    LessOrEqual(String),
    Less(String),
    /// Bare version: segment-wise equality
    Exact(String),
}

impl VersionConstraint {
    /// Parse a constraint string. Every string is a constraint; unknown
    /// shapes fall through to exact matching.
    pub fn parse(constraint: &str) -> Self {
        let constraint = constraint.trim();
        let rest = |prefix: &str| constraint[prefix.len()..].trim().to_string();

        if constraint == ANY_VERSION {
            VersionConstraint::Any
        } else if constraint.starts_with('^') {
            VersionConstraint::Caret(rest("^"))
        } else if constraint.starts_with('~') {
            VersionConstraint::Tilde(rest("~"))
        } else if constraint.starts_with(">=") {
            VersionConstraint::GreaterOrEqual(rest(">="))
        } else if constraint.starts_with('>') {
            VersionConstraint::Greater(rest(">"))
        } else if constraint.starts_with("<=") {
            VersionConstraint::LessOrEqual(rest("<="))
        } else if constraint.starts_with('<') {
            VersionConstraint::Less(rest("<"))
        } else {
            VersionConstraint::Exact(constraint.to_string())
        }
    }

    /// Whether an installed version satisfies this constraint
    pub fn matches(&self, installed: &str) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Caret(base) => {
                let (have, want) = (segments(installed), segments(base));
                have.first() == want.first() && have >= want
            }
            VersionConstraint::Tilde(base) => {
                let (have, want) = (segments(installed), segments(base));
                have.first() == want.first() && have.get(1) == want.get(1) && have >= want
            }
            VersionConstraint::GreaterOrEqual(base) => compare_versions(installed, base).is_ge(),
            VersionConstraint::Greater(base) => compare_versions(installed, base).is_gt(),
            VersionConstraint::LessOrEqual(base) => compare_versions(installed, base).is_le(),
            VersionConstraint::Less(base) => compare_versions(installed, base).is_lt(),
            VersionConstraint::Exact(base) => compare_versions(installed, base).is_eq(),
        }
    }

    /// Whether a dependency's recorded version satisfies this constraint.
    /// A module without a version only satisfies `*`.
    pub fn satisfied_by(&self, installed: Option<&str>) -> bool {
        match installed {
            Some(version) => self.matches(version),
            None => matches!(self, VersionConstraint::Any),
        }
    }
}

impl std::str::FromStr for VersionConstraint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "{ANY_VERSION}"),
            VersionConstraint::Caret(v) => write!(f, "^{v}"),
            VersionConstraint::Tilde(v) => write!(f, "~{v}"),
            VersionConstraint::GreaterOrEqual(v) => write!(f, ">={v}"),
            VersionConstraint::Greater(v) => write!(f, ">{v}"),
            VersionConstraint::LessOrEqual(v) => write!(f, "<={v}"),
            VersionConstraint::Less(v) => write!(f, "<{v}"),
            VersionConstraint::Exact(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn satisfies(installed: &str, constraint: &str) -> bool {
        VersionConstraint::parse(constraint).matches(installed)
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.2", "1.2"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0-beta", "1.0.0"), Ordering::Less);
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(VersionConstraint::parse("*"), VersionConstraint::Any);
        assert_eq!(VersionConstraint::parse("^1.0"), VersionConstraint::Caret("1.0".into()));
        assert_eq!(VersionConstraint::parse("~1.2"), VersionConstraint::Tilde("1.2".into()));
        assert_eq!(
            VersionConstraint::parse(">= 2.1"),
            VersionConstraint::GreaterOrEqual("2.1".into())
        );
        assert_eq!(VersionConstraint::parse(">2"), VersionConstraint::Greater("2".into()));
        assert_eq!(VersionConstraint::parse("<=3"), VersionConstraint::LessOrEqual("3".into()));
        assert_eq!(VersionConstraint::parse("<3"), VersionConstraint::Less("3".into()));
        assert_eq!(VersionConstraint::parse("1.4.2"), VersionConstraint::Exact("1.4.2".into()));
        assert_eq!(VersionConstraint::parse("^1.0").to_string(), "^1.0");
    }

    #[test]
    fn test_caret() {
        assert!(satisfies("1.5.0", "^1.0"));
        assert!(satisfies("1.0", "^1.0"));
        assert!(!satisfies("2.0.0", "^1.0"));
        assert!(!satisfies("0.9.0", "^1.0"));
        assert!(!satisfies("1.1.0", "^1.2"));
    }

    #[test]
    fn test_tilde() {
        assert!(satisfies("1.2.9", "~1.2.3"));
        assert!(satisfies("1.2.3", "~1.2.3"));
        assert!(!satisfies("1.3.0", "~1.2.3"));
        assert!(!satisfies("1.2.2", "~1.2.3"));
        assert!(!satisfies("2.2.5", "~1.2"));
    }

    #[test]
    fn test_comparisons() {
        assert!(satisfies("2.0.0", ">=2.0.0"));
        assert!(!satisfies("1.9.9", ">=2.0.0"));
        assert!(satisfies("2.0.1", ">2.0.0"));
        assert!(!satisfies("2.0.0", ">2.0.0"));
        assert!(satisfies("2.0.0", "<=2.0.0"));
        assert!(satisfies("1.10", "<2"));
        assert!(!satisfies("2.0", "<2"));
    }

    #[test]
    fn test_exact() {
        assert!(satisfies("1.2.0", "1.2.0"));
        assert!(!satisfies("1.2.1", "1.2.0"));
        assert!(!satisfies("1.2", "1.2.0"));
    }

    #[test]
    fn test_missing_version_fails_closed() {
        assert!(!VersionConstraint::parse("^1.0").satisfied_by(None));
        assert!(!VersionConstraint::parse("1.0.0").satisfied_by(None));
        assert!(VersionConstraint::Any.satisfied_by(None));
        assert!(VersionConstraint::parse(">=1").satisfied_by(Some("3.1")));
    }
}
