//! Version admission filtering for publishes.
//!
//! A publish may be gated by a semantic version constraint, a regular
//! expression over the raw version string, or both. Both are compiled once
//! when the filter is built; a candidate must satisfy every configured filter.

use crate::identity::{ModuleIdentity, parse_version};
use crate::{Error, Result};
use regex::Regex;
use semver::VersionReq;
use std::fmt;

/// Which filter turned a version away, with the expression it was built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Semver(String),
    Pattern(String),
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Semver(expr) => write!(f, "semver constraint {expr:?}"),
            Self::Pattern(expr) => write!(f, "pattern {expr:?}"),
        }
    }
}

/// A version that was turned away by a filter. This is an expected outcome,
/// not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub filter: FilterKind,
    pub identity: ModuleIdentity,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "version {} of {}/{}/{} does not satisfy {}",
            self.identity.version(),
            self.identity.namespace(),
            self.identity.name(),
            self.identity.provider(),
            self.filter
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Clone, Debug)]
struct SemverFilter {
    expr: String,
    req: VersionReq,
}

#[derive(Clone, Debug, Default)]
pub struct AdmissionFilter {
    semver: Option<SemverFilter>,
    pattern: Option<Regex>,
}

impl AdmissionFilter {
    /// Build a filter from optional expressions. Empty strings count as absent.
    ///
    /// Fails if either expression does not compile.
    pub fn new(pattern: Option<&str>, semver: Option<&str>) -> Result<Self> {
        let pattern = match pattern.filter(|p| !p.is_empty()) {
            Some(expr) => Some(Regex::new(expr).map_err(|e| Error::InvalidConstraint {
                expr: expr.to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        let semver = match semver.filter(|s| !s.trim().is_empty()) {
            Some(expr) => Some(SemverFilter {
                expr: expr.to_string(),
                req: parse_constraints(expr)?,
            }),
            None => None,
        };

        Ok(Self { semver, pattern })
    }

    pub fn is_empty(&self) -> bool {
        self.semver.is_none() && self.pattern.is_none()
    }

    /// Check a raw version string.
    ///
    /// Returns the filter that rejected it, or `None` when it is admitted.
    /// A version that cannot be parsed while a semver constraint is active is
    /// an error rather than a rejection.
    pub fn check_version(&self, version: &str) -> Result<Option<FilterKind>> {
        if let Some(filter) = &self.semver {
            let parsed = parse_version(version).map_err(|e| Error::InvalidVersion {
                version: version.to_string(),
                reason: e.to_string(),
            })?;
            if !filter.req.matches(&parsed) {
                return Ok(Some(FilterKind::Semver(filter.expr.clone())));
            }
        }

        if let Some(pattern) = &self.pattern
            && !pattern.is_match(version)
        {
            return Ok(Some(FilterKind::Pattern(pattern.as_str().to_string())));
        }

        Ok(None)
    }

    /// Decide whether an identity may be published.
    pub fn check(&self, identity: &ModuleIdentity) -> Result<Admission> {
        Ok(match self.check_version(identity.version())? {
            None => Admission::Admitted,
            Some(filter) => Admission::Rejected(Rejection {
                filter,
                identity: identity.clone(),
            }),
        })
    }
}

/// Parse a comma separated constraint list.
///
/// Operators follow the conventions module authors already use: a bare
/// version means exactly that version and `~>` allows the rightmost given
/// component to increase (`~> 1.2` is `>=1.2.0, <2.0.0`, `~> 1.2.3` is
/// `>=1.2.3, <1.3.0`). Everything else is handed to [`VersionReq`].
fn parse_constraints(expr: &str) -> Result<VersionReq> {
    let invalid = |reason: String| Error::InvalidConstraint {
        expr: expr.to_string(),
        reason,
    };

    let mut comparators = Vec::new();
    for part in expr.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(invalid("empty constraint".to_string()));
        }

        if let Some(rest) = part.strip_prefix("~>") {
            let rest = rest.trim();
            let base = parse_version(rest).map_err(|e| invalid(e.to_string()))?;
            let given = rest
                .split(['-', '+'])
                .next()
                .unwrap_or(rest)
                .split('.')
                .count();
            comparators.push(format!(">={base}"));
            match given {
                0 | 1 => {}
                2 => comparators.push(format!("<{}.0.0", base.major + 1)),
                _ => comparators.push(format!("<{}.{}.0", base.major, base.minor + 1)),
            }
        } else if part.starts_with(|c: char| c.is_ascii_digit() || c == 'v') {
            let exact = parse_version(part).map_err(|e| invalid(e.to_string()))?;
            comparators.push(format!("={exact}"));
        } else {
            comparators.push(part.to_string());
        }
    }

    VersionReq::parse(&comparators.join(", ")).map_err(|e| invalid(e.to_string()))
}
