//! Module identities and stored module records.

use serde::Serialize;
use std::fmt;

/// The `{namespace, name, provider, version}` tuple addressing one published
/// module archive.
///
/// Fields are validated once at construction and never change afterwards.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModuleIdentity {
    namespace: String,
    name: String,
    provider: String,
    version: String,
}

impl ModuleIdentity {
    /// Create an identity, validating every field.
    ///
    /// All violations are collected into a single
    /// [`Error::InvalidIdentity`](crate::Error::InvalidIdentity) instead of
    /// stopping at the first one.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        version: impl Into<String>,
    ) -> crate::Result<Self> {
        let identity = Self {
            namespace: namespace.into(),
            name: name.into(),
            provider: provider.into(),
            version: version.into(),
        };

        let mut problems: Vec<String> = [
            ("namespace", &identity.namespace),
            ("name", &identity.name),
            ("provider", &identity.provider),
            ("version", &identity.version),
        ]
        .into_iter()
        .filter_map(|(field, value)| segment_problem(field, value))
        .collect();

        if !identity.version.is_empty()
            && let Err(e) = parse_version(&identity.version)
        {
            problems.push(format!(
                "version {:?} is not a semantic version: {e}",
                identity.version
            ));
        }

        if problems.is_empty() {
            Ok(identity)
        } else {
            Err(crate::Error::InvalidIdentity(problems))
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The version exactly as supplied (a leading `v` is kept).
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Parsed semantic version. Construction already proved this parses.
    pub fn semver(&self) -> crate::Result<semver::Version> {
        parse_version(&self.version).map_err(|e| crate::Error::InvalidVersion {
            version: self.version.clone(),
            reason: e.to_string(),
        })
    }

    /// Whether the three family fields would pass validation.
    pub fn is_valid_family(namespace: &str, name: &str, provider: &str) -> bool {
        [namespace, name, provider]
            .into_iter()
            .all(|value| segment_problem("", value).is_none())
    }

    /// Whether two identities name the same module family (everything except
    /// the version).
    pub fn same_family(&self, namespace: &str, name: &str, provider: &str) -> bool {
        self.namespace == namespace && self.name == name && self.provider == provider
    }
}

impl fmt::Debug for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleIdentity({self})")
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.namespace, self.name, self.provider, self.version
        )
    }
}

/// Each field becomes one path segment of the storage key.
fn segment_problem(field: &str, value: &str) -> Option<String> {
    if value.is_empty() {
        Some(format!("{field} must not be empty"))
    } else if value.contains('/') {
        Some(format!("{field} must not contain '/': {value:?}"))
    } else if value == "." || value == ".." {
        Some(format!("{field} must not be {value:?}"))
    } else {
        None
    }
}

/// Parse a version string leniently.
///
/// A single leading `v` is ignored and a missing minor or patch component is
/// treated as zero, so `v1`, `1.2` and `1.2.0` are all accepted.
pub fn parse_version(raw: &str) -> Result<semver::Version, semver::Error> {
    let trimmed = raw.strip_prefix('v').unwrap_or(raw);
    match semver::Version::parse(trimmed) {
        Ok(version) => Ok(version),
        Err(err) => {
            let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
            let (core, suffix) = trimmed.split_at(split);
            let parts = core.split('.').count();
            if parts >= 3 || core.is_empty() {
                return Err(err);
            }
            let padded = format!("{core}{}{suffix}", ".0".repeat(3 - parts));
            semver::Version::parse(&padded).map_err(|_| err)
        }
    }
}

/// A module as known to a storage backend.
///
/// Listings return records without a download URL; single lookups and
/// uploads fill it in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleRecord {
    pub identity: ModuleIdentity,
    /// Where a client can fetch the archive. May be time-limited.
    pub download_url: Option<String>,
}

impl ModuleRecord {
    pub fn listed(identity: ModuleIdentity) -> Self {
        Self {
            identity,
            download_url: None,
        }
    }

    pub fn with_url(identity: ModuleIdentity, download_url: impl Into<String>) -> Self {
        Self {
            identity,
            download_url: Some(download_url.into()),
        }
    }
}
