//! Storage key layout for module archives.
//!
//! A module is stored at
//! `<prefix>/modules/<namespace>/<name>/<provider>/<namespace>-<name>-<provider>-<version>.<ext>`.
//! Encoding is pure string assembly. Decoding recovers the identity from a key
//! and fails with a descriptive error instead of guessing.

use crate::identity::ModuleIdentity;
use crate::{Error, Result};

/// Fixed directory segment separating the configurable prefix from the
/// module tree.
pub const MODULES_SEGMENT: &str = "modules";

fn join<'a>(prefix: &'a str, rest: impl IntoIterator<Item = &'a str>) -> String {
    prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .chain(rest)
        .collect::<Vec<_>>()
        .join("/")
}

/// File name of a module archive inside its family directory.
pub fn file_name(identity: &ModuleIdentity, extension: &str) -> String {
    format!(
        "{}-{}-{}-{}.{}",
        identity.namespace(),
        identity.name(),
        identity.provider(),
        identity.version(),
        extension
    )
}

/// Directory holding every version of one module family (no trailing slash).
pub fn module_prefix(prefix: &str, namespace: &str, name: &str, provider: &str) -> String {
    join(prefix, [MODULES_SEGMENT, namespace, name, provider])
}

/// Compute the storage key for an identity.
pub fn encode(prefix: &str, identity: &ModuleIdentity, extension: &str) -> String {
    let file = file_name(identity, extension);
    join(
        prefix,
        [
            MODULES_SEGMENT,
            identity.namespace(),
            identity.name(),
            identity.provider(),
            file.as_str(),
        ],
    )
}

/// Recover an identity from a storage key.
///
/// The first `modules` directory segment marks the start of the module tree;
/// exactly three directory segments (namespace, name, provider) must follow
/// it. Keys stored under a prefix that itself contains a `modules` segment
/// should have that prefix stripped before decoding.
pub fn decode(key: &str, extension: &str) -> Result<ModuleIdentity> {
    let segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    let Some((file, dirs)) = segments.split_last() else {
        return Err(Error::InvalidKey("key is empty".to_string()));
    };

    let marker = dirs
        .iter()
        .position(|segment| *segment == MODULES_SEGMENT)
        .ok_or_else(|| {
            Error::InvalidKey(format!(
                "expected a \"{MODULES_SEGMENT}\" directory in {key:?}"
            ))
        })?;

    let [namespace, name, provider] = &dirs[marker + 1..] else {
        return Err(Error::InvalidKey(format!(
            "expected 3 directory parts after \"{MODULES_SEGMENT}\", but was {}",
            dirs.len() - marker - 1
        )));
    };

    let suffix = format!(".{extension}");
    let stem = file.strip_suffix(&suffix).ok_or_else(|| {
        Error::InvalidKey(format!(
            "expected file extension \"{extension}\" but file is \"{file}\""
        ))
    })?;

    let expected = format!("{namespace}-{name}-{provider}-");
    let version = stem.strip_prefix(&expected).ok_or_else(|| {
        Error::InvalidKey(format!(
            "expected file prefix \"{expected}\" but file is \"{file}\""
        ))
    })?;

    if version.is_empty() {
        return Err(Error::InvalidKey(format!(
            "could not parse version from \"{file}\""
        )));
    }

    ModuleIdentity::new(*namespace, *name, *provider, version)
        .map_err(|e| Error::InvalidKey(format!("{key:?} does not name a valid module: {e}")))
}
