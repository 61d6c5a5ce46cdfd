//! Core domain types and shared logic for the depot module registry.
//!
//! This crate defines the data model used across all other crates:
//! - Module identities and their validation
//! - The storage key layout (encode and decode)
//! - Version admission filtering for publishes
//! - Configuration shared by the server and the CLI

pub mod admission;
pub mod config;
pub mod error;
pub mod identity;
pub mod key;

pub use admission::{Admission, AdmissionFilter, FilterKind, Rejection};
pub use error::{Error, Result};
pub use identity::{ModuleIdentity, ModuleRecord, parse_version};

/// Default archive extension used in storage keys.
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "tar.gz";
