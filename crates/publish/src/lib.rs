//! Publishing modules into a depot store.
//!
//! This crate provides:
//! - The [`Archiver`], which packages a module directory into a tarball
//! - The [`Publisher`], which runs admission, existence checks, archiving and
//!   upload in order

pub mod archive;
pub mod publish;

pub use archive::{Archive, ArchiveError, ArchiveSummary, Archiver, SkipReason, SkippedEntry};
pub use publish::{PublishError, PublishOutcome, Publisher};
