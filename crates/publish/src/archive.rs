//! Packaging a module directory into a gzip-compressed tarball.
//!
//! The walk is an explicit worklist so the two ways of leaving something out
//! stay distinct: a nested `modules` directory prunes its whole subtree, while
//! a symlink, device or disallowed file only drops that one entry.

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use regex::Regex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory name that is never descended into below the archive root.
pub const NESTED_MODULES_DIR: &str = "modules";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("module source not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("module source is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid allowed files pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("failed to archive {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// A nested `modules` directory; nothing below it was visited.
    NestedModules,
    /// Symlinks, sockets, devices and the like.
    NotRegularFile,
    /// The file name did not match the allow-list.
    NotAllowed,
    /// The name is not valid UTF-8 and cannot be stored as an entry name.
    NonUtf8Name,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Path relative to the archive root, `/` separated.
    pub path: String,
    pub reason: SkipReason,
}

/// What went into an archive and what was left out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub included: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Clone, Debug)]
pub struct Archive {
    pub bytes: Bytes,
    pub summary: ArchiveSummary,
}

/// Builds module archives, keeping only files whose name matches the
/// allow-list.
#[derive(Clone, Debug)]
pub struct Archiver {
    allowed: Regex,
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl Archiver {
    pub fn new(allowed_files: &str) -> Result<Self, ArchiveError> {
        Ok(Self {
            allowed: Regex::new(allowed_files)?,
        })
    }

    /// Archive everything under `root` that passes the filters.
    ///
    /// Entry names are relative to `root`. Only regular files are written, so
    /// directories appear implicitly through their members. File modes are
    /// preserved and entries are ordered by path. This performs blocking I/O.
    pub fn build(&self, root: &Path) -> Result<Archive, ArchiveError> {
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ArchiveError::NotADirectory(root.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::NotFound(root.to_path_buf()));
            }
            Err(e) => return Err(ArchiveError::io(root, e)),
        }

        let mut summary = ArchiveSummary::default();
        let mut files = Vec::new();
        let mut pending = vec![PathBuf::new()];

        while let Some(relative_dir) = pending.pop() {
            let dir = root.join(&relative_dir);
            let entries = fs::read_dir(&dir).map_err(|e| ArchiveError::io(&dir, e))?;

            for entry in entries {
                let entry = entry.map_err(|e| ArchiveError::io(&dir, e))?;
                let relative = relative_dir.join(entry.file_name());
                // file_type() does not follow symlinks
                let file_type = entry
                    .file_type()
                    .map_err(|e| ArchiveError::io(&entry.path(), e))?;

                let file_name = entry.file_name();
                let skip = match file_name.to_str() {
                    None => Some(SkipReason::NonUtf8Name),
                    Some(NESTED_MODULES_DIR) if file_type.is_dir() => {
                        Some(SkipReason::NestedModules)
                    }
                    Some(_) if file_type.is_dir() => {
                        pending.push(relative);
                        continue;
                    }
                    Some(_) if !file_type.is_file() => Some(SkipReason::NotRegularFile),
                    Some(name) if !self.allowed.is_match(name) => Some(SkipReason::NotAllowed),
                    Some(_) => None,
                };

                // Only UTF-8 components are ever descended into or archived,
                // so the lossy form only shows up in skip reports.
                let name = entry_name(&relative);
                match skip {
                    Some(reason) => {
                        tracing::info!(path = %name, reason = ?reason, "Skipping file");
                        summary.skipped.push(SkippedEntry { path: name, reason });
                    }
                    None => files.push((name, relative)),
                }
            }
        }

        files.sort();
        summary.skipped.sort_by(|a, b| a.path.cmp(&b.path));

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, relative) in files {
            let path = root.join(&relative);
            let mut file = File::open(&path).map_err(|e| ArchiveError::io(&path, e))?;
            let metadata = file.metadata().map_err(|e| ArchiveError::io(&path, e))?;

            let mut header = tar::Header::new_gnu();
            header.set_metadata(&metadata);
            builder
                .append_data(&mut header, &name, &mut file)
                .map_err(|e| ArchiveError::io(&path, e))?;
            drop(file);

            tracing::debug!(path = %name, size = metadata.len(), "Archived file");
            summary.included.push(name);
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| ArchiveError::io(root, e))?;
        let compressed = encoder.finish().map_err(|e| ArchiveError::io(root, e))?;

        Ok(Archive {
            bytes: Bytes::from(compressed),
            summary,
        })
    }
}
