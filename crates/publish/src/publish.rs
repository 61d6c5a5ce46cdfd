//! The publish flow: admission, existence check, archive, upload.

use crate::archive::{ArchiveError, Archiver};
use depot_core::{Admission, AdmissionFilter, ModuleIdentity, ModuleRecord, Rejection};
use depot_storage::{ModuleStore, StorageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    /// The version could not be evaluated against the configured constraints.
    #[error("version admission failed: {0}")]
    Admission(#[from] depot_core::Error),

    #[error("module already exists: {0}")]
    AlreadyExists(ModuleIdentity),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug)]
pub enum PublishOutcome {
    Published(ModuleRecord),
    /// Turned away by the admission filter. Nothing was archived or uploaded.
    Skipped(Rejection),
}

/// Publishes module directories to a store.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ModuleStore>,
    filter: AdmissionFilter,
    archiver: Archiver,
}

impl Publisher {
    pub fn new(store: Arc<dyn ModuleStore>, filter: AdmissionFilter, archiver: Archiver) -> Self {
        Self {
            store,
            filter,
            archiver,
        }
    }

    /// Publish the contents of `source` as `identity`.
    ///
    /// Existing versions are never replaced. If another publisher uploads
    /// the same identity between the existence check and the upload, the
    /// store's overwrite refusal surfaces as [`PublishError::AlreadyExists`].
    #[tracing::instrument(skip(self, source), fields(module = %identity, source = %source.display()))]
    pub async fn publish(
        &self,
        source: &Path,
        identity: &ModuleIdentity,
    ) -> Result<PublishOutcome, PublishError> {
        if let Admission::Rejected(rejection) = self.filter.check(identity)? {
            tracing::info!(filter = %rejection.filter, "Version not admitted, skipping publish");
            return Ok(PublishOutcome::Skipped(rejection));
        }

        if self.store.module_exists(identity).await? {
            return Err(PublishError::AlreadyExists(identity.clone()));
        }

        let archiver = self.archiver.clone();
        let root: PathBuf = source.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || archiver.build(&root)).await??;
        tracing::info!(
            files = archive.summary.included.len(),
            skipped = archive.summary.skipped.len(),
            size = archive.bytes.len(),
            "Module archived"
        );

        let record = match self.store.upload_module(identity, archive.bytes).await {
            Ok(record) => record,
            Err(StorageError::AlreadyExists(_)) => {
                return Err(PublishError::AlreadyExists(identity.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            backend = self.store.backend_name(),
            download_url = record.download_url.as_deref().unwrap_or_default(),
            "Module published"
        );
        Ok(PublishOutcome::Published(record))
    }
}
