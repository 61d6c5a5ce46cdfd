//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{ModuleIdentity, ModuleRecord};

/// Module storage contract.
///
/// Implementations must be safe for concurrent use from many request tasks
/// and must never overwrite an existing archive.
#[async_trait]
pub trait ModuleStore: Send + Sync + 'static {
    /// Look up one module and produce a download URL for it.
    ///
    /// Returns `StorageError::NotFound` if no archive exists for the identity.
    async fn get_module(&self, identity: &ModuleIdentity) -> StorageResult<ModuleRecord>;

    /// List every stored version of a module family.
    ///
    /// An unknown family yields an empty list. Objects under the family
    /// prefix whose keys do not decode are skipped with a warning.
    async fn list_module_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> StorageResult<Vec<ModuleRecord>>;

    /// Store an archive for a new identity.
    ///
    /// Returns `StorageError::AlreadyExists` if the identity was published
    /// before, including when a concurrent upload won the race.
    async fn upload_module(
        &self,
        identity: &ModuleIdentity,
        archive: Bytes,
    ) -> StorageResult<ModuleRecord>;

    /// Check whether an archive exists for the identity.
    async fn module_exists(&self, identity: &ModuleIdentity) -> StorageResult<bool> {
        match self.get_module(identity).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get the backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Check that the backend is reachable and usable.
    ///
    /// Called once at startup so misconfiguration is reported before the
    /// server accepts requests.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
