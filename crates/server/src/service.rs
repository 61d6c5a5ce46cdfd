//! Registry queries on top of a module store.

use depot_core::{ModuleIdentity, ModuleRecord};
use depot_storage::{ModuleStore, StorageError, StorageResult};
use std::sync::Arc;

/// Answers version listings and download lookups.
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn ModuleStore>,
}

impl RegistryService {
    pub fn new(store: Arc<dyn ModuleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ModuleStore> {
        &self.store
    }

    /// Versions of a module family in ascending semver order. Unknown
    /// families yield an empty list.
    #[tracing::instrument(skip(self))]
    pub async fn list_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> StorageResult<Vec<String>> {
        // Nothing can be stored under a family that does not validate.
        if !ModuleIdentity::is_valid_family(namespace, name, provider) {
            return Ok(Vec::new());
        }

        let mut identities: Vec<ModuleIdentity> = self
            .store
            .list_module_versions(namespace, name, provider)
            .await?
            .into_iter()
            .map(|record| record.identity)
            .collect();
        identities.sort_by_cached_key(|identity| identity.semver().ok());

        Ok(identities
            .into_iter()
            .map(|identity| identity.version().to_string())
            .collect())
    }

    /// Look up one module with its download URL.
    #[tracing::instrument(skip(self))]
    pub async fn get_module(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
        version: &str,
    ) -> StorageResult<ModuleRecord> {
        // An identity that does not validate was never published.
        let identity = ModuleIdentity::new(namespace, name, provider, version).map_err(|e| {
            tracing::debug!(error = %e, "Rejecting invalid module identity");
            StorageError::NotFound(format!("{namespace}/{name}/{provider}/{version}"))
        })?;
        self.store.get_module(&identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use depot_storage::FilesystemBackend;
    use tempfile::TempDir;

    async fn service() -> (TempDir, RegistryService) {
        let dir = TempDir::new().unwrap();
        let store = FilesystemBackend::new(dir.path()).await.unwrap();
        (dir, RegistryService::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn versions_sorted_by_semver() {
        let (_dir, service) = service().await;
        for version in ["1.10.0", "1.2.0", "v1.9.0", "0.1.0", "1.2.0-rc.1"] {
            let identity = ModuleIdentity::new("ns", "vpc", "aws", version).unwrap();
            service
                .store()
                .upload_module(&identity, Bytes::from_static(b"tgz"))
                .await
                .unwrap();
        }

        let versions = service.list_versions("ns", "vpc", "aws").await.unwrap();
        assert_eq!(versions, vec!["0.1.0", "1.2.0-rc.1", "1.2.0", "v1.9.0", "1.10.0"]);
    }

    #[tokio::test]
    async fn unknown_family_is_empty() {
        let (_dir, service) = service().await;
        assert!(service.list_versions("ns", "none", "aws").await.unwrap().is_empty());
        assert!(service.list_versions("..", "..", "aws").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_identity_is_not_found() {
        let (_dir, service) = service().await;
        let err = service
            .get_module("ns", "vpc", "aws", "latest")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = service.get_module("ns", "vpc", "aws", "1.0.0").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
