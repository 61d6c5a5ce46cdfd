//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::ModuleStore;
use async_trait::async_trait;
use bytes::Bytes;
use depot_core::{DEFAULT_ARCHIVE_EXTENSION, ModuleIdentity, ModuleRecord, key};
use percent_encoding::{AsciiSet, CONTROLS, percent_encode};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Suffix of in-flight upload files. They never decode as module keys.
const TEMP_SUFFIX: &str = ".partial";

/// Bytes that cannot appear literally in the path of a `file://` URL.
const FILE_URL_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Module store rooted at a local directory.
///
/// Keys map one-to-one onto relative paths below the root. Uploads are
/// written to a temporary file and published with a hard link, which fails
/// if the target already exists, so two racing uploads cannot both succeed.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
    base_url: Option<String>,
    extension: String,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).await?;
        let root = fs::canonicalize(root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;
        Ok(Self {
            root,
            base_url: None,
            extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
        })
    }

    /// Serve download URLs from `base_url` instead of `file://` paths.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Resolve a key below the root without blocking the runtime.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Only plain path components are accepted and no existing ancestor may
    /// resolve outside the root (a symlinked directory, for instance).
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let path = root.join(key);
        let mut ancestor = path.as_path();
        while let Some(parent) = ancestor.parent() {
            match std::fs::canonicalize(parent) {
                Ok(resolved) => {
                    if !resolved.starts_with(root) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => ancestor = parent,
                Err(e) => return Err(StorageError::Io(e)),
            }
        }

        Ok(path)
    }

    fn download_url(&self, key: &str, path: &Path) -> String {
        match &self.base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!(
                "file://{}",
                percent_encode(path.as_os_str().as_encoded_bytes(), FILE_URL_PATH)
            ),
        }
    }

    fn record(&self, identity: &ModuleIdentity, key: &str, path: &Path) -> ModuleRecord {
        ModuleRecord::with_url(identity.clone(), self.download_url(key, path))
    }
}

#[async_trait]
impl ModuleStore for FilesystemBackend {
    #[instrument(skip(self, identity), fields(backend = "filesystem", module = %identity))]
    async fn get_module(&self, identity: &ModuleIdentity) -> StorageResult<ModuleRecord> {
        let key = key::encode("", identity, &self.extension);
        let path = self.key_path(&key).await?;

        match fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(self.record(identity, &key, &path)),
            Ok(_) => Err(StorageError::NotFound(key)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(key)),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_module_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> StorageResult<Vec<ModuleRecord>> {
        let prefix = key::module_prefix("", namespace, name, provider);
        let dir = self.key_path(&prefix).await?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::list_failed(prefix, e)),
        };

        let mut records = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(StorageError::list_failed(prefix, e)),
            };

            // file_type() does not follow symlinks
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| StorageError::list_failed(prefix.clone(), e))?
                .is_file();
            if !is_file {
                continue;
            }

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };

            let object_key = format!("{prefix}/{file_name}");
            match key::decode(&object_key, &self.extension) {
                Ok(identity) if identity.same_family(namespace, name, provider) => {
                    records.push(ModuleRecord::listed(identity));
                }
                Ok(identity) => {
                    tracing::warn!(key = %object_key, module = %identity, "Skipping key from another module");
                }
                Err(_) if file_name.ends_with(TEMP_SUFFIX) => {}
                Err(e) => {
                    tracing::warn!(key = %object_key, error = %e, "Skipping undecodable key");
                }
            }
        }

        Ok(records)
    }

    #[instrument(
        skip(self, identity, archive),
        fields(backend = "filesystem", module = %identity, size = archive.len())
    )]
    async fn upload_module(
        &self,
        identity: &ModuleIdentity,
        archive: Bytes,
    ) -> StorageResult<ModuleRecord> {
        let key = key::encode("", identity, &self.extension);
        let path = self.key_path(&key).await?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(format!("key has no parent: {key}")))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::upload_failed(&key, e))?;

        let temp_path = parent.join(format!(".{}{TEMP_SUFFIX}", Uuid::new_v4()));
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&archive).await?;
            file.sync_all().await
        }
        .await;

        let published = match written {
            Ok(()) => fs::hard_link(&temp_path, &path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = fs::remove_file(&temp_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove temp file");
        }

        match published {
            Ok(()) => {
                tracing::debug!(key = %key, "Module stored");
                Ok(self.record(identity, &key, &path))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(key))
            }
            Err(e) => Err(StorageError::upload_failed(key, e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
