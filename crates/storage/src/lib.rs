//! Module storage abstraction and backends for depot.
//!
//! This crate provides:
//! - The [`ModuleStore`] contract used by the registry and the publisher
//! - A local filesystem backend
//! - An S3-compatible backend with presigned download URLs

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::ModuleStore;

use depot_core::config::StorageConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a module store from configuration.
///
/// `extension` is the archive extension used when encoding and decoding keys.
pub async fn from_config(
    config: &StorageConfig,
    extension: &str,
) -> StorageResult<Arc<dyn ModuleStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path, base_url } => {
            let backend = FilesystemBackend::new(path)
                .await?
                .with_base_url(base_url.clone())
                .with_extension(extension);
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
            signed_url_expiry_secs,
        } => {
            let backend = S3Backend::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?
            .with_signed_url_expiry(Duration::from_secs(*signed_url_expiry_secs))
            .with_extension(extension);
            Ok(Arc::new(backend))
        }
    }
}
