//! S3-compatible storage backend using AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::ModuleStore;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::future::ProvideCredentials as ProvideCredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_smithy_http_client::Builder as SmithyHttpClientBuilder;
use bytes::Bytes;
use depot_core::{DEFAULT_ARCHIVE_EXTENSION, ModuleIdentity, ModuleRecord, key};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::instrument;

/// Default lifetime of presigned download URLs.
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(30);

/// Marker carried by lazy credential errors so they surface as configuration
/// problems rather than opaque transport failures.
const CREDENTIALS_ERROR_MARKER: &str = "depot-s3-lazy-credentials";

type DefaultChain = aws_config::default_provider::credentials::DefaultCredentialsChain;

/// Builds the AWS default credentials chain on the first signed request
/// instead of at construction, so constructing a backend has no side effects.
#[derive(Debug)]
struct LazyDefaultCredentialsProvider {
    region: String,
    chain: OnceCell<DefaultChain>,
}

impl LazyDefaultCredentialsProvider {
    fn new(region: String) -> Self {
        Self {
            region,
            chain: OnceCell::new(),
        }
    }

    async fn credentials(&self) -> aws_credential_types::provider::Result {
        let chain = self
            .chain
            .get_or_try_init(|| async {
                let region = aws_config::Region::new(self.region.clone());
                tokio::task::spawn(async move { DefaultChain::builder().region(region).build().await })
                    .await
                    .map_err(|e| {
                        CredentialsError::provider_error(format!(
                            "{CREDENTIALS_ERROR_MARKER}: failed to build default credential chain: {e}"
                        ))
                    })
            })
            .await?;

        chain.provide_credentials().await.map_err(|e| {
            CredentialsError::provider_error(format!(
                "{CREDENTIALS_ERROR_MARKER}: default credential resolution failed: {e}"
            ))
        })
    }
}

impl ProvideCredentials for LazyDefaultCredentialsProvider {
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFuture<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFuture::new(self.credentials())
    }
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

fn map_s3_operation_error<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if err.to_string().contains(CREDENTIALS_ERROR_MARKER) {
        return StorageError::Config(
            "S3 credential initialization failed. Configure access_key_id/secret_access_key or provide ambient AWS credentials."
                .to_string(),
        );
    }
    StorageError::S3(Box::new(err))
}

/// S3-compatible module store.
///
/// Downloads are served through presigned GET URLs. Uploads use a
/// conditional put (`If-None-Match: *`) so the bucket itself refuses to
/// overwrite an existing archive.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    endpoint: Option<String>,
    region: String,
    signed_url_expiry: Duration,
    extension: String,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("signed_url_expiry", &self.signed_url_expiry)
            .finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// # Arguments
    /// * `endpoint` - Custom endpoint (MinIO and friends). Bare `host:port`
    ///   values are treated as plain HTTP.
    /// * `force_path_style` - Use `endpoint/bucket/key` URLs instead of
    ///   `bucket.endpoint/key`. Required by most S3-compatible services.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()));

        builder = match (access_key_id, secret_access_key) {
            (Some(key_id), Some(secret)) => builder.credentials_provider(
                aws_sdk_s3::config::Credentials::new(key_id, secret, None, None, "depot-config"),
            ),
            _ => builder.credentials_provider(LazyDefaultCredentialsProvider::new(region.clone())),
        };

        let endpoint = endpoint.map(|url| {
            let lower = url.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                url
            } else {
                format!("http://{url}")
            }
        });

        if let Some(url) = &endpoint {
            builder = builder.endpoint_url(url);
            // Plain HTTP endpoints get an HTTP-only client so startup does not
            // depend on native trust roots.
            if url.to_ascii_lowercase().starts_with("http://") {
                builder = builder.http_client(SmithyHttpClientBuilder::new().build_http());
            }
        }

        if force_path_style {
            builder = builder.force_path_style(true);
        }

        let prefix = prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix,
            endpoint,
            region,
            signed_url_expiry: DEFAULT_SIGNED_URL_EXPIRY,
            extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
        })
    }

    pub fn with_signed_url_expiry(mut self, expiry: Duration) -> Self {
        self.signed_url_expiry = expiry;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    /// Full object key for an identity, including the configured prefix.
    fn object_key(&self, identity: &ModuleIdentity) -> String {
        key::encode(self.prefix(), identity, &self.extension)
    }

    /// Strip the configured prefix from a full object key so it can be
    /// decoded independently of whatever the prefix contains.
    fn strip_prefix<'a>(&self, full_key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(full_key),
            None => full_key,
        }
    }

    async fn exists(&self, object_key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if status_of(&err) == Some(404) => Ok(false),
            Err(err) => Err(map_s3_operation_error(err)),
        }
    }

    async fn presign(&self, object_key: &str) -> StorageResult<String> {
        let presign_err = |reason: String| StorageError::Presign {
            key: object_key.to_string(),
            reason,
        };

        let config =
            PresigningConfig::expires_in(self.signed_url_expiry).map_err(|e| presign_err(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(object_key)
            .presigned(config)
            .await
            .map_err(|e| presign_err(e.to_string()))?;

        Ok(request.uri().to_string())
    }

    fn record(&self, identity: &ModuleIdentity, url: String) -> ModuleRecord {
        ModuleRecord::with_url(identity.clone(), url)
    }
}

#[async_trait]
impl ModuleStore for S3Backend {
    #[instrument(skip(self, identity), fields(backend = "s3", module = %identity))]
    async fn get_module(&self, identity: &ModuleIdentity) -> StorageResult<ModuleRecord> {
        let object_key = self.object_key(identity);
        if !self.exists(&object_key).await? {
            return Err(StorageError::NotFound(object_key));
        }
        let url = self.presign(&object_key).await?;
        Ok(self.record(identity, url))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list_module_versions(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> StorageResult<Vec<ModuleRecord>> {
        // Trailing slash keeps `aws` from also matching `aws-legacy`.
        let list_prefix = format!(
            "{}/",
            key::module_prefix(self.prefix(), namespace, name, provider)
        );
        let mut records = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&list_prefix);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|err| {
                match map_s3_operation_error(err) {
                    StorageError::S3(source) => StorageError::list_failed(&list_prefix, source),
                    other => other,
                }
            })?;

            for object_key in output.contents().iter().filter_map(|obj| obj.key()) {
                let relative = self.strip_prefix(object_key);
                match key::decode(relative, &self.extension) {
                    Ok(identity) if identity.same_family(namespace, name, provider) => {
                        records.push(ModuleRecord::listed(identity));
                    }
                    Ok(identity) => {
                        tracing::warn!(key = %object_key, module = %identity, "Skipping key from another module");
                    }
                    Err(e) => {
                        tracing::warn!(key = %object_key, error = %e, "Skipping undecodable key");
                    }
                }
            }

            if output.is_truncated() == Some(true) {
                continuation_token = output.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(records)
    }

    #[instrument(
        skip(self, identity, archive),
        fields(backend = "s3", module = %identity, size = archive.len())
    )]
    async fn upload_module(
        &self,
        identity: &ModuleIdentity,
        archive: Bytes,
    ) -> StorageResult<ModuleRecord> {
        let object_key = self.object_key(identity);

        // Not every S3-compatible service honours If-None-Match on PUT, so
        // check first and let the conditional put close the remaining race
        // where it is supported.
        if self.exists(&object_key).await? {
            return Err(StorageError::AlreadyExists(object_key));
        }

        match self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .if_none_match("*")
            .body(archive.into())
            .send()
            .await
        {
            Ok(_) => {}
            // 412 Precondition Failed, or 409 when a concurrent conditional
            // write is still in progress.
            Err(err) if matches!(status_of(&err), Some(412) | Some(409)) => {
                return Err(StorageError::AlreadyExists(object_key));
            }
            Err(err) => {
                return Err(match map_s3_operation_error(err) {
                    StorageError::S3(source) => StorageError::upload_failed(&object_key, source),
                    other => other,
                });
            }
        }

        tracing::debug!(key = %object_key, "Module stored");
        let url = self.presign(&object_key).await?;
        Ok(self.record(identity, url))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

        let probe = self.client.head_bucket().bucket(&self.bucket).send();
        tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe)
            .await
            .map_err(|_| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "S3 health check timed out after 10 seconds",
                ))
            })?
            .map(|_| ())
            .map_err(map_s3_operation_error)
    }
}
