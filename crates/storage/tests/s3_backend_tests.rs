//! Storage contract exercised against MinIO.
//!
//! Needs a container runtime. Set `SKIP_S3_TESTS` to skip.

mod common;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use bytes::Bytes;
use common::*;
use depot_storage::{ModuleStore, S3Backend};
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::{ContainerAsync, GenericImage, ImageExt, runners::AsyncRunner};

const MINIO_IMAGE: &str = "minio/minio";
const MINIO_TAG: &str = "RELEASE.2024-02-12T21-36-45Z";
const BUCKET: &str = "depot-test";

fn should_skip_s3_tests() -> bool {
    std::env::var("SKIP_S3_TESTS").is_ok()
}

struct MinioContext {
    _container: ContainerAsync<GenericImage>,
    endpoint: String,
    access_key: String,
    secret_key: String,
}

impl MinioContext {
    async fn new() -> Result<Self, String> {
        let access_key = "minio-access-key".to_string();
        let secret_key = "minio-secret-key".to_string();

        let container: ContainerAsync<GenericImage> = GenericImage::new(MINIO_IMAGE, MINIO_TAG)
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("API:"))
            .with_env_var("MINIO_ROOT_USER", access_key.clone())
            .with_env_var("MINIO_ROOT_PASSWORD", secret_key.clone())
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .map_err(|e| format!("failed to start MinIO container: {e}"))?;

        let host = container
            .get_host()
            .await
            .map_err(|e| format!("failed to get host: {e}"))?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .map_err(|e| format!("failed to get port: {e}"))?;

        Ok(Self {
            _container: container,
            endpoint: format!("http://{host}:{port}"),
            access_key,
            secret_key,
        })
    }

    fn client(&self) -> Client {
        let credentials = Credentials::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            None,
            None,
            "test",
        );
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(credentials)
            .http_client(aws_smithy_http_client::Builder::new().build_http())
            .endpoint_url(self.endpoint.clone())
            .force_path_style(true)
            .build();
        Client::from_conf(config)
    }

    async fn create_bucket(&self) -> Result<(), String> {
        self.client()
            .create_bucket()
            .bucket(BUCKET)
            .send()
            .await
            .map_err(|e| format!("failed to create bucket: {e}"))?;
        Ok(())
    }
}

struct S3TestHarness {
    context: MinioContext,
    backend: S3Backend,
}

impl S3TestHarness {
    async fn new(prefix: Option<&str>) -> Result<Self, String> {
        let context = MinioContext::new().await?;
        context.create_bucket().await?;

        let backend = S3Backend::new(
            BUCKET,
            Some(context.endpoint.clone()),
            Some("us-east-1".to_string()),
            prefix.map(str::to_string),
            Some(context.access_key.clone()),
            Some(context.secret_key.clone()),
            true,
        )
        .await
        .map_err(|e| format!("failed to create S3 backend: {e}"))?
        .with_signed_url_expiry(Duration::from_secs(60));

        Ok(Self { context, backend })
    }
}

macro_rules! harness {
    ($prefix:expr) => {{
        if should_skip_s3_tests() {
            return;
        }
        match S3TestHarness::new($prefix).await {
            Ok(harness) => harness,
            Err(err) => {
                eprintln!("Skipping S3 test: {err}");
                return;
            }
        }
    }};
}

#[tokio::test]
async fn test_s3_contract() {
    let harness = harness!(Some("registry"));
    let store: &dyn ModuleStore = &harness.backend;

    store.health_check().await.unwrap();
    second_upload_is_refused(store).await;
    unknown_family_lists_empty(store).await;
    missing_module_is_not_found(store).await;
    listing_is_scoped_to_family(store).await;
    get_returns_download_url(store).await;
}

#[tokio::test]
async fn test_s3_keys_live_under_prefix() {
    let harness = harness!(Some("/registry/"));
    let module = id("acme", "vpc", "aws", "1.0.0");

    let record = harness
        .backend
        .upload_module(&module, Bytes::from_static(b"archive"))
        .await
        .unwrap();
    let url = record.download_url.unwrap();
    assert!(
        url.contains("/depot-test/registry/modules/acme/vpc/aws/acme-vpc-aws-1.0.0.tar.gz?"),
        "{url}"
    );

    let head = harness
        .context
        .client()
        .head_object()
        .bucket(BUCKET)
        .key("registry/modules/acme/vpc/aws/acme-vpc-aws-1.0.0.tar.gz")
        .send()
        .await
        .unwrap();
    assert_eq!(head.content_length(), Some(7));
}

#[tokio::test]
async fn test_s3_listing_skips_foreign_objects() {
    let harness = harness!(None);
    let client = harness.context.client();

    for key in [
        "modules/acme/vpc/aws/acme-vpc-aws-1.0.0.tar.gz",
        "modules/acme/vpc/aws/README.md",
        "modules/acme/vpc/aws/other-vpc-aws-2.0.0.tar.gz",
    ] {
        client
            .put_object()
            .bucket(BUCKET)
            .key(key)
            .body(Bytes::from_static(b"x").into())
            .send()
            .await
            .unwrap();
    }

    let listed = harness
        .backend
        .list_module_versions("acme", "vpc", "aws")
        .await
        .unwrap();
    let versions: Vec<&str> = listed.iter().map(|r| r.identity.version()).collect();
    assert_eq!(versions, vec!["1.0.0"]);
}
