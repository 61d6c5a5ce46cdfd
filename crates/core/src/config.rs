//! Configuration types shared across crates.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file read when no other path is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/depot.toml";

/// Prefix of environment variables that override file settings. Nested keys
/// are separated by `__`, e.g. `DEPOT_STORAGE__BUCKET`.
pub const ENV_PREFIX: &str = "DEPOT_";

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5601").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How long in-flight requests may run after a shutdown signal before
    /// connections are dropped.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:5601".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        /// Base URL under which the root directory is served. Download URLs
        /// are `file://` URLs when unset.
        #[serde(default)]
        base_url: Option<String>,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient AWS credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient AWS credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
        /// Lifetime of presigned download URLs.
        #[serde(default = "default_signed_url_expiry_secs")]
        signed_url_expiry_secs: u64,
    },
}

fn default_signed_url_expiry_secs() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/modules"),
            base_url: None,
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                signed_url_expiry_secs,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a bucket".to_string());
                }
                if *signed_url_expiry_secs == 0 {
                    return Err("s3 signed_url_expiry_secs must be greater than zero".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem storage requires a path".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Archive construction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Extension appended to archive keys.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Regular expression a file name must match to be packaged.
    #[serde(default = "default_allowed_files")]
    pub allowed_files: String,
}

fn default_extension() -> String {
    crate::DEFAULT_ARCHIVE_EXTENSION.to_string()
}

fn default_allowed_files() -> String {
    DEFAULT_ALLOWED_FILES.to_string()
}

/// Terraform sources, templates, the readme and the license.
pub const DEFAULT_ALLOWED_FILES: &str = r"^(.*\.(tf|tf\.json|tftpl)|README(\.md)?|LICENSE)$";

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            allowed_files: default_allowed_files(),
        }
    }
}

impl ArchiveConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.extension.is_empty() || self.extension.contains('/') {
            return Err(format!(
                "archive extension must be non-empty and contain no '/': {:?}",
                self.extension
            ));
        }
        regex::Regex::new(&self.allowed_files)
            .map(|_| ())
            .map_err(|e| format!("archive allowed_files is not a valid regex: {e}"))
    }
}

/// Access control configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer tokens accepted by the static provider. Entries may pack
    /// several tokens separated by commas, and a single comma separated
    /// string is accepted in place of a list. Tokens are not trimmed. No
    /// tokens means open access.
    #[serde(default, deserialize_with = "string_or_list")]
    pub static_tokens: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(value) => vec![value],
        StringOrList::Many(values) => values,
    })
}

/// OAuth client settings advertised through service discovery so `terraform
/// login` can obtain tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginConfig {
    /// OAuth client ID.
    pub client: String,
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<String>,
    /// Authorization endpoint URL.
    pub authz: String,
    /// Token endpoint URL.
    pub token: String,
    /// Local port range the CLI may listen on for the redirect.
    #[serde(default = "default_ports")]
    pub ports: [u16; 2],
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_grant_types() -> Vec<String> {
    vec!["authz_code".to_string()]
}

fn default_ports() -> [u16; 2] {
    [10000, 10010]
}

impl LoginConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.client.is_empty() || self.authz.is_empty() || self.token.is_empty() {
            return Err("login config requires client, authz and token".to_string());
        }
        if self.ports[0] > self.ports[1] {
            return Err(format!(
                "login port range is inverted: {}..{}",
                self.ports[0], self.ports[1]
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Archive settings.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Access control.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Login block for service discovery (optional).
    #[serde(default)]
    pub login: Option<LoginConfig>,
}

impl AppConfig {
    /// Create a test configuration rooted at the given storage directory.
    ///
    /// **For testing only.** Open access, default archive settings.
    pub fn for_testing(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::Filesystem {
                path: storage_path.into(),
                base_url: None,
            },
            ..Default::default()
        }
    }

    /// Validate every section, reporting all problems at once.
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();
        if let Err(e) = self.storage.validate() {
            problems.push(e);
        }
        if let Err(e) = self.archive.validate() {
            problems.push(e);
        }
        if let Some(login) = &self.login
            && let Err(e) = login.validate()
        {
            problems.push(e);
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

/// Load configuration from an optional TOML file overlaid with `DEPOT_`
/// environment variables. A missing file is not an error.
pub fn load(path: &Path) -> Result<AppConfig, Box<figment::Error>> {
    let mut figment = Figment::new();
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5601");
        assert_eq!(config.server.shutdown_grace(), Duration::from_secs(10));
        assert_eq!(config.archive.extension, "tar.gz");
        assert_eq!(config.archive.allowed_files, DEFAULT_ALLOWED_FILES);
        assert!(config.auth.static_tokens.is_empty());
        assert!(config.login.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_config_s3_defaults() {
        let json = r#"{"type":"s3","bucket":"modules","endpoint":"minio:9000"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        match config {
            StorageConfig::S3 {
                force_path_style,
                signed_url_expiry_secs,
                prefix,
                ..
            } => {
                assert!(!force_path_style);
                assert_eq!(signed_url_expiry_secs, 30);
                assert!(prefix.is_none());
            }
            _ => panic!("expected S3 config"),
        }
    }

    #[test]
    fn test_storage_config_s3_validate() {
        let s3 = |access: Option<&str>, secret: Option<&str>, expiry: u64| StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: access.map(str::to_string),
            secret_access_key: secret.map(str::to_string),
            force_path_style: false,
            signed_url_expiry_secs: expiry,
        };
        assert!(s3(Some("a"), None, 30).validate().is_err());
        assert!(s3(None, Some("s"), 30).validate().is_err());
        assert!(s3(Some("a"), Some("s"), 0).validate().is_err());
        assert!(s3(Some("a"), Some("s"), 30).validate().is_ok());
        assert!(s3(None, None, 30).validate().is_ok());
    }

    #[test]
    fn test_static_tokens_accept_string_or_list() {
        let one: AuthConfig = serde_json::from_str(r#"{"static_tokens":"abc,def"}"#).unwrap();
        assert_eq!(one.static_tokens, vec!["abc,def".to_string()]);

        let many: AuthConfig = serde_json::from_str(r#"{"static_tokens":["abc","def"]}"#).unwrap();
        assert_eq!(many.static_tokens, vec!["abc".to_string(), "def".to_string()]);
    }

    #[test]
    fn test_login_defaults_and_validation() {
        let json = r#"{"client":"terraform","authz":"https://idp/authz","token":"https://idp/token"}"#;
        let login: LoginConfig = serde_json::from_str(json).unwrap();
        assert_eq!(login.grant_types, vec!["authz_code".to_string()]);
        assert_eq!(login.ports, [10000, 10010]);
        assert!(login.scopes.is_empty());
        assert!(login.validate().is_ok());

        let inverted = LoginConfig {
            ports: [10010, 10000],
            ..login
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_validate_collects_problems() {
        let config = AppConfig {
            archive: ArchiveConfig {
                extension: String::new(),
                allowed_files: "(".to_string(),
            },
            ..AppConfig::for_testing("/tmp/depot")
        };
        // Extension is checked first and short-circuits the archive section.
        let err = config.validate().unwrap_err();
        assert!(err.contains("archive extension"), "{err}");

        let config = AppConfig {
            archive: ArchiveConfig {
                extension: "zip".to_string(),
                allowed_files: "(".to_string(),
            },
            ..AppConfig::for_testing("/tmp/depot")
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("allowed_files"), "{err}");
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"

[storage]
type = "s3"
bucket = "registry"
prefix = "prod"
force_path_style = true

[archive]
extension = "zip"

[auth]
static_tokens = ["abc", "def,ghi"]

[login]
client = "terraform-cli"
authz = "https://idp.example.com/authorize"
token = "https://idp.example.com/token"
scopes = ["openid"]
"#,
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.archive.extension, "zip");
        assert_eq!(config.auth.static_tokens.len(), 2);
        assert!(matches!(
            config.storage,
            StorageConfig::S3 { ref bucket, force_path_style: true, .. } if bucket == "registry"
        ));
        let login = config.login.unwrap();
        assert_eq!(login.scopes, vec!["openid".to_string()]);
        assert_eq!(login.ports, [10000, 10010]);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.archive.extension, "tar.gz");
    }
}
