use crate::models::acl::{CannedAcl, ServerSideEncryption};
use anyhow::Result;
use clap::Parser;
use std::{env, path::PathBuf};
use thiserror::Error;

/// Prefix of the environment variables backing the settings section.
const ENV_PREFIX: &str = "BUCKET_FS_";

const DELIMITERS: &[char] = &['/'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting `BucketFileSystem:{key}`")]
    Missing { key: &'static str },
    #[error("setting `BucketFileSystem:{key}` is out of range: {reason}")]
    OutOfRange { key: &'static str, reason: String },
    #[error("setting `BucketFileSystem:{key}` is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    /// Short name of the offending setting (`Region`, `CacheMinutes`, ...).
    pub fn key(&self) -> &'static str {
        match self {
            ConfigError::Missing { key }
            | ConfigError::OutOfRange { key, .. }
            | ConfigError::Invalid { key, .. } => key,
        }
    }
}

/// Immutable bucket file-system settings, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub bucket_name: String,
    /// Public host serving bucket objects; required when virtual-path serving is off.
    pub bucket_hostname: Option<String>,
    /// Key prefix every object lives under, without surrounding delimiters.
    pub bucket_prefix: String,
    pub region: String,
    pub canned_acl: CannedAcl,
    pub server_side_encryption: ServerSideEncryption,
    pub cache_enabled: bool,
    pub cache_minutes: u32,
    pub disable_virtual_path_provider: bool,
    pub read_only: bool,
}

impl StorageConfig {
    /// Build the configuration from a key-value settings source.
    ///
    /// `lookup` receives short setting names (`BucketName`, `Region`, ...).
    /// Blank values count as missing. Boolean flags that fail to parse are
    /// treated as `false`.
    pub fn from_settings<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let flag = |key: &str| get(key).is_some_and(|value| parse_flag(&value));

        let bucket_hostname = get("BucketHostname");
        let disable_virtual_path_provider = flag("DisableVirtualPathProvider");
        let cache_enabled = flag("CacheEnabled");
        let read_only = flag("ReadOnly");

        let bucket_name = get("BucketName").ok_or(ConfigError::Missing { key: "BucketName" })?;
        let bucket_prefix =
            get("MediaPrefix").ok_or(ConfigError::Missing { key: "MediaPrefix" })?;
        let region = get("Region").ok_or(ConfigError::Missing { key: "Region" })?;

        if disable_virtual_path_provider && bucket_hostname.is_none() {
            return Err(ConfigError::Missing {
                key: "BucketHostname",
            });
        }

        let file_acl = get("FileACL").ok_or(ConfigError::Missing { key: "FileACL" })?;
        let canned_acl = file_acl
            .parse::<CannedAcl>()
            .map_err(|reason| ConfigError::Invalid {
                key: "FileACL",
                reason,
            })?;

        let server_side_encryption = match get("ServerSideEncryptionMethod") {
            Some(value) => value.parse::<ServerSideEncryption>().map_err(|reason| {
                ConfigError::Invalid {
                    key: "ServerSideEncryptionMethod",
                    reason,
                }
            })?,
            None => ServerSideEncryption::None,
        };

        let cache_minutes = get("CacheMinutes").ok_or(ConfigError::Missing {
            key: "CacheMinutes",
        })?;
        let cache_minutes =
            cache_minutes
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::OutOfRange {
                    key: "CacheMinutes",
                    reason: format!("`{}` is not a valid non-negative integer", cache_minutes),
                })?;

        let bucket_prefix = bucket_prefix.trim().trim_matches(DELIMITERS).to_string();
        if bucket_prefix.is_empty() {
            return Err(ConfigError::Missing { key: "MediaPrefix" });
        }

        Ok(Self {
            bucket_name: bucket_name.trim().to_string(),
            bucket_hostname: bucket_hostname.map(|host| host.trim().to_string()),
            bucket_prefix,
            region: region.trim().to_string(),
            canned_acl,
            server_side_encryption,
            cache_enabled,
            cache_minutes,
            disable_virtual_path_provider,
            read_only,
        })
    }

    /// How long a cached entry stays fresh.
    pub fn cache_expiry(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cache_minutes))
    }
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Environment variable backing a setting: `CacheMinutes` -> `BUCKET_FS_CACHE_MINUTES`.
pub fn env_var_name(setting: &str) -> String {
    let mut name = String::from(ENV_PREFIX);
    let mut prev_lower = false;
    for c in setting.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            name.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        name.push(c.to_ascii_uppercase());
    }
    name
}

/// Process configuration: the bucket settings plus where and how to serve them.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root directory of the local read-through cache.
    pub cache_dir: PathBuf,
    /// URL path the virtual files are served under, e.g. `/media`.
    pub mount_path: String,
    /// Use an in-process object store instead of S3.
    pub in_memory: bool,
    pub storage: StorageConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Bucket-backed file system with a local read-through cache")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_FS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BUCKET_FS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for the local read-through cache (overrides BUCKET_FS_CACHE_DIR)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// URL path virtual files are served under (overrides BUCKET_FS_MOUNT_PATH)
    #[arg(long)]
    pub mount_path: Option<String>,

    /// Bucket holding the files (overrides BUCKET_FS_BUCKET_NAME)
    #[arg(long)]
    pub bucket_name: Option<String>,

    /// Public hostname of the bucket (overrides BUCKET_FS_BUCKET_HOSTNAME)
    #[arg(long)]
    pub bucket_hostname: Option<String>,

    /// Key prefix for all files (overrides BUCKET_FS_MEDIA_PREFIX)
    #[arg(long)]
    pub media_prefix: Option<String>,

    /// Bucket region (overrides BUCKET_FS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Canned ACL applied on write (overrides BUCKET_FS_FILE_ACL)
    #[arg(long)]
    pub file_acl: Option<String>,

    /// Server-side encryption method (overrides BUCKET_FS_SERVER_SIDE_ENCRYPTION_METHOD)
    #[arg(long)]
    pub server_side_encryption_method: Option<String>,

    /// Enable the local read-through cache (overrides BUCKET_FS_CACHE_ENABLED)
    #[arg(long)]
    pub cache_enabled: Option<String>,

    /// Minutes a cached file stays fresh (overrides BUCKET_FS_CACHE_MINUTES)
    #[arg(long)]
    pub cache_minutes: Option<String>,

    /// Do not serve files under the mount path (overrides BUCKET_FS_DISABLE_VIRTUAL_PATH_PROVIDER)
    #[arg(long)]
    pub disable_virtual_path_provider: Option<String>,

    /// Report the file system as read-only (overrides BUCKET_FS_READ_ONLY)
    #[arg(long)]
    pub read_only: Option<String>,

    /// Serve from an in-process object store instead of S3 (local development)
    #[arg(long)]
    pub in_memory: bool,
}

impl Args {
    /// CLI value for a bucket setting, if one was given.
    fn setting(&self, key: &str) -> Option<String> {
        let value = match key {
            "BucketName" => &self.bucket_name,
            "BucketHostname" => &self.bucket_hostname,
            "MediaPrefix" => &self.media_prefix,
            "Region" => &self.region,
            "FileACL" => &self.file_acl,
            "ServerSideEncryptionMethod" => &self.server_side_encryption_method,
            "CacheEnabled" => &self.cache_enabled,
            "CacheMinutes" => &self.cache_minutes,
            "DisableVirtualPathProvider" => &self.disable_virtual_path_provider,
            "ReadOnly" => &self.read_only,
            _ => return None,
        };
        value.clone()
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge parsed CLI args over an environment lookup.
    pub fn from_args<E>(args: Args, env_lookup: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let env_host = env_lookup("BUCKET_FS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match env_lookup("BUCKET_FS_PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|err| anyhow::anyhow!("parsing BUCKET_FS_PORT value `{}`: {}", value, err))?,
            None => 3000,
        };
        let env_cache_dir = env_lookup("BUCKET_FS_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/cache"));
        let env_mount =
            env_lookup("BUCKET_FS_MOUNT_PATH").unwrap_or_else(|| "/media".into());

        let storage = StorageConfig::from_settings(|key| {
            args.setting(key).or_else(|| env_lookup(&env_var_name(key)))
        })?;

        Ok(Self {
            host: args.host.clone().unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            cache_dir: args.cache_dir.clone().unwrap_or(env_cache_dir),
            mount_path: normalize_mount_path(&args.mount_path.clone().unwrap_or(env_mount)),
            in_memory: args.in_memory,
            storage,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `media/` -> `/media`; an empty mount serves from the root.
fn normalize_mount_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
