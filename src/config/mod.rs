//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "content-cache";
const ENV_PREFIX: &str = "CONTENT_CACHE";
const DEFAULT_MINIO_ENDPOINT: &str = "http://127.0.0.1:9000";
const DEFAULT_MINIO_REGION: &str = "us-east-1";
const DEFAULT_BUCKET: &str = "content";
const DEFAULT_ASSET_FOLDER: &str = "assets";
const DEFAULT_CACHE_CAPACITY: usize = 4096;
const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 15;

/// Command-line arguments for the content cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "content-cache",
    version,
    about = "Notification-driven cache over a Minio content bucket"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CONTENT_CACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Populate the cache and keep it in sync with bucket notifications.
    Serve(Box<ServeArgs>),
    /// Resolve one document through the cache and print it as JSON.
    Fetch(FetchArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub minio: MinioOverrides,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the maximum number of cached entries.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,

    /// Override the delay before resubscribing to bucket notifications.
    #[arg(long = "cache-reconnect-backoff-seconds", value_name = "SECONDS")]
    pub cache_reconnect_backoff_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MinioOverrides {
    /// Override the Minio endpoint URL.
    #[arg(long = "minio-endpoint", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Override the content bucket name.
    #[arg(long = "storage-bucket", value_name = "NAME")]
    pub bucket: Option<String>,

    /// Override the public address used when rewriting asset links.
    #[arg(long = "storage-external-address", value_name = "URL")]
    pub external_address: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub minio: MinioOverrides,

    /// Document field (content|apiSpec|openApiSpec|asyncApiSpec|odataSpec).
    #[arg(value_name = "FIELD")]
    pub field: String,

    /// Object kind, the first segment of the object directory.
    #[arg(value_name = "KIND")]
    pub kind: String,

    /// Object identifier, the second segment of the object directory.
    #[arg(value_name = "ID")]
    pub id: String,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub minio: MinioSettings,
    pub storage: StorageSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Clone)]
pub struct MinioSettings {
    pub endpoint: Url,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl std::fmt::Debug for MinioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinioSettings")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub bucket: String,
    /// Public base URL of the object store, without a trailing slash.
    pub external_address: String,
    pub asset_folder: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: NonZeroUsize,
    pub reconnect_backoff: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Fetch(args)) => raw.apply_minio_overrides(&args.minio),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    minio: RawMinioSettings,
    storage: RawStorageSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = Some(capacity);
        }
        if let Some(seconds) = overrides.cache_reconnect_backoff_seconds {
            self.cache.reconnect_backoff_seconds = Some(seconds);
        }

        self.apply_minio_overrides(&overrides.minio);
    }

    fn apply_minio_overrides(&mut self, overrides: &MinioOverrides) {
        if let Some(endpoint) = overrides.endpoint.as_ref() {
            self.minio.endpoint = Some(endpoint.clone());
        }
        if let Some(bucket) = overrides.bucket.as_ref() {
            self.storage.bucket = Some(bucket.clone());
        }
        if let Some(address) = overrides.external_address.as_ref() {
            self.storage.external_address = Some(address.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            minio,
            storage,
            cache,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let minio = build_minio_settings(minio)?;
        let storage = build_storage_settings(storage, &minio)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            logging,
            minio,
            storage,
            cache,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_minio_settings(minio: RawMinioSettings) -> Result<MinioSettings, LoadError> {
    let endpoint = non_empty(minio.endpoint).unwrap_or_else(|| DEFAULT_MINIO_ENDPOINT.to_string());
    let endpoint = Url::parse(&endpoint)
        .map_err(|err| LoadError::invalid("minio.endpoint", format!("invalid URL: {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "minio.endpoint",
            "scheme must be http or https",
        ));
    }
    if endpoint.host_str().is_none() {
        return Err(LoadError::invalid("minio.endpoint", "URL must have a host"));
    }

    let access_key = non_empty(minio.access_key).unwrap_or_default();
    let secret_key = minio.secret_key.unwrap_or_default();
    if !access_key.is_empty() && secret_key.is_empty() {
        return Err(LoadError::invalid(
            "minio.secret_key",
            "must be set when an access key is configured",
        ));
    }

    let region = non_empty(minio.region).unwrap_or_else(|| DEFAULT_MINIO_REGION.to_string());

    Ok(MinioSettings {
        endpoint,
        access_key,
        secret_key,
        region,
    })
}

fn build_storage_settings(
    storage: RawStorageSettings,
    minio: &MinioSettings,
) -> Result<StorageSettings, LoadError> {
    let bucket = non_empty(storage.bucket).unwrap_or_else(|| DEFAULT_BUCKET.to_string());
    if bucket.contains('/') {
        return Err(LoadError::invalid(
            "storage.bucket",
            "bucket name must not contain `/`",
        ));
    }

    let external_address = non_empty(storage.external_address)
        .unwrap_or_else(|| minio.endpoint.as_str().to_string())
        .trim_end_matches('/')
        .to_string();

    let asset_folder = non_empty(storage.asset_folder)
        .unwrap_or_else(|| DEFAULT_ASSET_FOLDER.to_string())
        .trim_matches('/')
        .to_string();
    if asset_folder.is_empty() {
        return Err(LoadError::invalid(
            "storage.asset_folder",
            "must not be empty",
        ));
    }

    Ok(StorageSettings {
        bucket,
        external_address,
        asset_folder,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let capacity = cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY);
    let capacity = NonZeroUsize::new(capacity)
        .ok_or_else(|| LoadError::invalid("cache.capacity", "must be greater than zero"))?;

    let backoff_seconds = cache
        .reconnect_backoff_seconds
        .unwrap_or(DEFAULT_RECONNECT_BACKOFF_SECS);
    if backoff_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.reconnect_backoff_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        capacity,
        reconnect_backoff: Duration::from_secs(backoff_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMinioSettings {
    endpoint: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    bucket: Option<String>,
    external_address: Option<String>,
    asset_folder: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    capacity: Option<usize>,
    reconnect_backoff_seconds: Option<u64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
