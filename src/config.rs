//! Configuration Module
//!
//! Handles loading and validating store and server configuration from
//! environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::HASH_WIDTH;

// == Config Error ==
/// Rejected configuration values.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("root path must be an absolute node path below /, got {0:?}")]
    RootPath(String),

    #[error("bucket depth must be between 1 and {max}, got {depth}")]
    BucketDepth { depth: usize, max: usize },

    #[error("delta save threshold must be at least 1")]
    DeltaThreshold,

    #[error("maximum store size must be greater than zero")]
    MaxSize,
}

// == Store Config ==
/// Parameters of the persistent cache tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Node path under which all buckets are created
    pub root_path: String,
    /// Number of bucket levels between root and entries
    pub bucket_depth: usize,
    /// Entry time-to-live, None = entries never expire
    pub ttl: Option<Duration>,
    /// Removals buffered by a bulk pass before it commits
    pub delta_save_threshold: usize,
    /// Largest payload total the store is meant to hold, in bytes
    pub max_size_bytes: u64,
}

impl StoreConfig {
    /// Checks every value, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_path == "/" || crate::repository::validate_path(&self.root_path).is_err() {
            return Err(ConfigError::RootPath(self.root_path.clone()));
        }
        if self.bucket_depth == 0 || self.bucket_depth > HASH_WIDTH {
            return Err(ConfigError::BucketDepth {
                depth: self.bucket_depth,
                max: HASH_WIDTH,
            });
        }
        if self.delta_save_threshold == 0 {
            return Err(ConfigError::DeltaThreshold);
        }
        if self.max_size_bytes == 0 {
            return Err(ConfigError::MaxSize);
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_path: "/var/httpcache".to_string(),
            bucket_depth: 10,
            ttl: None,
            delta_save_threshold: 500,
            max_size_bytes: 10 * 1024 * 1024,
        }
    }
}

// == Server Config ==
/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache tree parameters
    pub store: StoreConfig,
    /// Snapshot file for the node tree, None = memory only
    pub snapshot_path: Option<PathBuf>,
    /// HTTP server port
    pub server_port: u16,
    /// Background purge interval in seconds
    pub purge_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ROOT_PATH` - Root node path (default: /var/httpcache)
    /// - `CACHE_BUCKET_DEPTH` - Bucket levels (default: 10)
    /// - `CACHE_TTL` - TTL in seconds, 0 or negative disables expiry (default: -1)
    /// - `CACHE_DELTA_SAVE_THRESHOLD` - Removals per commit (default: 500)
    /// - `CACHE_MAX_SIZE_MB` - Maximum store size in MiB (default: 10)
    /// - `CACHE_SNAPSHOT_PATH` - Snapshot file (default: unset)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `PURGE_INTERVAL` - Purge frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = StoreConfig::default();
        let ttl_secs: i64 = env_or("CACHE_TTL", -1);

        Self {
            store: StoreConfig {
                root_path: env::var("CACHE_ROOT_PATH").unwrap_or(defaults.root_path),
                bucket_depth: env_or("CACHE_BUCKET_DEPTH", defaults.bucket_depth),
                ttl: (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs.unsigned_abs())),
                delta_save_threshold: env_or(
                    "CACHE_DELTA_SAVE_THRESHOLD",
                    defaults.delta_save_threshold,
                ),
                max_size_bytes: env_or::<u64>("CACHE_MAX_SIZE_MB", 10).saturating_mul(1024 * 1024),
            },
            snapshot_path: env::var("CACHE_SNAPSHOT_PATH").ok().map(PathBuf::from),
            server_port: env_or("SERVER_PORT", 3000),
            purge_interval: env_or("PURGE_INTERVAL", 60),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            snapshot_path: None,
            server_port: 3000,
            purge_interval: 60,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
