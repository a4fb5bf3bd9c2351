//! Cache configuration
//!
//! Everything the orchestrator needs is passed in through [`CacheConfig`], so
//! independent caches (e.g. one per test, each in its own temp directory) can
//! coexist in a single process.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{KeyCodec, DEFAULT_EXTENSION, DEFAULT_NAMESPACE};

/// Directory used by the file backend when none is configured
pub const DEFAULT_CACHE_DIR: &str = "weather_cache";

/// Redis instance tried when none is configured
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Top-level cache settings
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory of the file backend, created on first use
    pub cache_dir: PathBuf,
    /// Prefix of every remote key
    pub namespace: String,
    /// Extension of cache files, without the dot
    pub file_extension: String,
    /// Remote backend settings; `None` runs file-only
    pub remote: Option<RemoteConfig>,
    /// How often a degraded cache retries the remote backend
    ///
    /// `None` keeps the startup probe result for the cache's whole lifetime.
    pub reprobe_interval: Option<Duration>,
}

/// Remote (Redis) backend settings
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`
    pub url: String,
    /// Upper bound on the startup liveness probe
    pub probe_timeout: Duration,
    /// Connection pool sizing and timeouts
    pub pool: PoolConfig,
}

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of open connections
    pub max_size: u32,
    /// Connections kept open while idle
    pub min_idle: u32,
    /// Bound on establishing a connection and on socket reads/writes
    pub connect_timeout: Duration,
    /// How long a caller waits for a free connection
    pub checkout_timeout: Duration,
    /// Idle connections above `min_idle` are closed after this long
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            min_idle: 1,
            connect_timeout: Duration::from_secs(2),
            checkout_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            probe_timeout: Duration::from_secs(2),
            pool: PoolConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            namespace: DEFAULT_NAMESPACE.to_string(),
            file_extension: DEFAULT_EXTENSION.to_string(),
            remote: Some(RemoteConfig::default()),
            reprobe_interval: None,
        }
    }
}

impl CacheConfig {
    /// File-only configuration rooted at `cache_dir`
    pub fn file_only(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            remote: None,
            ..Self::default()
        }
    }

    /// Sets the file backend directory
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Enables the remote backend at `url`, keeping other remote settings
    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        let mut remote = self.remote.take().unwrap_or_default();
        remote.url = url.into();
        self.remote = Some(remote);
        self
    }

    /// Disables the remote backend
    pub fn without_remote(mut self) -> Self {
        self.remote = None;
        self
    }

    /// Sets the remote key namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Enables periodic re-probing of a degraded remote backend
    pub fn with_reprobe_interval(mut self, interval: Duration) -> Self {
        self.reprobe_interval = Some(interval);
        self
    }

    /// Key codec matching this configuration
    pub fn key_codec(&self) -> KeyCodec {
        KeyCodec::new(self.namespace.clone(), self.file_extension.clone())
    }

    /// Per-user cache directory (`~/.cache/weather-cache/` on Linux)
    ///
    /// Returns `None` if no home directory can be determined.
    pub fn user_cache_dir() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "weather-cache")?;
        Some(project_dirs.cache_dir().to_path_buf())
    }
}
