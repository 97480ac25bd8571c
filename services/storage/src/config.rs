use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Filesystem storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding originals; renditions live in named subdirectories
    #[serde(default = "default_originals_root")]
    pub originals_root: PathBuf,
    /// Number of records per listing page
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: i64 = 25;

// Default value functions
fn default_originals_root() -> PathBuf {
    PathBuf::from("./data/images")
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_run_migrations() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            originals_root: default_originals_root(),
            page_size: default_page_size(),
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `originals_root` with default paging.
    pub fn with_root(originals_root: impl Into<PathBuf>) -> Self {
        Self {
            originals_root: originals_root.into(),
            ..Default::default()
        }
    }
}

impl DatabaseConfig {
    /// Pool settings with defaults for the given URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            run_migrations: default_run_migrations(),
        }
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
