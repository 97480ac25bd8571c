//! Configuration for the ingest pipeline.
//!
//! Loaded from layered files and `PICTOR__`-prefixed environment variables.

use crate::derive::{default_renditions, RenditionSpec, ResizeMode, DEFAULT_MAX_PIXELS};
use config::{Config, ConfigError, Environment, File};
use pictor_storage::{DatabaseConfig, StorageConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Main configuration for the ingest pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Originals root and paging
    #[serde(default)]
    pub storage: StorageConfig,

    /// Metadata database
    pub database: DatabaseConfig,

    /// Remote fetch behaviour
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Guards against sources too large to render
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Renditions derived from every original
    #[serde(default = "default_renditions")]
    pub renditions: Vec<RenditionSpec>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// HTTP client settings for URL sources.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout, including the body
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Resource limits for derivation.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Largest decoded source or rendition buffer, in pixels
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}
fn default_user_agent() -> String {
    concat!("pictor-ingest/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_pixels: default_max_pixels(),
        }
    }
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl IngestConfig {
    /// Load configuration from files and environment variables.
    ///
    /// Later sources override earlier ones:
    /// 1. `config/default.toml`
    /// 2. `config/{RUN_MODE}.toml`
    /// 3. `path`, when given (must exist)
    /// 4. Environment variables, e.g. `PICTOR__DATABASE__URL`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix("PICTOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(
                Environment::with_prefix("PICTOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "database.url".to_string(),
            ));
        }

        if self.storage.page_size <= 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "storage.page_size".to_string(),
                message: "Page size must be greater than 0".to_string(),
            });
        }

        if self.limits.max_pixels == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "limits.max_pixels".to_string(),
                message: "Pixel limit must be greater than 0".to_string(),
            });
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigValidationError::InvalidValue {
                field: "logging.format".to_string(),
                message: "Format must be json or pretty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for rendition in &self.renditions {
            validate_rendition(rendition)?;
            if !seen.insert(rendition.name.as_str()) {
                return Err(ConfigValidationError::InvalidValue {
                    field: "renditions".to_string(),
                    message: format!("Duplicate rendition name {:?}", rendition.name),
                });
            }
        }

        Ok(())
    }
}

fn validate_rendition(rendition: &RenditionSpec) -> Result<(), ConfigValidationError> {
    let name = &rendition.name;
    let safe = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !safe {
        return Err(ConfigValidationError::InvalidValue {
            field: "renditions.name".to_string(),
            message: format!("{:?} must be non-empty and use only [A-Za-z0-9_-]", name),
        });
    }

    let zero_height = rendition.mode != ResizeMode::FitWidth && rendition.height == Some(0);
    if rendition.width == 0 || zero_height {
        return Err(ConfigValidationError::InvalidValue {
            field: format!("renditions.{}", name),
            message: "Dimensions must be greater than 0".to_string(),
        });
    }

    Ok(())
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_config() -> IngestConfig {
        IngestConfig {
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::with_url("postgres://localhost/pictor"),
            fetch: FetchConfig::default(),
            limits: LimitsConfig::default(),
            renditions: default_renditions(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_database_url() {
        let mut config = create_test_config();
        config.database.url = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_invalid_page_size() {
        let mut config = create_test_config();
        config.storage.page_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_pixel_limit() {
        let mut config = create_test_config();
        config.limits.max_pixels = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_duplicate_rendition() {
        let mut config = create_test_config();
        config.renditions.push(RenditionSpec::thumbnail());
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_unsafe_rendition_name() {
        let mut config = create_test_config();
        config.renditions[0].name = "../escape".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_dimensions() {
        let mut config = create_test_config();
        config.renditions[1].width = 0;
        assert!(config.validate().is_err());

        let mut config = create_test_config();
        config.renditions[0].height = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgres://db/images"

[storage]
originals_root = "/srv/images"

[[renditions]]
name = "square"
mode = "fill"
width = 128
"#
        )
        .unwrap();

        let config = IngestConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database.url, "postgres://db/images");
        assert_eq!(config.storage.originals_root, Path::new("/srv/images"));
        assert_eq!(config.storage.page_size, 25);
        assert_eq!(config.fetch.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.limits.max_pixels, DEFAULT_MAX_PIXELS);
        assert_eq!(config.renditions.len(), 1);
        assert_eq!(config.renditions[0].mode, ResizeMode::Fill);
        assert_eq!(config.renditions[0].height, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_renditions_when_absent() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[database]\nurl = \"postgres://db/images\"").unwrap();

        let config = IngestConfig::load(Some(file.path())).unwrap();
        let names: Vec<_> = config.renditions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["thumbnail", "preview"]);
    }
}
