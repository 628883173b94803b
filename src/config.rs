//! Viewer settings.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. The file is JSON and is located through `RADVIEW_CONFIG`.

use crate::engine::{DecoderConfig, RetryPolicy};
use crate::loader::LoaderConfig;
use crate::tools::ZoomConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "RADVIEW_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for InitSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub log_level: LogLevel,
    pub init: InitSettings,
    pub cache: CacheSettings,
    pub decoder: DecoderConfig,
    pub zoom: ZoomConfig,
    /// Pause before the follow-up resize once an image is displayed.
    pub layout_settle_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            init: InitSettings::default(),
            cache: CacheSettings::default(),
            decoder: DecoderConfig::conservative(),
            zoom: ZoomConfig::default(),
            layout_settle_ms: 100,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load the file named by [`CONFIG_ENV`], or defaults when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.init.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "init.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if !(self.zoom.min_scale > 0.0 && self.zoom.min_scale <= self.zoom.max_scale) {
            return Err(ConfigError::Invalid(format!(
                "zoom bounds {}..{} are not a valid range",
                self.zoom.min_scale, self.zoom.max_scale
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.init.max_attempts,
            Duration::from_millis(self.init.base_delay_ms),
        )
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            ttl: Duration::from_secs(self.cache.ttl_secs),
            sweep_interval: Duration::from_secs(self.cache.sweep_interval_secs),
        }
    }

    pub fn layout_settle_delay(&self) -> Duration {
        Duration::from_millis(self.layout_settle_ms)
    }
}

/// Install the global logger at the configured level. `RUST_LOG` still wins
/// for any module it names.
pub fn init_logging(level: LogLevel) {
    let _ = env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .parse_default_env()
        .format_timestamp_secs()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_gives_defaults() {
        let config = ViewerConfig::from_json("{}").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.loader_config(), LoaderConfig::default());
        assert_eq!(config.layout_settle_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = ViewerConfig::from_json(
            r#"{ "log_level": "debug", "cache": { "ttl_secs": 60 }, "zoom": { "max_scale": 8.0 } }"#,
        )
        .unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.zoom.max_scale, 8.0);
        assert_eq!(config.zoom.min_scale, 0.1);
        assert!(config.decoder.discard_raw_after_decode);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            ViewerConfig::from_json(r#"{ "init": { "max_attempts": 0 } }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ViewerConfig::from_json(r#"{ "zoom": { "min_scale": 5.0, "max_scale": 1.0 } }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ViewerConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "layout_settle_ms": 250 }}"#).unwrap();
        let config = ViewerConfig::load(file.path()).unwrap();
        assert_eq!(config.layout_settle_ms, 250);

        let missing = ViewerConfig::load(Path::new("/nonexistent/radview.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
