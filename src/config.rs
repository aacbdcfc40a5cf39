//! Process-wide configuration.
//!
//! Hierarchical loading from:
//! - `constellation.toml` (base configuration)
//! - `constellation.local.toml` (git-ignored local overrides)
//! - Environment variables (`CONSTELLATION_` prefix, `__` for nesting)
//!
//! ## Example
//!
//! ```bash
//! CONSTELLATION_JSON__LAZY_THRESHOLD=5000
//! CONSTELLATION_SCHEDULER__MAX_CONCURRENCY=8
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Process-wide defaults a `Constellation::builder()` starts from.
/// `ExecutionOptions` can override the scheduler knobs per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub json: JsonConfig,
    #[serde(default)]
    pub streaming_limits: StreamingLimitsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonConfig {
    #[serde(default = "default_lazy_threshold")]
    pub lazy_threshold: usize,
    #[serde(default = "default_streaming_threshold")]
    pub streaming_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingLimitsConfig {
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
    #[serde(default = "default_max_array_elements")]
    pub max_array_elements: usize,
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// `None` is unbounded.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_lazy_threshold() -> usize {
    10_000
}
fn default_streaming_threshold() -> usize {
    100_000
}
fn default_max_payload_size() -> usize {
    100 * 1024 * 1024
}
fn default_max_array_elements() -> usize {
    1_000_000
}
fn default_max_nesting_depth() -> usize {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            lazy_threshold: default_lazy_threshold(),
            streaming_threshold: default_streaming_threshold(),
        }
    }
}

impl Default for StreamingLimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_size: default_max_payload_size(),
            max_array_elements: default_max_array_elements(),
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { max_concurrency: None }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            json: JsonConfig::default(),
            streaming_limits: StreamingLimitsConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Merges `constellation.toml`, then `constellation.local.toml`, then
    /// `CONSTELLATION_`-prefixed environment variables, over the built-in
    /// defaults above.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("constellation.toml"))
            .merge(Toml::file("constellation.local.toml"))
            .merge(Env::prefixed("CONSTELLATION_").split("__"))
            .extract()
    }

    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::from(figment::providers::Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CONSTELLATION_").split("__"))
            .extract()
    }

    pub fn streaming_limits(&self) -> crate::json::streaming::StreamingLimits {
        crate::json::streaming::StreamingLimits::new(
            self.streaming_limits.max_payload_size,
            self.streaming_limits.max_array_elements,
            self.streaming_limits.max_nesting_depth,
        )
        .expect("config defaults are always positive")
    }
}
