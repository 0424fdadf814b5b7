use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV: &str = "CLARITY_CONFIG";

/// Widest accepted trend window: ten years.
pub const MAX_WINDOW_MINUTES: i64 = 10 * 366 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Explicitly constructed settings, passed to whichever component needs them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub trend: TrendConfig,
    pub monitor: MonitorConfig,
    pub summarizer: SummarizerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Upper bound on reading and normalizing a single file.
    pub file_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { file_timeout_secs: 10 }
    }
}

impl IngestConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub error_rate_threshold: f64,
    pub error_rate_high_threshold: f64,
    pub baseline_error_rate: f64,
    /// Fixed confidence for error-rate alerts; not derived from the data.
    pub error_confidence: f64,
    /// Restrict the error-ratio check to the trailing N minutes. `None` uses
    /// the whole timeline.
    pub error_window_minutes: Option<i64>,
    /// Restrict the latency check to one source (path or file name).
    pub latency_source: Option<String>,
    pub latency_threshold_ms: f64,
    pub latency_window_minutes: i64,
    pub min_latency_events: usize,
    pub latency_confidence: f64,
    pub min_pool_events: usize,
    pub pool_confidence: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 0.10,
            error_rate_high_threshold: 0.25,
            baseline_error_rate: 0.05,
            error_confidence: 0.85,
            error_window_minutes: None,
            latency_source: None,
            latency_threshold_ms: 300.0,
            latency_window_minutes: 5,
            min_latency_events: 2,
            latency_confidence: 0.75,
            min_pool_events: 2,
            pool_confidence: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub timeout_secs: u64,
    /// Namespace embedded in generated remediation commands.
    pub namespace: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self { timeout_secs: 30, namespace: "default".to_string() }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text, path)
    }

    fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Explicit path, else `CLARITY_CONFIG`, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(p) => {
                tracing::info!("loading configuration from {}", p.display());
                Self::from_file(&p)
            }
            None => {
                tracing::debug!("no configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trend;
        let unit = [
            ("trend.error_rate_threshold", t.error_rate_threshold),
            ("trend.error_rate_high_threshold", t.error_rate_high_threshold),
            ("trend.baseline_error_rate", t.baseline_error_rate),
            ("trend.error_confidence", t.error_confidence),
            ("trend.latency_confidence", t.latency_confidence),
            ("trend.pool_confidence", t.pool_confidence),
        ];
        for (name, v) in unit {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {v}")));
            }
        }
        if t.error_rate_high_threshold < t.error_rate_threshold {
            return Err(ConfigError::Invalid(
                "trend.error_rate_high_threshold must not be below trend.error_rate_threshold".into(),
            ));
        }
        if t.latency_threshold_ms < 0.0 || !t.latency_threshold_ms.is_finite() {
            return Err(ConfigError::Invalid("trend.latency_threshold_ms must be a non-negative number".into()));
        }
        if t.latency_window_minutes <= 0 || t.error_window_minutes.is_some_and(|m| m <= 0) {
            return Err(ConfigError::Invalid("trend windows must be positive".into()));
        }
        if t.latency_window_minutes > MAX_WINDOW_MINUTES || t.error_window_minutes.is_some_and(|m| m > MAX_WINDOW_MINUTES) {
            return Err(ConfigError::Invalid(format!("trend windows must not exceed {MAX_WINDOW_MINUTES} minutes")));
        }
        if self.ingest.file_timeout_secs == 0 || self.monitor.interval_secs == 0 || self.summarizer.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts and intervals must be positive".into()));
        }
        Ok(())
    }
}
