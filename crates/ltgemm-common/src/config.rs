//! Selection configuration file format.
//!
//! Loads [`GemmConfig`] from a TOML file (`ltgemm.toml`) with environment
//! variable overrides via `LTGEMM_*` prefixed variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Search strategy used when the caller does not pick one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Ranked query, check the top-k in rank order.
    Heuristic,
    /// Walk the whole index space in fixed-size batches.
    Exhaustive,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heuristic => write!(f, "heuristic"),
            Self::Exhaustive => write!(f, "exhaustive"),
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "exhaustive" => Ok(Self::Exhaustive),
            other => Err(format!("unknown selection strategy: {other}")),
        }
    }
}

/// Selection configuration loaded from TOML with environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GemmConfig {
    /// Workspace budget applied by `Selector::select_with_config`.
    /// Override: `LTGEMM_MAX_WORKSPACE_BYTES`
    pub max_workspace_bytes: u64,

    /// Number of ranked candidates requested by the heuristic strategy.
    /// Override: `LTGEMM_DEFAULT_TOP_K`
    pub default_top_k: usize,

    /// Indices requested per round by the exhaustive strategy.
    /// Override: `LTGEMM_INDEX_BATCH_SIZE`
    pub index_batch_size: usize,

    /// Upper bound on indices the exhaustive strategy will visit.
    /// Override: `LTGEMM_MAX_SCAN_INDICES`
    pub max_scan_indices: usize,

    /// Evaluate support checks for a batch on the rayon pool.
    /// Override: `LTGEMM_PARALLEL_CHECK`
    pub parallel_check: bool,

    /// Strategy used by [`GemmConfig::default_strategy`].
    /// Override: `LTGEMM_STRATEGY`
    pub default_strategy: StrategyKind,
}

impl Default for GemmConfig {
    fn default() -> Self {
        Self {
            max_workspace_bytes: 32 * 1024 * 1024,
            default_top_k: 1,
            index_batch_size: 100,
            max_scan_indices: 1 << 20,
            parallel_check: false,
            default_strategy: StrategyKind::Heuristic,
        }
    }
}

/// Errors that can occur when loading or validating a [`GemmConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride { key: String, value: String, reason: String },
}

const ENV_VARS: &[&str] = &[
    "LTGEMM_MAX_WORKSPACE_BYTES",
    "LTGEMM_DEFAULT_TOP_K",
    "LTGEMM_INDEX_BATCH_SIZE",
    "LTGEMM_MAX_SCAN_INDICES",
    "LTGEMM_PARALLEL_CHECK",
    "LTGEMM_STRATEGY",
];

impl GemmConfig {
    /// Names of every environment variable consulted by
    /// [`apply_env_overrides`](Self::apply_env_overrides).
    pub fn env_vars() -> &'static [&'static str] {
        ENV_VARS
    }

    /// Render the default configuration as TOML.
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields, then apply environment variable overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml(&contents)?;
        tracing::debug!(path = %path.display(), "loaded ltgemm config");
        Ok(cfg)
    }

    /// Load from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: GemmConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load only from environment variables, starting from defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_top_k == 0 {
            return Err(ConfigError::Validation("default_top_k must be > 0".into()));
        }
        if self.index_batch_size == 0 {
            return Err(ConfigError::Validation("index_batch_size must be > 0".into()));
        }
        if self.max_scan_indices < self.index_batch_size {
            return Err(ConfigError::Validation(format!(
                "max_scan_indices ({}) must be >= index_batch_size ({})",
                self.max_scan_indices, self.index_batch_size
            )));
        }
        Ok(())
    }

    /// Apply `LTGEMM_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = parse_env::<u64>("LTGEMM_MAX_WORKSPACE_BYTES")? {
            self.max_workspace_bytes = v;
        }
        if let Some(v) = parse_env::<usize>("LTGEMM_DEFAULT_TOP_K")? {
            self.default_top_k = v;
        }
        if let Some(v) = parse_env::<usize>("LTGEMM_INDEX_BATCH_SIZE")? {
            self.index_batch_size = v;
        }
        if let Some(v) = parse_env::<usize>("LTGEMM_MAX_SCAN_INDICES")? {
            self.max_scan_indices = v;
        }
        if let Ok(val) = std::env::var("LTGEMM_PARALLEL_CHECK") {
            self.parallel_check = matches!(val.as_str(), "1" | "true" | "yes");
        }
        if let Some(v) = parse_env::<StrategyKind>("LTGEMM_STRATEGY")? {
            self.default_strategy = v;
        }
        Ok(())
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val.parse::<T>().map(Some).map_err(|e| ConfigError::EnvOverride {
            key: key.into(),
            value: val.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}
