use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    CACHE_DIR_NAME, DEFAULT_BATCH_SIZE, DEFAULT_MIN_CONFIDENCE, DEFAULT_RESULT_CACHE_CAPACITY,
    DEFAULT_RESULT_CACHE_TTL_SECS, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_WORKER_FRACTION,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime configuration shared by the library entry points and the CLI.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceIndexConfig {
    pub cache_dir: PathBuf,
    /// Extra cache directories (e.g. per-worker caches) consulted after `cache_dir`.
    pub secondary_cache_dirs: Vec<PathBuf>,
    pub similarity_threshold: f64,
    pub min_confidence: f64,
    pub batch_size: usize,
    /// Share of available cores used for the embedding worker pool.
    pub worker_fraction: f64,
    /// Directory with pre-packaged detector/embedder models, checked before downloading.
    pub model_dir: Option<PathBuf>,
    pub attribute_model_dir: Option<PathBuf>,
    pub result_cache_capacity: usize,
    pub result_cache_ttl_secs: u64,
}

impl Default for FaceIndexConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            secondary_cache_dirs: Vec::new(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            batch_size: DEFAULT_BATCH_SIZE,
            worker_fraction: DEFAULT_WORKER_FRACTION,
            model_dir: None,
            attribute_model_dir: None,
            result_cache_capacity: DEFAULT_RESULT_CACHE_CAPACITY,
            result_cache_ttl_secs: DEFAULT_RESULT_CACHE_TTL_SECS,
        }
    }
}

/// `~/.face-cache`, or `./.face-cache` when no home directory is known.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_DIR_NAME)
}

impl FaceIndexConfig {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("FaceIndex").join("config.json"))
    }

    /// Loads the user config file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring config: {e}");
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "similarity_threshold",
                expected: "between 0.0 and 1.0",
                value: self.similarity_threshold.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::OutOfRange {
                field: "min_confidence",
                expected: "between 0.0 and 1.0",
                value: self.min_confidence.to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "batch_size",
                expected: "at least 1",
                value: self.batch_size.to_string(),
            });
        }
        if !(self.worker_fraction > 0.0 && self.worker_fraction <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "worker_fraction",
                expected: "in (0.0, 1.0]",
                value: self.worker_fraction.to_string(),
            });
        }
        Ok(())
    }

    /// Number of embedding workers for this machine: the configured share of
    /// available cores, never fewer than one.
    pub fn worker_count(&self) -> usize {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        workers_for(cores, self.worker_fraction)
    }
}

fn workers_for(cores: usize, fraction: f64) -> usize {
    ((cores as f64 * fraction).floor() as usize).max(1)
}
