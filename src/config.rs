use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{RefrainError, Result};

fn default_representation() -> String {
    "mfcc".to_string()
}

const fn default_train_split() -> f32 {
    0.8
}

const fn default_n_batches() -> usize {
    256
}

const fn default_songs_per_batch() -> usize {
    64
}

const fn default_frame_size() -> usize {
    400
}

const fn default_scale() -> (f32, f32) {
    (1.0, 0.33)
}

const fn default_margin() -> f32 {
    0.3
}

fn default_results_dir() -> String {
    let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
    data_dir
        .join("refrain/results")
        .to_string_lossy()
        .to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub songbase: SongbaseConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// One songbase source directory: a tree of `<song_id>/<cover>.json`
/// representation matrices.
#[derive(Debug, Clone, Deserialize)]
pub struct SongbaseSource {
    pub path: String,

    /// Cap on the number of songs drawn from this source (all if absent).
    pub n_songs: Option<usize>,

    /// Set when the matrices on disk are already zero-mean/unit-variance.
    #[serde(default)]
    pub normalized: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SongbaseConfig {
    /// Feature kind stored in the songbase ("mfcc" or "hpcp").
    #[serde(default = "default_representation")]
    pub representation: String,

    #[serde(default)]
    pub train_datasets: Vec<SongbaseSource>,

    #[serde(default)]
    pub test_datasets: Vec<SongbaseSource>,

    /// Fraction of training songs kept for training; the rest validate.
    #[serde(default = "default_train_split")]
    pub train_split: f32,
}

impl Default for SongbaseConfig {
    fn default() -> Self {
        Self {
            representation: default_representation(),
            train_datasets: Vec::new(),
            test_datasets: Vec::new(),
            train_split: default_train_split(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Number of precomputed batches.
    #[serde(default = "default_n_batches")]
    pub n_batches: usize,

    /// Songs drawn per batch (the P in a P×K batch).
    #[serde(default = "default_songs_per_batch")]
    pub songs_per_batch: usize,

    /// Frame width in time samples.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    /// Time-axis resample factors applied before segmentation.
    #[serde(default = "default_scale")]
    pub scale: (f32, f32),

    /// Seed for the sampling RNG; random construction when absent.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            n_batches: default_n_batches(),
            songs_per_batch: default_songs_per_batch(),
            frame_size: default_frame_size(),
            scale: default_scale(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the ONNX embedding model.
    pub path: Option<String>,

    #[serde(default)]
    pub gpu: bool,

    /// Same-song similarity threshold; picked from the ROC sweep if absent.
    pub threshold: Option<f32>,

    /// Triplet loss margin used when reporting validation loss.
    #[serde(default = "default_margin")]
    pub margin: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            gpu: false,
            threshold: None,
            margin: default_margin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RefrainError::Configuration(format!(
                "config file not found: {} — create it or use --config to specify a path",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            RefrainError::Configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml_ng::from_str(&contents).map_err(|e| {
            RefrainError::Configuration(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations that can never produce a usable batch
    /// set, before any segmentation work starts.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.n_batches == 0 {
            return Err(RefrainError::Configuration(
                "dataset.n_batches must be at least 1".to_string(),
            ));
        }
        if self.dataset.songs_per_batch < 2 {
            return Err(RefrainError::Configuration(
                "dataset.songs_per_batch must be at least 2 to allow negative pairs".to_string(),
            ));
        }
        if self.dataset.frame_size == 0 {
            return Err(RefrainError::Configuration(
                "dataset.frame_size must be positive".to_string(),
            ));
        }
        let (a, b) = self.dataset.scale;
        if a <= 0.0 || b <= 0.0 {
            return Err(RefrainError::Configuration(format!(
                "dataset.scale factors must be positive, got ({a}, {b})"
            )));
        }
        if !(0.0..=1.0).contains(&self.songbase.train_split) {
            return Err(RefrainError::Configuration(format!(
                "songbase.train_split must be within [0, 1], got {}",
                self.songbase.train_split
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        config_dir.join("refrain/config.yaml")
    }

    /// Expand `~` in a path string to the user's home directory.
    #[must_use]
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }
}
