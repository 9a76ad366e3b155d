//! Model configuration (`tts.json`) and model-directory layout.

use crate::error::{Result, RiddiError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File names inside a model directory.
pub const CONFIG_FILE: &str = "tts.json";
pub const INDEXER_FILE: &str = "unicode_indexer.json";
pub const DURATION_MODEL: &str = "duration_predictor.onnx";
pub const TEXT_ENCODER_MODEL: &str = "text_encoder.onnx";
pub const DENOISER_MODEL: &str = "vector_estimator.onnx";
pub const VOCODER_MODEL: &str = "vocoder.onnx";
pub const VOICE_STYLES_DIR: &str = "voice_styles";

/// Autoencoder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AeConfig {
    pub sample_rate: u32,
    pub base_chunk_size: usize,
}

/// Text-to-latent parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    pub chunk_compress_factor: usize,
    pub latent_dim: usize,
}

/// Numeric constants shared by every inference stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub ae: AeConfig,
    pub ttl: TtlConfig,
}

impl ModelConfig {
    /// Parse `tts.json` contents.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let config: ModelConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `tts.json` from a model directory.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join(CONFIG_FILE);
        let bytes = std::fs::read(&path).map_err(|e| RiddiError::ModelLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&bytes).map_err(|e| RiddiError::ModelLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.ae.sample_rate == 0
            || self.ae.base_chunk_size == 0
            || self.ttl.chunk_compress_factor == 0
            || self.ttl.latent_dim == 0
        {
            return Err(RiddiError::ConfigParse {
                message: "model config values must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.ae.sample_rate
    }

    /// Waveform samples covered by one latent frame.
    pub fn latent_chunk_size(&self) -> usize {
        self.ae.base_chunk_size * self.ttl.chunk_compress_factor
    }

    /// Channel count of the latent tensor.
    pub fn latent_channels(&self) -> usize {
        self.ttl.latent_dim * self.ttl.chunk_compress_factor
    }
}

/// Paths of every artifact the engine loads from a model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub root: PathBuf,
}

impl ModelPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn config(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn indexer(&self) -> PathBuf {
        self.root.join(INDEXER_FILE)
    }

    pub fn duration_predictor(&self) -> PathBuf {
        self.root.join(DURATION_MODEL)
    }

    pub fn text_encoder(&self) -> PathBuf {
        self.root.join(TEXT_ENCODER_MODEL)
    }

    pub fn denoiser(&self) -> PathBuf {
        self.root.join(DENOISER_MODEL)
    }

    pub fn vocoder(&self) -> PathBuf {
        self.root.join(VOCODER_MODEL)
    }

    pub fn voice_style(&self, voice_id: &str) -> PathBuf {
        self.root
            .join(VOICE_STYLES_DIR)
            .join(format!("{voice_id}.json"))
    }

    /// Artifacts that must exist before the engine can start.
    pub fn required(&self) -> Vec<PathBuf> {
        vec![
            self.config(),
            self.indexer(),
            self.duration_predictor(),
            self.text_encoder(),
            self.denoiser(),
            self.vocoder(),
        ]
    }

    /// Required artifacts that are missing on disk.
    pub fn missing(&self) -> Vec<PathBuf> {
        self.required().into_iter().filter(|p| !p.exists()).collect()
    }
}
