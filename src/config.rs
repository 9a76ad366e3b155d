use crate::defaults;
use crate::error::RiddiError;
use crate::streaming::buffer_policy::BufferPolicy;
use crate::streaming::types::PlaybackSettings;
use crate::tts::style::Voice;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackSettings,
    pub text: TextConfig,
    pub streaming: BufferPolicy,
    pub models: ModelsConfig,
    pub audio: AudioConfig,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    pub max_chunk_chars: usize,
}

/// Model asset location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding the model files; defaults to the user data dir.
    pub dir: Option<PathBuf>,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    /// Silence between chunks in exported WAV files.
    pub export_silence_secs: f32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: defaults::MAX_CHUNK_CHARS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            export_silence_secs: defaults::EXPORT_SILENCE_SECS,
        }
    }
}

impl ModelsConfig {
    /// Configured directory, or `<data_dir>/riddi/models`.
    pub fn resolve_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("riddi")
                .join("models")
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - RIDDI_VOICE → playback.voice
    /// - RIDDI_MODEL_DIR → models.dir
    /// - RIDDI_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(voice) = std::env::var("RIDDI_VOICE")
            && !voice.is_empty()
        {
            match voice.parse::<Voice>() {
                Ok(voice) => self.playback.voice = voice,
                Err(e) => tracing::warn!(error = %e, "Ignoring RIDDI_VOICE"),
            }
        }

        if let Ok(dir) = std::env::var("RIDDI_MODEL_DIR")
            && !dir.is_empty()
        {
            self.models.dir = Some(PathBuf::from(dir));
        }

        if let Ok(device) = std::env::var("RIDDI_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        self
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.playback.validate()?;
        if self.text.max_chunk_chars == 0 {
            return Err(invalid("text.max_chunk_chars", "must be positive"));
        }
        let policy = &self.streaming;
        if policy.steady_depth == 0 || policy.deep_depth < policy.steady_depth {
            return Err(invalid(
                "streaming.deep_depth",
                "depths must satisfy 1 <= steady_depth <= deep_depth",
            ));
        }
        let silence = self.audio.export_silence_secs;
        if silence.is_nan() || silence < 0.0 {
            return Err(invalid("audio.export_silence_secs", "must not be negative"));
        }
        Ok(())
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/riddi/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("riddi")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> RiddiError {
    RiddiError::InvalidSettings {
        key: key.to_string(),
        message: message.to_string(),
    }
}
