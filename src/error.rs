//! Error types for riddi.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiddiError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid setting {key}: {message}")]
    InvalidSettings { key: String, message: String },

    // Model and voice resources
    #[error("Failed to load voice style '{voice}': {message}")]
    StyleLoad { voice: String, message: String },

    #[error("Failed to load model {path}: {message}")]
    ModelLoad { path: String, message: String },

    // Synthesis errors
    #[error("Synthesis failed for request {request_id}: {message}")]
    Synthesis { request_id: u64, message: String },

    #[error("Inference stage {stage} failed: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },

    #[error("Vocoder did not finish within {seconds}s")]
    VocoderTimeout { seconds: u64 },

    #[error("No speakable content in input text")]
    NoContent,

    #[error("Request {request_id} was cancelled")]
    Cancelled { request_id: u64 },

    // Audio output errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    #[error("WAV encoding failed: {message}")]
    WavEncode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl RiddiError {
    /// Whether the error poisons the whole session rather than a single request.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(self, RiddiError::ModelLoad { .. })
    }

    /// Build a stage failure from any displayable error.
    pub fn stage(stage: &'static str, err: impl std::fmt::Display) -> Self {
        RiddiError::Stage {
            stage,
            message: err.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RiddiError>;
