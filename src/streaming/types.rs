//! Requests, settings and synthesized audio.

use crate::defaults;
use crate::error::{Result, RiddiError};
use crate::tts::style::Voice;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-request voice, speed and quality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub voice: Voice,
    /// Speaking-rate multiplier; above 1.0 is faster.
    pub speed: f32,
    /// Denoising steps; more is slower and cleaner.
    pub steps: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            voice: Voice::F1,
            speed: defaults::DEFAULT_SPEED,
            steps: defaults::DEFAULT_STEPS,
        }
    }
}

impl PlaybackSettings {
    /// Build settings from loosely typed input and validate them.
    pub fn parse(voice: &str, speed: f32, steps: usize) -> Result<Self> {
        let settings = Self {
            voice: voice.parse()?,
            speed,
            steps,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(defaults::MIN_SPEED..=defaults::MAX_SPEED).contains(&self.speed) {
            return Err(RiddiError::InvalidSettings {
                key: "speed".to_string(),
                message: format!(
                    "must be between {} and {}, got {}",
                    defaults::MIN_SPEED,
                    defaults::MAX_SPEED,
                    self.speed
                ),
            });
        }
        if self.steps == 0 || self.steps > defaults::MAX_STEPS {
            return Err(RiddiError::InvalidSettings {
                key: "steps".to_string(),
                message: format!(
                    "must be between 1 and {}, got {}",
                    defaults::MAX_STEPS,
                    self.steps
                ),
            });
        }
        Ok(())
    }
}

/// One call to synthesize: the whole text plus a settings snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub id: u64,
    pub text: String,
    pub settings: PlaybackSettings,
}

impl SynthesisRequest {
    pub fn new(id: u64, text: impl Into<String>, settings: PlaybackSettings) -> Self {
        Self {
            id,
            text: text.into(),
            settings,
        }
    }
}

/// Audio for one text chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedChunk {
    pub index: usize,
    /// Mono samples at `sample_rate`.
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// `samples.len() / sample_rate`.
    pub duration_secs: f32,
    pub text: String,
}

impl SynthesizedChunk {
    pub fn new(index: usize, samples: Vec<f32>, sample_rate: u32, text: impl Into<String>) -> Self {
        let duration_secs = samples.len() as f32 / sample_rate.max(1) as f32;
        Self {
            index,
            samples: samples.into(),
            sample_rate,
            duration_secs,
            text: text.into(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.duration_secs * 1000.0).round() as u64
    }
}
