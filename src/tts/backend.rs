//! Inference capability interface and its deterministic test double.

use crate::error::{Result, RiddiError};
use crate::tts::model_config::{AeConfig, ModelConfig, TtlConfig};
use crate::tts::tokenizer::UnicodeIndexer;
use ndarray::{Array2, Array3, Axis};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The four sequential model stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceStage {
    Duration,
    Encode,
    Denoise,
    Vocode,
}

impl InferenceStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceStage::Duration => "duration_predictor",
            InferenceStage::Encode => "text_encoder",
            InferenceStage::Denoise => "vector_estimator",
            InferenceStage::Vocode => "vocoder",
        }
    }
}

impl fmt::Display for InferenceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for one denoising refinement call.
#[derive(Debug, Clone, Copy)]
pub struct DenoiseInput<'a> {
    /// `[batch, channels, frames]`
    pub latent: &'a Array3<f32>,
    /// Output of [`InferenceBackend::encode`].
    pub text_emb: &'a Array3<f32>,
    pub style_ttl: &'a Array3<f32>,
    /// `[batch, 1, frames]`
    pub latent_mask: &'a Array3<f32>,
    /// `[batch, 1, tokens]`
    pub text_mask: &'a Array3<f32>,
    /// Zero-based iteration index.
    pub step: usize,
    pub total_steps: usize,
}

/// One loaded set of model sessions.
///
/// Implementations are called from blocking worker threads, one call at a
/// time. Shapes follow the batch-first convention of the model:
/// ids `[batch, tokens]`, masks `[batch, 1, len]`, styles `[batch, rows, cols]`.
pub trait InferenceBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Predicted duration in seconds per batch item.
    fn duration(
        &self,
        ids: &Array2<i64>,
        style_dp: &Array3<f32>,
        text_mask: &Array3<f32>,
    ) -> Result<Vec<f32>>;

    /// Text embedding reused by every denoising step.
    fn encode(
        &self,
        ids: &Array2<i64>,
        style_ttl: &Array3<f32>,
        text_mask: &Array3<f32>,
    ) -> Result<Array3<f32>>;

    /// One refinement of the working latent.
    fn denoise_step(&self, input: DenoiseInput<'_>) -> Result<Array3<f32>>;

    /// Waveform `[batch, samples]` for the final latent.
    fn vocode(&self, latent: &Array3<f32>) -> Result<Array2<f32>>;
}

/// Backend sessions plus the numeric constants and token table they need.
#[derive(Clone)]
pub struct LoadedModel {
    pub backend: Arc<dyn InferenceBackend>,
    pub config: ModelConfig,
    pub indexer: Arc<UnicodeIndexer>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("indexer_len", &self.indexer.len())
            .finish()
    }
}

/// Seconds of audio the mock predicts per valid token.
pub const MOCK_SECS_PER_TOKEN: f32 = 0.05;

/// Amplitude of every sample the mock vocoder emits.
pub const MOCK_SAMPLE_VALUE: f32 = 0.1;

/// Deterministic backend for testing.
///
/// Duration is proportional to the number of valid tokens, the encoder
/// returns ones, each denoising step halves the latent and the vocoder emits
/// a constant signal covering every latent frame. Every call is recorded.
#[derive(Debug)]
pub struct MockBackend {
    config: ModelConfig,
    calls: Mutex<Vec<InferenceStage>>,
    fail_at: Option<InferenceStage>,
    delay: Option<(InferenceStage, Duration)>,
    inject_nan: bool,
    fixed_duration: Option<f32>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            config: Self::model_config(),
            calls: Mutex::new(Vec::new()),
            fail_at: None,
            delay: None,
            inject_nan: false,
            fixed_duration: None,
        }
    }

    /// Small model constants: 16 kHz audio, 320 samples per latent frame.
    pub fn model_config() -> ModelConfig {
        ModelConfig {
            ae: AeConfig {
                sample_rate: 16000,
                base_chunk_size: 160,
            },
            ttl: TtlConfig {
                chunk_compress_factor: 2,
                latent_dim: 4,
            },
        }
    }

    /// Fail whenever `stage` is called.
    pub fn with_failure(mut self, stage: InferenceStage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    /// Block the calling thread for `delay` whenever `stage` is called.
    pub fn with_delay(mut self, stage: InferenceStage, delay: Duration) -> Self {
        self.delay = Some((stage, delay));
        self
    }

    /// Predict `secs` for every item instead of the per-token duration.
    pub fn with_duration(mut self, secs: f32) -> Self {
        self.fixed_duration = Some(secs);
        self
    }

    /// Put a NaN into every denoiser output.
    pub fn with_nan(mut self) -> Self {
        self.inject_nan = true;
        self
    }

    /// Wrap into a [`LoadedModel`] with an ASCII identity token table.
    pub fn into_loaded(self) -> LoadedModel {
        Self::loaded(&Arc::new(self))
    }

    /// Like [`MockBackend::into_loaded`], keeping the caller's handle for
    /// inspecting the call log.
    pub fn loaded(mock: &Arc<MockBackend>) -> LoadedModel {
        LoadedModel {
            config: mock.config,
            backend: Arc::clone(mock) as Arc<dyn InferenceBackend>,
            indexer: Arc::new(UnicodeIndexer::identity(128)),
        }
    }

    /// Stages called so far, in order.
    pub fn calls(&self) -> Vec<InferenceStage> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn call_count(&self, stage: InferenceStage) -> usize {
        self.calls().iter().filter(|s| **s == stage).count()
    }

    fn record(&self, stage: InferenceStage) -> Result<()> {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(stage),
            Err(poisoned) => poisoned.into_inner().push(stage),
        }
        if let Some((delayed, delay)) = self.delay
            && delayed == stage
        {
            std::thread::sleep(delay);
        }
        if self.fail_at == Some(stage) {
            return Err(RiddiError::stage(stage.as_str(), "mock failure"));
        }
        Ok(())
    }
}

impl InferenceBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn duration(
        &self,
        _ids: &Array2<i64>,
        _style_dp: &Array3<f32>,
        text_mask: &Array3<f32>,
    ) -> Result<Vec<f32>> {
        self.record(InferenceStage::Duration)?;
        Ok(text_mask
            .axis_iter(Axis(0))
            .map(|item| {
                self.fixed_duration
                    .unwrap_or_else(|| item.sum() * MOCK_SECS_PER_TOKEN)
            })
            .collect())
    }

    fn encode(
        &self,
        ids: &Array2<i64>,
        _style_ttl: &Array3<f32>,
        _text_mask: &Array3<f32>,
    ) -> Result<Array3<f32>> {
        self.record(InferenceStage::Encode)?;
        Ok(Array3::ones((ids.nrows(), self.config.ttl.latent_dim, ids.ncols())))
    }

    fn denoise_step(&self, input: DenoiseInput<'_>) -> Result<Array3<f32>> {
        self.record(InferenceStage::Denoise)?;
        let mut next = input.latent * 0.5;
        if self.inject_nan
            && let Some(first) = next.iter_mut().next()
        {
            *first = f32::NAN;
        }
        Ok(next)
    }

    fn vocode(&self, latent: &Array3<f32>) -> Result<Array2<f32>> {
        self.record(InferenceStage::Vocode)?;
        let samples = latent.shape()[2] * self.config.latent_chunk_size();
        Ok(Array2::from_elem((latent.shape()[0], samples), MOCK_SAMPLE_VALUE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::tokenizer::length_to_mask;

    #[test]
    fn mock_duration_scales_with_valid_tokens() {
        let mock = MockBackend::new();
        let ids = Array2::<i64>::zeros((2, 10));
        let mask = length_to_mask(&[10, 4], None);
        let style = Array3::<f32>::zeros((1, 1, 1));
        let durations = mock.duration(&ids, &style, &mask).unwrap();
        assert!((durations[0] - 0.5).abs() < 1e-6);
        assert!((durations[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn mock_records_calls_in_order() {
        let mock = MockBackend::new();
        let ids = Array2::<i64>::zeros((1, 3));
        let mask = length_to_mask(&[3], None);
        let style = Array3::<f32>::zeros((1, 1, 1));
        let latent = Array3::<f32>::ones((1, 8, 2));
        let latent_mask = length_to_mask(&[2], None);

        mock.duration(&ids, &style, &mask).unwrap();
        let emb = mock.encode(&ids, &style, &mask).unwrap();
        mock.denoise_step(DenoiseInput {
            latent: &latent,
            text_emb: &emb,
            style_ttl: &style,
            latent_mask: &latent_mask,
            text_mask: &mask,
            step: 0,
            total_steps: 1,
        })
        .unwrap();
        let wav = mock.vocode(&latent).unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                InferenceStage::Duration,
                InferenceStage::Encode,
                InferenceStage::Denoise,
                InferenceStage::Vocode
            ]
        );
        assert_eq!(wav.shape(), &[1, 640]);
    }

    #[test]
    fn mock_failure_names_the_stage() {
        let mock = MockBackend::new().with_failure(InferenceStage::Vocode);
        let err = mock.vocode(&Array3::zeros((1, 8, 1))).unwrap_err();
        assert_eq!(err.to_string(), "Inference stage vocoder failed: mock failure");
        assert_eq!(mock.call_count(InferenceStage::Vocode), 1);
    }

    #[test]
    fn backend_trait_is_object_safe() {
        let loaded = MockBackend::new().into_loaded();
        assert_eq!(loaded.backend.name(), "mock");
        assert_eq!(loaded.config.sample_rate(), 16000);
        assert!(format!("{loaded:?}").contains("mock"));
    }
}
