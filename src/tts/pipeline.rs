//! The four-stage synthesis pipeline.
//!
//! Stages run strictly in order on tokio's blocking pool: duration
//! prediction, text encoding, `total_steps` latent refinements, vocoding.
//! One inference runs at a time per pipeline. Intermediate tensors are
//! dropped as soon as the next stage no longer needs them.

use crate::defaults;
use crate::error::{Result, RiddiError};
use crate::tts::backend::{DenoiseInput, InferenceStage, LoadedModel};
use crate::tts::latent::{count_non_finite, sample_noisy_latent};
use crate::tts::style::VoiceStyle;
use ndarray::Axis;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};

/// Produces the model on first use.
pub type ModelLoader = Arc<dyn Fn() -> Result<LoadedModel> + Send + Sync>;

/// Hooks the pipeline calls while a batch is in flight.
pub trait InferenceObserver: Send {
    /// Called once per denoising iteration with a 1-based step.
    fn on_progress(&mut self, _step: usize, _total: usize) {}

    /// Called before each stage; an error abandons the batch.
    fn checkpoint(&self) -> Result<()> {
        Ok(())
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl InferenceObserver for NoopObserver {}

/// Result of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    /// Mono samples per item, trimmed to the predicted duration.
    pub waveforms: Vec<Vec<f32>>,
    /// Speed-adjusted predicted duration in seconds per item.
    pub durations: Vec<f32>,
    pub sample_rate: u32,
}

pub struct InferencePipeline {
    loader: ModelLoader,
    model: OnceCell<LoadedModel>,
    rng: Mutex<StdRng>,
    vocoder_timeout: Duration,
}

async fn run_stage<T, F>(stage: InferenceStage, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let output = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RiddiError::stage(stage.as_str(), format!("task panicked: {e}")))??;
    tracing::debug!(
        stage = stage.as_str(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Inference stage finished"
    );
    Ok(output)
}

impl InferencePipeline {
    /// Pipeline that calls `loader` on a blocking thread the first time it
    /// needs the model, then reuses the result.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<LoadedModel> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            model: OnceCell::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            vocoder_timeout: defaults::VOCODER_TIMEOUT,
        }
    }

    /// Pipeline around an already-loaded model.
    pub fn from_model(model: LoadedModel) -> Self {
        let pipeline = Self::new({
            let model = model.clone();
            move || Ok(model.clone())
        });
        // A fresh cell cannot already be set.
        pipeline.model.set(model).ok();
        pipeline
    }

    /// Seed the noise generator for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_vocoder_timeout(mut self, timeout: Duration) -> Self {
        self.vocoder_timeout = timeout;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// The model, loading it on first call.
    pub async fn model(&self) -> Result<&LoadedModel> {
        self.model
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let started = Instant::now();
                let model = tokio::task::spawn_blocking(move || loader())
                    .await
                    .map_err(|e| RiddiError::ModelLoad {
                        path: "<loader>".to_string(),
                        message: format!("loader panicked: {e}"),
                    })??;
                tracing::info!(
                    backend = model.backend.name(),
                    sample_rate = model.config.sample_rate(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Inference model loaded"
                );
                Ok(model)
            })
            .await
    }

    pub async fn sample_rate(&self) -> Result<u32> {
        Ok(self.model().await?.config.sample_rate())
    }

    /// Synthesize a batch of normalized texts.
    pub async fn infer(
        &self,
        texts: &[String],
        style: Arc<VoiceStyle>,
        total_steps: usize,
        speed: f32,
        observer: &mut dyn InferenceObserver,
    ) -> Result<InferenceOutput> {
        if texts.is_empty() {
            return Err(RiddiError::NoContent);
        }
        if style.batch_size() != texts.len() && style.batch_size() != 1 {
            return Err(RiddiError::Other(format!(
                "voice style batch {} does not match {} texts",
                style.batch_size(),
                texts.len()
            )));
        }
        let model = self.model().await?.clone();
        let backend = Arc::clone(&model.backend);
        let mut rng = self.rng.lock().await;

        let batch = model.indexer.encode_batch(texts);
        let batch_size = batch.batch_size();
        let ids = Arc::new(batch.ids);
        let text_mask = Arc::new(batch.mask);

        observer.checkpoint()?;
        let predicted = run_stage(InferenceStage::Duration, {
            let (backend, ids, style, mask) = (
                Arc::clone(&backend),
                Arc::clone(&ids),
                Arc::clone(&style),
                Arc::clone(&text_mask),
            );
            move || backend.duration(&ids, &style.dp, &mask)
        })
        .await?;
        if predicted.len() != batch_size {
            return Err(RiddiError::stage(
                InferenceStage::Duration.as_str(),
                format!("expected {batch_size} durations, got {}", predicted.len()),
            ));
        }
        if let Some(bad) = predicted
            .iter()
            .find(|d| !d.is_finite() || **d / speed > defaults::MAX_CHUNK_SECS)
        {
            return Err(RiddiError::stage(
                InferenceStage::Duration.as_str(),
                format!(
                    "predicted duration {bad}s is outside 0..={}s",
                    defaults::MAX_CHUNK_SECS
                ),
            ));
        }
        let durations: Vec<f32> = predicted.iter().map(|d| d.max(0.0) / speed).collect();

        observer.checkpoint()?;
        let text_emb = Arc::new(
            run_stage(InferenceStage::Encode, {
                let (backend, ids, style, mask) = (
                    Arc::clone(&backend),
                    Arc::clone(&ids),
                    Arc::clone(&style),
                    Arc::clone(&text_mask),
                );
                move || backend.encode(&ids, &style.ttl, &mask)
            })
            .await?,
        );
        drop(ids);

        let (mut latent, latent_mask) = sample_noisy_latent(&durations, &model.config, &mut *rng);
        let latent_mask = Arc::new(latent_mask);
        for step in 0..total_steps {
            observer.checkpoint()?;
            let (backend, emb, style, lmask, tmask) = (
                Arc::clone(&backend),
                Arc::clone(&text_emb),
                Arc::clone(&style),
                Arc::clone(&latent_mask),
                Arc::clone(&text_mask),
            );
            let current = latent;
            latent = run_stage(InferenceStage::Denoise, move || {
                backend.denoise_step(DenoiseInput {
                    latent: &current,
                    text_emb: &emb,
                    style_ttl: &style.ttl,
                    latent_mask: &lmask,
                    text_mask: &tmask,
                    step,
                    total_steps,
                })
            })
            .await?;

            let bad = count_non_finite(&latent);
            if bad > 0 {
                tracing::warn!(
                    step = step + 1,
                    total_steps,
                    non_finite = bad,
                    "Denoiser produced non-finite values"
                );
            }
            observer.on_progress(step + 1, total_steps);
        }
        drop(text_emb);
        drop(latent_mask);
        drop(text_mask);

        observer.checkpoint()?;
        let seconds = self.vocoder_timeout.as_secs();
        let wav = tokio::time::timeout(
            self.vocoder_timeout,
            run_stage(InferenceStage::Vocode, move || backend.vocode(&latent)),
        )
        .await
        .map_err(|_| RiddiError::VocoderTimeout { seconds })??;

        let sample_rate = model.config.sample_rate();
        let waveforms = wav
            .axis_iter(Axis(0))
            .zip(&durations)
            .map(|(row, &secs)| {
                let keep = ((secs * sample_rate as f32) as usize).min(row.len());
                row.iter().take(keep).copied().collect()
            })
            .collect();

        Ok(InferenceOutput {
            waveforms,
            durations,
            sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::backend::{MOCK_SAMPLE_VALUE, MOCK_SECS_PER_TOKEN, MockBackend};
    use ndarray::Array3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn style() -> Arc<VoiceStyle> {
        Arc::new(VoiceStyle {
            ttl: Array3::zeros((1, 2, 4)),
            dp: Array3::zeros((1, 1, 4)),
        })
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[derive(Default)]
    struct Recorder {
        progress: Vec<(usize, usize)>,
        allow_checkpoints: Option<usize>,
        checkpoints: AtomicUsize,
    }

    impl InferenceObserver for Recorder {
        fn on_progress(&mut self, step: usize, total: usize) {
            self.progress.push((step, total));
        }

        fn checkpoint(&self) -> Result<()> {
            let seen = self.checkpoints.fetch_add(1, Ordering::SeqCst);
            match self.allow_checkpoints {
                Some(limit) if seen >= limit => Err(RiddiError::Cancelled { request_id: 9 }),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn unbounded_duration_fails_the_batch() {
        for secs in [f32::INFINITY, f32::NAN, 1.0e9] {
            let mock = Arc::new(MockBackend::new().with_duration(secs));
            let pipeline = InferencePipeline::from_model(MockBackend::loaded(&mock));

            let err = pipeline
                .infer(&texts(&["Hi."]), style(), 2, 1.0, &mut NoopObserver)
                .await
                .unwrap_err();
            assert!(
                matches!(err, RiddiError::Stage { stage: "duration_predictor", .. }),
                "{secs}: {err}"
            );
            assert_eq!(mock.calls(), vec![InferenceStage::Duration]);
        }
    }

    #[tokio::test]
    async fn single_step_calls_each_stage_once_in_order() {
        let mock = Arc::new(MockBackend::new());
        let pipeline = InferencePipeline::from_model(MockBackend::loaded(&mock)).with_seed(1);

        let output = pipeline
            .infer(&texts(&["Hello world."]), style(), 1, 1.0, &mut NoopObserver)
            .await
            .unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                InferenceStage::Duration,
                InferenceStage::Encode,
                InferenceStage::Denoise,
                InferenceStage::Vocode
            ]
        );
        assert_eq!(output.waveforms.len(), 1);
        assert_eq!(output.sample_rate, 16000);
    }

    #[tokio::test]
    async fn progress_fires_once_per_step() {
        let mock = Arc::new(MockBackend::new());
        let pipeline = InferencePipeline::from_model(MockBackend::loaded(&mock));
        let mut recorder = Recorder::default();

        pipeline
            .infer(&texts(&["Hi."]), style(), 3, 1.0, &mut recorder)
            .await
            .unwrap();

        assert_eq!(recorder.progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(mock.call_count(InferenceStage::Denoise), 3);
    }

    #[tokio::test]
    async fn waveform_is_trimmed_to_predicted_duration() {
        let pipeline = InferencePipeline::from_model(MockBackend::new().into_loaded());
        let output = pipeline
            .infer(&texts(&["Hello"]), style(), 2, 1.0, &mut NoopObserver)
            .await
            .unwrap();

        let expected_secs = 5.0 * MOCK_SECS_PER_TOKEN;
        assert!((output.durations[0] - expected_secs).abs() < 1e-6);
        let expected_len = (output.durations[0] * 16000.0) as usize;
        assert_eq!(output.waveforms[0].len(), expected_len);
        assert!(output.waveforms[0].iter().all(|&s| s == MOCK_SAMPLE_VALUE));
    }

    #[tokio::test]
    async fn speed_divides_duration() {
        let pipeline = InferencePipeline::from_model(MockBackend::new().into_loaded());
        let normal = pipeline
            .infer(&texts(&["Hello there"]), style(), 1, 1.0, &mut NoopObserver)
            .await
            .unwrap();
        let fast = pipeline
            .infer(&texts(&["Hello there"]), style(), 1, 2.0, &mut NoopObserver)
            .await
            .unwrap();
        assert!((fast.durations[0] * 2.0 - normal.durations[0]).abs() < 1e-5);
        assert!(fast.waveforms[0].len() < normal.waveforms[0].len());
    }

    #[tokio::test]
    async fn batch_items_keep_their_own_lengths() {
        let pipeline = InferencePipeline::from_model(MockBackend::new().into_loaded());
        let output = pipeline
            .infer(&texts(&["A long sentence.", "Short."]), style(), 1, 1.0, &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(output.waveforms.len(), 2);
        assert!(output.waveforms[0].len() > output.waveforms[1].len());
    }

    #[tokio::test]
    async fn non_finite_denoiser_output_is_not_fatal() {
        let pipeline = InferencePipeline::from_model(MockBackend::new().with_nan().into_loaded());
        let result = pipeline
            .infer(&texts(&["Hello."]), style(), 2, 1.0, &mut NoopObserver)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn stage_failure_stops_later_stages() {
        let mock = Arc::new(MockBackend::new().with_failure(InferenceStage::Encode));
        let pipeline = InferencePipeline::from_model(MockBackend::loaded(&mock));

        let err = pipeline
            .infer(&texts(&["Hello."]), style(), 2, 1.0, &mut NoopObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, RiddiError::Stage { stage: "text_encoder", .. }));
        assert_eq!(mock.call_count(InferenceStage::Denoise), 0);
        assert_eq!(mock.call_count(InferenceStage::Vocode), 0);
    }

    #[tokio::test]
    async fn failed_checkpoint_abandons_remaining_stages() {
        let mock = Arc::new(MockBackend::new());
        let pipeline = InferencePipeline::from_model(MockBackend::loaded(&mock));
        let mut recorder = Recorder {
            allow_checkpoints: Some(2),
            ..Recorder::default()
        };

        let err = pipeline
            .infer(&texts(&["Hello."]), style(), 4, 1.0, &mut recorder)
            .await
            .unwrap_err();

        assert!(matches!(err, RiddiError::Cancelled { request_id: 9 }));
        assert_eq!(
            mock.calls(),
            vec![InferenceStage::Duration, InferenceStage::Encode]
        );
    }

    #[tokio::test]
    async fn slow_vocoder_times_out() {
        let mock = MockBackend::new().with_delay(InferenceStage::Vocode, Duration::from_millis(500));
        let pipeline = InferencePipeline::from_model(mock.into_loaded())
            .with_vocoder_timeout(Duration::from_millis(50));

        let err = pipeline
            .infer(&texts(&["Hello."]), style(), 1, 1.0, &mut NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, RiddiError::VocoderTimeout { .. }));
    }

    #[tokio::test]
    async fn model_is_loaded_lazily_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let pipeline = InferencePipeline::new({
            let loads = Arc::clone(&loads);
            move || {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(MockBackend::new().into_loaded())
            }
        });
        assert!(!pipeline.is_loaded());

        for _ in 0..3 {
            pipeline
                .infer(&texts(&["Hi."]), style(), 1, 1.0, &mut NoopObserver)
                .await
                .unwrap();
        }
        assert!(pipeline.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loader_failure_surfaces_model_load() {
        let pipeline = InferencePipeline::new(|| {
            Err(RiddiError::ModelLoad {
                path: "/models/vocoder.onnx".to_string(),
                message: "file not found".to_string(),
            })
        });
        let err = pipeline
            .infer(&texts(&["Hi."]), style(), 1, 1.0, &mut NoopObserver)
            .await
            .unwrap_err();
        assert!(err.is_fatal_to_session());
    }

    #[tokio::test]
    async fn empty_batch_is_no_content() {
        let pipeline = InferencePipeline::from_model(MockBackend::new().into_loaded());
        let err = pipeline
            .infer(&[], style(), 1, 1.0, &mut NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, RiddiError::NoContent));
    }

    #[tokio::test]
    async fn same_seed_reproduces_output() {
        let a = InferencePipeline::from_model(MockBackend::new().into_loaded()).with_seed(4);
        let b = InferencePipeline::from_model(MockBackend::new().into_loaded()).with_seed(4);
        let out_a = a
            .infer(&texts(&["Same."]), style(), 2, 1.0, &mut NoopObserver)
            .await
            .unwrap();
        let out_b = b
            .infer(&texts(&["Same."]), style(), 2, 1.0, &mut NoopObserver)
            .await
            .unwrap();
        assert_eq!(out_a, out_b);
    }
}
