//! ONNX Runtime backend.
//!
//! Each of the four stages is a separate `.onnx` graph. Sessions are created
//! once when the model directory is loaded and reused for every chunk.

use crate::error::{Result, RiddiError};
use crate::tts::backend::{DenoiseInput, InferenceBackend, InferenceStage, LoadedModel};
use crate::tts::model_config::{ModelConfig, ModelPaths};
use crate::tts::tokenizer::UnicodeIndexer;
use ndarray::{Array1, Array2, Array3, Ix3};
use ort::inputs;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use std::fmt::Display;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct OnnxBackend {
    duration: Mutex<Session>,
    encoder: Mutex<Session>,
    denoiser: Mutex<Session>,
    vocoder: Mutex<Session>,
}

fn load_error(path: &Path, err: impl Display) -> RiddiError {
    RiddiError::ModelLoad {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn stage_error(stage: InferenceStage) -> impl Fn(ort::Error) -> RiddiError {
    move |e| RiddiError::stage(stage.as_str(), e)
}

fn open_session(path: &Path) -> Result<Session> {
    if !path.exists() {
        return Err(load_error(path, "file not found"));
    }
    let session = Session::builder()
        .map_err(|e| load_error(path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_error(path, e))?
        .commit_from_file(path)
        .map_err(|e| load_error(path, e))?;
    tracing::info!(path = %path.display(), "Loaded ONNX session");
    Ok(session)
}

fn lock(session: &Mutex<Session>, stage: InferenceStage) -> Result<MutexGuard<'_, Session>> {
    session
        .lock()
        .map_err(|_| RiddiError::stage(stage.as_str(), "session lock poisoned"))
}

impl OnnxBackend {
    /// Create one session per stage from a model directory.
    pub fn load(paths: &ModelPaths) -> Result<Self> {
        Ok(Self {
            duration: Mutex::new(open_session(&paths.duration_predictor())?),
            encoder: Mutex::new(open_session(&paths.text_encoder())?),
            denoiser: Mutex::new(open_session(&paths.denoiser())?),
            vocoder: Mutex::new(open_session(&paths.vocoder())?),
        })
    }

    /// Load sessions, `tts.json` and the token table from `model_dir`.
    pub fn load_model(model_dir: &Path) -> Result<LoadedModel> {
        let paths = ModelPaths::new(model_dir);
        let config = ModelConfig::load(model_dir)?;
        let indexer = UnicodeIndexer::load(&paths.indexer())?;
        let backend = Self::load(&paths)?;
        Ok(LoadedModel {
            backend: Arc::new(backend),
            config,
            indexer: Arc::new(indexer),
        })
    }
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &str {
        "onnx"
    }

    fn duration(
        &self,
        ids: &Array2<i64>,
        style_dp: &Array3<f32>,
        text_mask: &Array3<f32>,
    ) -> Result<Vec<f32>> {
        let stage = InferenceStage::Duration;
        let err = stage_error(stage);
        let mut session = lock(&self.duration, stage)?;
        let outputs = session
            .run(inputs![
                TensorRef::from_array_view(ids.view()).map_err(&err)?,
                TensorRef::from_array_view(style_dp.view()).map_err(&err)?,
                TensorRef::from_array_view(text_mask.view()).map_err(&err)?,
            ])
            .map_err(&err)?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(&err)?;
        Ok(data.to_vec())
    }

    fn encode(
        &self,
        ids: &Array2<i64>,
        style_ttl: &Array3<f32>,
        text_mask: &Array3<f32>,
    ) -> Result<Array3<f32>> {
        let stage = InferenceStage::Encode;
        let err = stage_error(stage);
        let mut session = lock(&self.encoder, stage)?;
        let outputs = session
            .run(inputs![
                TensorRef::from_array_view(ids.view()).map_err(&err)?,
                TensorRef::from_array_view(style_ttl.view()).map_err(&err)?,
                TensorRef::from_array_view(text_mask.view()).map_err(&err)?,
            ])
            .map_err(&err)?;
        let view = outputs[0].try_extract_array::<f32>().map_err(&err)?;
        let emb = view
            .into_dimensionality::<Ix3>()
            .map_err(|e| RiddiError::stage(stage.as_str(), e))?;
        Ok(emb.to_owned())
    }

    fn denoise_step(&self, input: DenoiseInput<'_>) -> Result<Array3<f32>> {
        let stage = InferenceStage::Denoise;
        let err = stage_error(stage);
        let batch = input.latent.shape()[0];
        let current = Array1::<f32>::from_elem(batch, input.step as f32);
        let total = Array1::<f32>::from_elem(batch, input.total_steps as f32);

        let mut session = lock(&self.denoiser, stage)?;
        let outputs = session
            .run(inputs![
                TensorRef::from_array_view(input.latent.view()).map_err(&err)?,
                TensorRef::from_array_view(input.text_emb.view()).map_err(&err)?,
                TensorRef::from_array_view(input.style_ttl.view()).map_err(&err)?,
                TensorRef::from_array_view(input.latent_mask.view()).map_err(&err)?,
                TensorRef::from_array_view(input.text_mask.view()).map_err(&err)?,
                TensorRef::from_array_view(current.view()).map_err(&err)?,
                TensorRef::from_array_view(total.view()).map_err(&err)?,
            ])
            .map_err(&err)?;
        let view = outputs[0].try_extract_array::<f32>().map_err(&err)?;
        let latent = view
            .into_dimensionality::<Ix3>()
            .map_err(|e| RiddiError::stage(stage.as_str(), e))?;
        Ok(latent.to_owned())
    }

    fn vocode(&self, latent: &Array3<f32>) -> Result<Array2<f32>> {
        let stage = InferenceStage::Vocode;
        let err = stage_error(stage);
        let mut session = lock(&self.vocoder, stage)?;
        let outputs = session
            .run(inputs![TensorRef::from_array_view(latent.view()).map_err(&err)?])
            .map_err(&err)?;
        // Vocoders emit either [batch, samples] or [batch, 1, samples].
        let (shape, data) = outputs[0].try_extract_tensor::<f32>().map_err(&err)?;
        let batch = shape.first().copied().unwrap_or(1).max(1) as usize;
        Array2::from_shape_vec((batch, data.len() / batch), data.to_vec())
            .map_err(|e| RiddiError::stage(stage.as_str(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_directory_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxBackend::load_model(dir.path()).unwrap_err();
        assert!(err.is_fatal_to_session());
    }

    #[test]
    fn missing_session_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_session(&dir.path().join("vocoder.onnx")).unwrap_err();
        match err {
            RiddiError::ModelLoad { path, message } => {
                assert!(path.ends_with("vocoder.onnx"));
                assert_eq!(message, "file not found");
            }
            other => panic!("expected ModelLoad, got {other:?}"),
        }
    }
}
