//! Voice style conditioning tensors and their loader.
//!
//! A voice style is a pair of tensors, `style_ttl` (consumed by the text
//! encoder and denoiser) and `style_dp` (consumed by the duration predictor),
//! each shaped `[batch, rows, cols]`. Styles are stored as JSON:
//!
//! ```json
//! { "style_ttl": { "dims": [1, 50, 256], "data": [[[...]]] },
//!   "style_dp":  { "dims": [1, 8, 16],   "data": [[[...]]] } }
//! ```
//!
//! `data` may be nested per dimension or flat in row-major order.

use crate::error::{Result, RiddiError};
use async_trait::async_trait;
use ndarray::{Array3, Axis, concatenate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Supported voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    M1,
    M2,
    F1,
    F2,
}

impl Voice {
    pub const ALL: [Voice; 4] = [Voice::M1, Voice::M2, Voice::F1, Voice::F2];

    pub fn id(&self) -> &'static str {
        match self {
            Voice::M1 => "M1",
            Voice::M2 => "M2",
            Voice::F1 => "F1",
            Voice::F2 => "F2",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Voice::M1 => "Male voice 1",
            Voice::M2 => "Male voice 2",
            Voice::F1 => "Female voice 1",
            Voice::F2 => "Female voice 2",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Voice {
    type Err = RiddiError;

    fn from_str(s: &str) -> Result<Self> {
        Voice::ALL
            .into_iter()
            .find(|v| v.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RiddiError::InvalidSettings {
                key: "voice".to_string(),
                message: format!("unknown voice '{s}', expected one of M1, M2, F1, F2"),
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TensorData {
    Nested(Vec<Vec<Vec<f32>>>),
    Flat(Vec<f32>),
}

#[derive(Debug, Deserialize)]
struct TensorJson {
    dims: Vec<usize>,
    data: TensorData,
}

#[derive(Debug, Deserialize)]
struct StyleJson {
    style_ttl: TensorJson,
    style_dp: TensorJson,
}

/// Conditioning tensors for one or more voices, stacked on the batch axis.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceStyle {
    pub ttl: Array3<f32>,
    pub dp: Array3<f32>,
}

impl VoiceStyle {
    /// Parse a style JSON resource.
    pub fn from_json(voice: &str, bytes: &[u8]) -> Result<Self> {
        let parsed: StyleJson = serde_json::from_slice(bytes).map_err(|e| style_error(voice, e))?;
        Ok(Self {
            ttl: tensor_from_json(voice, "style_ttl", parsed.style_ttl)?,
            dp: tensor_from_json(voice, "style_dp", parsed.style_dp)?,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.ttl.shape()[0]
    }

    /// Concatenate styles along the batch axis.
    ///
    /// Every style must agree on the non-batch dimensions of both tensors.
    pub fn stack(voices: &[&str], styles: &[&VoiceStyle]) -> Result<Self> {
        let Some(first) = styles.first() else {
            return Err(style_error("", "no voices requested"));
        };
        for (voice, style) in voices.iter().zip(styles) {
            if style.ttl.shape()[1..] != first.ttl.shape()[1..]
                || style.dp.shape()[1..] != first.dp.shape()[1..]
            {
                return Err(style_error(
                    voice,
                    format!(
                        "shape mismatch: style_ttl {:?} / style_dp {:?} vs {:?} / {:?}",
                        style.ttl.shape(),
                        style.dp.shape(),
                        first.ttl.shape(),
                        first.dp.shape()
                    ),
                ));
            }
        }
        let ttl_views: Vec<_> = styles.iter().map(|s| s.ttl.view()).collect();
        let dp_views: Vec<_> = styles.iter().map(|s| s.dp.view()).collect();
        let joined = voices.join(",");
        Ok(Self {
            ttl: concatenate(Axis(0), &ttl_views).map_err(|e| style_error(&joined, e))?,
            dp: concatenate(Axis(0), &dp_views).map_err(|e| style_error(&joined, e))?,
        })
    }
}

fn style_error(voice: &str, err: impl fmt::Display) -> RiddiError {
    RiddiError::StyleLoad {
        voice: voice.to_string(),
        message: err.to_string(),
    }
}

fn tensor_from_json(voice: &str, name: &str, tensor: TensorJson) -> Result<Array3<f32>> {
    let &[b, r, c] = tensor.dims.as_slice() else {
        return Err(style_error(
            voice,
            format!("{name} must have 3 dims, got {:?}", tensor.dims),
        ));
    };
    let flat: Vec<f32> = match tensor.data {
        TensorData::Flat(values) => values,
        TensorData::Nested(batches) => batches.into_iter().flatten().flatten().collect(),
    };
    Array3::from_shape_vec((b, r, c), flat).map_err(|e| style_error(voice, format!("{name}: {e}")))
}

/// Where voice style JSON comes from.
#[async_trait]
pub trait StyleSource: Send + Sync {
    async fn fetch(&self, voice: &str) -> Result<Vec<u8>>;
}

/// Reads `<dir>/<voice>.json`.
#[derive(Debug, Clone)]
pub struct FileStyleSource {
    dir: PathBuf,
}

impl FileStyleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl StyleSource for FileStyleSource {
    async fn fetch(&self, voice: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(format!("{voice}.json"));
        tokio::fs::read(&path)
            .await
            .map_err(|e| style_error(voice, format!("{}: {e}", path.display())))
    }
}

/// In-memory style resources that count fetches.
#[derive(Debug, Default)]
pub struct MemoryStyleSource {
    styles: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemoryStyleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_style(mut self, voice: &str, json: impl Into<Vec<u8>>) -> Self {
        self.styles.insert(voice.to_string(), json.into());
        self
    }

    /// Register a style filled with `value`, shaped `[1, ttl_rows, ttl_cols]`
    /// and `[1, dp_rows, dp_cols]`.
    pub fn with_constant_style(
        self,
        voice: &str,
        ttl: (usize, usize),
        dp: (usize, usize),
        value: f32,
    ) -> Self {
        let json = serde_json::json!({
            "style_ttl": { "dims": [1, ttl.0, ttl.1], "data": vec![value; ttl.0 * ttl.1] },
            "style_dp": { "dims": [1, dp.0, dp.1], "data": vec![value; dp.0 * dp.1] },
        });
        self.with_style(voice, json.to_string())
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StyleSource for MemoryStyleSource {
    async fn fetch(&self, voice: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.styles
            .get(voice)
            .cloned()
            .ok_or_else(|| style_error(voice, "style resource not found"))
    }
}

/// Loads voice styles, keeping the most recent one cached.
pub struct StyleLoader {
    source: Arc<dyn StyleSource>,
    cached: Mutex<Option<(String, Arc<VoiceStyle>)>>,
}

impl StyleLoader {
    pub fn new(source: Arc<dyn StyleSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Load `voice`, reusing the cached style when the id is unchanged.
    pub async fn load(&self, voice: &str) -> Result<Arc<VoiceStyle>> {
        let mut cached = self.cached.lock().await;
        if let Some((id, style)) = cached.as_ref()
            && id == voice
        {
            return Ok(Arc::clone(style));
        }

        let bytes = self.source.fetch(voice).await?;
        let style = Arc::new(VoiceStyle::from_json(voice, &bytes)?);
        tracing::info!(
            voice,
            ttl = ?style.ttl.shape(),
            dp = ?style.dp.shape(),
            "Loaded voice style"
        );
        *cached = Some((voice.to_string(), Arc::clone(&style)));
        Ok(style)
    }

    /// Load several voices and stack them into one batch.
    ///
    /// Bypasses the single-voice cache.
    pub async fn load_batch(&self, voices: &[&str]) -> Result<VoiceStyle> {
        let mut styles = Vec::with_capacity(voices.len());
        for voice in voices {
            let bytes = self.source.fetch(voice).await?;
            styles.push(VoiceStyle::from_json(voice, &bytes)?);
        }
        let refs: Vec<&VoiceStyle> = styles.iter().collect();
        VoiceStyle::stack(voices, &refs)
    }

    /// Voice id of the cached style, if any.
    pub async fn cached_voice(&self) -> Option<String> {
        self.cached.lock().await.as_ref().map(|(id, _)| id.clone())
    }
}
