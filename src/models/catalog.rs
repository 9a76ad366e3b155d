//! Model asset catalog.
//!
//! Every file the engine reads from a model directory, where it lives
//! locally and where it is published upstream.

use crate::tts::model_config::{
    CONFIG_FILE, DENOISER_MODEL, DURATION_MODEL, INDEXER_FILE, TEXT_ENCODER_MODEL, VOCODER_MODEL,
    VOICE_STYLES_DIR,
};
use crate::tts::style::Voice;
use std::path::Path;

/// Where assets are downloaded from unless overridden.
pub const DEFAULT_BASE_URL: &str = "https://huggingface.co/Supertone/supertonic/resolve/main";

/// Upstream directory holding the inference graphs and their configs.
const REMOTE_GRAPH_DIR: &str = "onnx";

/// Kind of model asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// JSON model constants.
    Config,
    /// Codepoint to token id table.
    Indexer,
    /// ONNX inference graph.
    Graph,
    /// Voice style tensors.
    VoiceStyle,
}

impl AssetKind {
    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Config => "config",
            AssetKind::Indexer => "indexer",
            AssetKind::Graph => "graph",
            AssetKind::VoiceStyle => "voice",
        }
    }
}

/// One downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAsset {
    pub kind: AssetKind,
    /// Path relative to the local model directory.
    pub local: String,
    /// Path relative to the upstream base URL.
    pub remote: String,
}

impl ModelAsset {
    fn engine_file(kind: AssetKind, name: &str) -> Self {
        Self {
            kind,
            local: name.to_string(),
            remote: format!("{REMOTE_GRAPH_DIR}/{name}"),
        }
    }

    fn voice(voice: Voice) -> Self {
        let path = format!("{VOICE_STYLES_DIR}/{}.json", voice.id());
        Self {
            kind: AssetKind::VoiceStyle,
            local: path.clone(),
            remote: path,
        }
    }

    /// Download URL under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.remote)
    }

    /// Whether the asset exists in `model_dir`.
    pub fn is_installed(&self, model_dir: &Path) -> bool {
        model_dir.join(&self.local).is_file()
    }
}

/// Every asset, engine files first, then one style per supported voice.
pub fn assets() -> Vec<ModelAsset> {
    let mut assets = vec![
        ModelAsset::engine_file(AssetKind::Config, CONFIG_FILE),
        ModelAsset::engine_file(AssetKind::Indexer, INDEXER_FILE),
        ModelAsset::engine_file(AssetKind::Graph, DURATION_MODEL),
        ModelAsset::engine_file(AssetKind::Graph, TEXT_ENCODER_MODEL),
        ModelAsset::engine_file(AssetKind::Graph, DENOISER_MODEL),
        ModelAsset::engine_file(AssetKind::Graph, VOCODER_MODEL),
    ];
    assets.extend(Voice::ALL.into_iter().map(ModelAsset::voice));
    assets
}

/// Installation state of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetStatus {
    pub asset: ModelAsset,
    /// File size on disk, `None` when missing.
    pub size_bytes: Option<u64>,
}

impl AssetStatus {
    pub fn is_installed(&self) -> bool {
        self.size_bytes.is_some()
    }
}

/// Check every catalog asset against `model_dir`.
pub fn check_installed(model_dir: &Path) -> Vec<AssetStatus> {
    assets()
        .into_iter()
        .map(|asset| {
            let size_bytes = std::fs::metadata(model_dir.join(&asset.local))
                .ok()
                .filter(|m| m.is_file())
                .map(|m| m.len());
            AssetStatus { asset, size_bytes }
        })
        .collect()
}

/// Assets absent from `model_dir`.
pub fn missing_assets(model_dir: &Path) -> Vec<ModelAsset> {
    assets()
        .into_iter()
        .filter(|asset| !asset.is_installed(model_dir))
        .collect()
}

/// Format asset status for display.
pub fn format_status(status: &AssetStatus) -> String {
    let state = match status.size_bytes {
        Some(bytes) => format!("[installed, {:.1} MB]", bytes as f64 / 1_048_576.0),
        None => "[not installed]".to_string(),
    };
    format!(
        "{:8} {:32} {}",
        status.asset.kind.label(),
        status.asset.local,
        state
    )
}
