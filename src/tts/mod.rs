//! On-device neural speech synthesis.

pub mod backend;
pub mod latent;
pub mod model_config;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pipeline;
pub mod style;
pub mod tokenizer;

pub use backend::{DenoiseInput, InferenceBackend, InferenceStage, LoadedModel, MockBackend};
pub use model_config::{ModelConfig, ModelPaths};
#[cfg(feature = "onnx")]
pub use onnx::OnnxBackend;
pub use pipeline::{InferenceObserver, InferenceOutput, InferencePipeline, NoopObserver};
pub use style::{FileStyleSource, MemoryStyleSource, StyleLoader, StyleSource, Voice, VoiceStyle};
pub use tokenizer::UnicodeIndexer;
