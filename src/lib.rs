//! riddi - Read text aloud with on-device neural speech
//!
//! Text is normalized and chunked, each chunk runs through a four-stage
//! ONNX pipeline, and the audio plays gaplessly while later chunks are
//! still being synthesized. A highlight driver follows the playing chunk
//! word by word on a page model.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod highlight;
pub mod models;
pub mod playback;
pub mod streaming;
pub mod text;
pub mod tts;

// Core seams (text → inference → audio)
pub use audio::output::AudioOutput;
pub use highlight::page::HighlightSurface;
pub use tts::backend::InferenceBackend;
pub use tts::style::StyleSource;

// Session
pub use app::{ReaderSession, ReaderSessionBuilder};
pub use streaming::{
    CoordinatorConfig, EventSink, PlaybackSettings, StreamingCoordinator, SynthesisEvent,
    SynthesisRequest,
};

// Error handling
pub use error::{Result, RiddiError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
