//! Default configuration constants for riddi.
//!
//! Shared by the config layer, the streaming coordinator and the CLI so the
//! tuning values live in one place.

use std::time::Duration;

/// Maximum chunk length in UTF-16 code units.
///
/// Sentences longer than this are still kept whole.
pub const MAX_CHUNK_CHARS: usize = 300;

/// First-chunk length at which a single chunk of look-ahead is enough.
///
/// Shorter first chunks (headings) produce short audio, so two are
/// synthesized before playback starts.
pub const LONG_CHUNK_CHARS: usize = 200;

/// Upcoming chunks below this length count as "short" for buffer sizing.
pub const SHORT_CHUNK_CHARS: usize = 100;

/// Average produced audio below this many seconds deepens the buffer.
pub const SHORT_AUDIO_SECS: f32 = 3.0;

/// Buffer depth used while chunks are long.
pub const STEADY_BUFFER_DEPTH: usize = 2;

/// Buffer depth used while chunks (or their audio) are short.
pub const DEEP_BUFFER_DEPTH: usize = 4;

/// How many not-yet-synthesized chunks the depth policy inspects.
pub const LOOKAHEAD_WINDOW: usize = 3;

/// How many recent chunk durations feed the running average.
pub const RECENT_WINDOW: usize = 3;

/// Longest audio a single chunk may be predicted to need.
pub const MAX_CHUNK_SECS: f32 = 120.0;

/// Hard ceiling on a single vocoder call.
pub const VOCODER_TIMEOUT: Duration = Duration::from_secs(120);

/// Default playback speed multiplier.
pub const DEFAULT_SPEED: f32 = 1.05;

/// Default number of denoising steps.
pub const DEFAULT_STEPS: usize = 5;

/// Supported speed range (inclusive).
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Upper bound on denoising steps accepted from settings.
pub const MAX_STEPS: usize = 64;

/// Silence inserted between chunks when exporting a rendered WAV.
pub const EXPORT_SILENCE_SECS: f32 = 0.3;

/// Minimum time each highlighted word stays active.
pub const MIN_WORD_MS: u64 = 100;

/// Extra dwell after sentence-final punctuation, as a fraction of a word slot.
pub const SENTENCE_PAUSE_FACTOR: f32 = 0.25;

/// Token id used for codepoints missing from the indexer table.
pub const UNKNOWN_TOKEN_ID: i64 = -1;

/// Report the inference execution provider compiled into this build.
pub fn inference_backend() -> &'static str {
    if cfg!(feature = "onnx") {
        "ONNX Runtime (CPU)"
    } else {
        "none"
    }
}
