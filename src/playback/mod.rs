//! Playback state and chunk sequencing.

pub mod sequencer;
pub mod state;

pub use sequencer::{PlayOutcome, PlaybackSequencer};
pub use state::{PlaybackState, PlaybackStatus};
