//! Audio output and WAV export.

#[cfg(feature = "cpal-audio")]
pub mod device;
pub mod output;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use device::{CpalOutput, list_output_devices};
pub use output::{AudioOutput, ClipCompletion, OutputEvent, SimulatedOutput};
pub use wav::{WavHeader, concat_with_silence, encode_wav, write_wav};
