//! Streaming synthesis: chunk text, synthesize ahead of playback, play in order.
//!
//! ```text
//! ┌─────────┐    ┌────────────┐    ┌──────────┐    ┌───────────┐
//! │ Chunker │───▶│ Inference  │───▶│  Buffer  │───▶│ Sequencer │───▶ device
//! │         │    │ (blocking) │    │ (policy) │    │           │
//! └─────────┘    └────────────┘    └──────────┘    └───────────┘
//!                      │                                 │
//!                      └──────────── events ─────────────┘
//! ```

pub mod buffer_policy;
pub mod coordinator;
pub mod events;
pub mod types;

pub use buffer_policy::BufferPolicy;
pub use coordinator::{CoordinatorConfig, StreamingCoordinator, SynthesisSummary};
pub use events::{EventSink, SynthesisEvent};
pub use types::{PlaybackSettings, SynthesisRequest, SynthesizedChunk};
