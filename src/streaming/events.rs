//! Events reported to observers of a synthesis request.

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Progress and lifecycle notifications, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SynthesisEvent {
    /// The text was chunked and synthesis is starting.
    Started { request_id: u64, chunks: usize },
    /// One denoising step finished for a chunk (1-based `step`).
    Progress {
        request_id: u64,
        chunk_index: usize,
        step: usize,
        total_steps: usize,
    },
    /// A chunk's audio is ready and buffered.
    ChunkSynthesized {
        request_id: u64,
        index: usize,
        duration_secs: f32,
        elapsed_ms: u64,
    },
    /// A chunk started sounding.
    ChunkPlaying {
        request_id: u64,
        index: usize,
        text: String,
        duration_secs: f32,
    },
    /// Every chunk was played.
    Complete {
        request_id: u64,
        chunks: usize,
        audio_secs: f32,
    },
    /// The request failed. Nothing further follows for this id.
    Error { request_id: u64, message: String },
}

impl SynthesisEvent {
    pub fn request_id(&self) -> u64 {
        match self {
            SynthesisEvent::Started { request_id, .. }
            | SynthesisEvent::Progress { request_id, .. }
            | SynthesisEvent::ChunkSynthesized { request_id, .. }
            | SynthesisEvent::ChunkPlaying { request_id, .. }
            | SynthesisEvent::Complete { request_id, .. }
            | SynthesisEvent::Error { request_id, .. } => *request_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SynthesisEvent::Complete { .. } | SynthesisEvent::Error { .. }
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Non-blocking event fan-out. Without a channel, events are discarded.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<SynthesisEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<SynthesisEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Send without waiting. Full or closed channels drop the event.
    pub fn emit(&self, event: SynthesisEvent) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(request_id = event.request_id(), "Event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
