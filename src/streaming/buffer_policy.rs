//! Adaptive look-ahead sizing.
//!
//! Short chunks yield short audio, which plays out faster than the next chunk
//! can be synthesized. The policy buffers deeper whenever upcoming text or
//! recently produced audio is short.

use crate::defaults;
use crate::text::chunker::TextChunk;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPolicy {
    /// A first chunk at least this long starts playback after one chunk.
    pub long_chunk_chars: usize,
    /// Upcoming chunks shorter than this count as short.
    pub short_chunk_chars: usize,
    /// Recent average audio below this deepens the buffer.
    pub short_audio_secs: f32,
    pub steady_depth: usize,
    pub deep_depth: usize,
    /// Upcoming chunks inspected.
    pub lookahead_window: usize,
    /// Recent durations averaged.
    pub recent_window: usize,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            long_chunk_chars: defaults::LONG_CHUNK_CHARS,
            short_chunk_chars: defaults::SHORT_CHUNK_CHARS,
            short_audio_secs: defaults::SHORT_AUDIO_SECS,
            steady_depth: defaults::STEADY_BUFFER_DEPTH,
            deep_depth: defaults::DEEP_BUFFER_DEPTH,
            lookahead_window: defaults::LOOKAHEAD_WINDOW,
            recent_window: defaults::RECENT_WINDOW,
        }
    }
}

impl BufferPolicy {
    /// Chunks to synthesize before the first one starts playing.
    pub fn initial_lookahead(&self, chunks: &[TextChunk]) -> usize {
        let Some(first) = chunks.first() else {
            return 0;
        };
        let wanted = if first.len() >= self.long_chunk_chars {
            1
        } else {
            2
        };
        wanted.min(chunks.len())
    }

    /// Buffer depth to hold given the not-yet-synthesized chunks and the
    /// durations of recently produced audio, oldest first.
    pub fn target_depth(&self, upcoming: &[TextChunk], recent_durations: &[f32]) -> usize {
        let short_upcoming = upcoming
            .iter()
            .take(self.lookahead_window)
            .filter(|c| c.len() < self.short_chunk_chars)
            .count();

        let window = self.recent_window.min(recent_durations.len());
        let recent = &recent_durations[recent_durations.len() - window..];
        let short_audio = !recent.is_empty()
            && recent.iter().sum::<f32>() / (recent.len() as f32) < self.short_audio_secs;

        if short_upcoming >= 2 || short_audio {
            self.deep_depth.max(1)
        } else {
            self.steady_depth.max(1)
        }
    }
}
