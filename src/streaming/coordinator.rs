//! Chunk-by-chunk synthesis feeding ordered playback.
//!
//! ```text
//!  text ─▶ chunker ─▶ [synthesize look-ahead] ─▶ buffer ─▶ sequencer ─▶ device
//!                          ▲                                  │
//!                          └──── refill to target depth ◀─────┘
//!                                 while the chunk plays
//! ```
//!
//! One request is active at a time. Every emission and every stage checks the
//! active request id; a superseded request stops at its next checkpoint and
//! discards whatever it had buffered.

use crate::error::{Result, RiddiError};
use crate::playback::sequencer::{PlayOutcome, PlaybackSequencer};
use crate::playback::state::{PlaybackState, PlaybackStatus};
use crate::streaming::buffer_policy::BufferPolicy;
use crate::streaming::events::{EventSink, SynthesisEvent};
use crate::streaming::types::{SynthesisRequest, SynthesizedChunk};
use crate::text::chunker::{TextChunk, TextChunker};
use crate::tts::pipeline::{InferenceObserver, InferencePipeline};
use crate::tts::style::{StyleLoader, VoiceStyle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// No request is active.
const NO_REQUEST: u64 = 0;

/// Tracks the active request and serializes event emission against it.
struct RequestGate {
    active: Mutex<u64>,
    events: EventSink,
}

impl RequestGate {
    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn activate(&self, request_id: u64) {
        *self.lock() = request_id;
    }

    /// Deactivate `request_id` if it is still the active one.
    fn release(&self, request_id: u64) {
        let mut active = self.lock();
        if *active == request_id {
            *active = NO_REQUEST;
        }
    }

    fn deactivate(&self) {
        *self.lock() = NO_REQUEST;
    }

    fn active(&self) -> u64 {
        *self.lock()
    }

    fn check(&self, request_id: u64) -> Result<()> {
        if self.active() == request_id {
            Ok(())
        } else {
            Err(RiddiError::Cancelled { request_id })
        }
    }

    /// Emit only while `event`'s request is active.
    fn emit(&self, event: SynthesisEvent) -> bool {
        let active = self.lock();
        if *active != event.request_id() {
            return false;
        }
        self.events.emit(event);
        true
    }
}

/// Bridges pipeline callbacks to request events and cancellation.
struct ChunkObserver<'a> {
    gate: &'a RequestGate,
    request_id: u64,
    chunk_index: usize,
}

impl InferenceObserver for ChunkObserver<'_> {
    fn on_progress(&mut self, step: usize, total: usize) {
        self.gate.emit(SynthesisEvent::Progress {
            request_id: self.request_id,
            chunk_index: self.chunk_index,
            step,
            total_steps: total,
        });
    }

    fn checkpoint(&self) -> Result<()> {
        self.gate.check(self.request_id)
    }
}

/// What a finished request produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSummary {
    pub request_id: u64,
    pub chunks: usize,
    pub audio_secs: f32,
}

/// Coordinator options.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub chunker: TextChunker,
    pub policy: BufferPolicy,
    /// Send chunks to the sequencer. When false, chunks are only
    /// synthesized (and retained, if enabled).
    pub play_audio: bool,
    /// Keep every finished chunk for later export.
    pub retain_audio: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            chunker: TextChunker::default(),
            policy: BufferPolicy::default(),
            play_audio: true,
            retain_audio: false,
        }
    }
}

/// Owns everything one reading session needs.
pub struct StreamingCoordinator {
    pipeline: Arc<InferencePipeline>,
    styles: Arc<StyleLoader>,
    sequencer: Arc<PlaybackSequencer>,
    state: PlaybackState,
    gate: RequestGate,
    config: CoordinatorConfig,
    rendered: Mutex<Vec<SynthesizedChunk>>,
    next_id: AtomicU64,
}

impl StreamingCoordinator {
    pub fn new(
        pipeline: Arc<InferencePipeline>,
        styles: Arc<StyleLoader>,
        sequencer: Arc<PlaybackSequencer>,
        state: PlaybackState,
        events: EventSink,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            pipeline,
            styles,
            sequencer,
            state,
            gate: RequestGate {
                active: Mutex::new(NO_REQUEST),
                events,
            },
            config,
            rendered: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// A request id not used before by this coordinator.
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Id of the running request, if any.
    pub fn active_request(&self) -> Option<u64> {
        match self.gate.active() {
            NO_REQUEST => None,
            id => Some(id),
        }
    }

    pub fn pause(&self) {
        self.sequencer.pause();
    }

    pub fn resume(&self) {
        self.sequencer.resume();
    }

    /// Toggle between paused and playing.
    pub fn toggle_pause(&self) {
        if self.sequencer.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Cancel the active request and silence playback. Idempotent.
    pub fn stop(&self) {
        self.gate.deactivate();
        self.sequencer.stop();
    }

    /// Chunks retained since the last request started.
    pub fn take_rendered(&self) -> Vec<SynthesizedChunk> {
        std::mem::take(&mut *self.lock_rendered())
    }

    fn lock_rendered(&self) -> std::sync::MutexGuard<'_, Vec<SynthesizedChunk>> {
        self.rendered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `request` to completion, replacing any active request.
    ///
    /// Returns `Cancelled` when the request is stopped or superseded; no
    /// error event is emitted in that case.
    pub async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisSummary> {
        let request_id = request.id;
        if request_id == NO_REQUEST {
            return Err(RiddiError::InvalidSettings {
                key: "request_id".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        request.settings.validate()?;

        self.gate.activate(request_id);
        self.sequencer.stop();
        self.lock_rendered().clear();
        self.state.set(PlaybackStatus::Loading);
        tracing::info!(
            request_id,
            voice = %request.settings.voice,
            speed = request.settings.speed,
            steps = request.settings.steps,
            "Synthesis request started"
        );

        match self.run(&request).await {
            Ok(summary) => {
                if self.gate.emit(SynthesisEvent::Complete {
                    request_id,
                    chunks: summary.chunks,
                    audio_secs: summary.audio_secs,
                }) {
                    self.state.set(PlaybackStatus::Idle);
                }
                self.gate.release(request_id);
                tracing::info!(request_id, chunks = summary.chunks, "Synthesis request complete");
                Ok(summary)
            }
            Err(RiddiError::Cancelled { .. }) => {
                tracing::debug!(request_id, "Synthesis request cancelled");
                Err(RiddiError::Cancelled { request_id })
            }
            Err(err) => {
                let err = match err {
                    RiddiError::Stage { .. }
                    | RiddiError::VocoderTimeout { .. }
                    | RiddiError::AudioOutput { .. }
                    | RiddiError::Other(_) => RiddiError::Synthesis {
                        request_id,
                        message: err.to_string(),
                    },
                    other => other,
                };
                let message = err.to_string();
                if self.gate.emit(SynthesisEvent::Error {
                    request_id,
                    message: message.clone(),
                }) {
                    self.state.set(PlaybackStatus::Error(message));
                }
                self.gate.release(request_id);
                tracing::warn!(request_id, error = %err, "Synthesis request failed");
                Err(err)
            }
        }
    }

    async fn run(&self, request: &SynthesisRequest) -> Result<SynthesisSummary> {
        let request_id = request.id;
        let chunks = self.config.chunker.chunk(&request.text);
        if chunks.is_empty() {
            return Err(RiddiError::NoContent);
        }
        self.gate.emit(SynthesisEvent::Started {
            request_id,
            chunks: chunks.len(),
        });

        let style = self.styles.load(request.settings.voice.id()).await?;
        self.gate.check(request_id)?;
        if !self.sequencer.is_paused() {
            self.state.set(PlaybackStatus::Buffering);
        }

        let mut buffer: VecDeque<SynthesizedChunk> = VecDeque::new();
        let mut next = 0usize;
        let initial = self.config.policy.initial_lookahead(&chunks);
        while next < initial {
            buffer.push_back(self.synthesize_chunk(request, &chunks[next], &style).await?);
            next += 1;
            tokio::task::yield_now().await;
        }

        let mut recent: Vec<f32> = buffer.iter().map(|c| c.duration_secs).collect();
        let mut audio_secs = 0.0f32;
        let mut played = 0usize;

        while let Some(chunk) = buffer.pop_front() {
            self.gate.check(request_id)?;
            if self.config.play_audio {
                self.gate.emit(SynthesisEvent::ChunkPlaying {
                    request_id,
                    index: chunk.index,
                    text: chunk.text.clone(),
                    duration_secs: chunk.duration_secs,
                });
            }

            let target = self
                .config
                .policy
                .target_depth(&chunks[next..], &recent);
            let refill = async {
                let mut produced = Vec::new();
                while buffer.len() + produced.len() < target && next < chunks.len() {
                    produced.push(self.synthesize_chunk(request, &chunks[next], &style).await?);
                    next += 1;
                    tokio::task::yield_now().await;
                }
                Ok::<_, RiddiError>(produced)
            };
            let (outcome, produced) = tokio::join!(self.play_chunk(&chunk), refill);

            let outcome = outcome?;
            let produced = produced?;
            if outcome == PlayOutcome::Stopped {
                return Err(RiddiError::Cancelled { request_id });
            }
            self.gate.check(request_id)?;

            for item in produced {
                recent.push(item.duration_secs);
                buffer.push_back(item);
            }
            audio_secs += chunk.duration_secs;
            played += 1;
            if self.config.retain_audio {
                self.lock_rendered().push(chunk);
            }
            tokio::task::yield_now().await;
        }

        Ok(SynthesisSummary {
            request_id,
            chunks: played,
            audio_secs,
        })
    }

    async fn play_chunk(&self, chunk: &SynthesizedChunk) -> Result<PlayOutcome> {
        if !self.config.play_audio {
            return Ok(PlayOutcome::Finished);
        }
        let outcome = self.sequencer.play(chunk).await?;
        if outcome == PlayOutcome::Finished && self.state.current() == PlaybackStatus::Playing {
            self.state.set(PlaybackStatus::Buffering);
        }
        Ok(outcome)
    }

    async fn synthesize_chunk(
        &self,
        request: &SynthesisRequest,
        chunk: &TextChunk,
        style: &Arc<VoiceStyle>,
    ) -> Result<SynthesizedChunk> {
        let started = Instant::now();
        let mut observer = ChunkObserver {
            gate: &self.gate,
            request_id: request.id,
            chunk_index: chunk.index,
        };
        let output = self
            .pipeline
            .infer(
                std::slice::from_ref(&chunk.text),
                Arc::clone(style),
                request.settings.steps,
                request.settings.speed,
                &mut observer,
            )
            .await?;
        self.gate.check(request.id)?;

        let samples = output.waveforms.into_iter().next().unwrap_or_default();
        let synthesized =
            SynthesizedChunk::new(chunk.index, samples, output.sample_rate, chunk.text.clone());
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            request_id = request.id,
            index = chunk.index,
            duration_secs = synthesized.duration_secs,
            elapsed_ms,
            "Chunk synthesized"
        );
        self.gate.emit(SynthesisEvent::ChunkSynthesized {
            request_id: request.id,
            index: chunk.index,
            duration_secs: synthesized.duration_secs,
            elapsed_ms,
        });
        Ok(synthesized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::SimulatedOutput;
    use crate::streaming::types::PlaybackSettings;
    use crate::tts::backend::{InferenceStage, MockBackend};
    use crate::tts::style::{MemoryStyleSource, Voice};
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    struct Harness {
        coordinator: Arc<StreamingCoordinator>,
        mock: Arc<MockBackend>,
        output: SimulatedOutput,
        events: Receiver<SynthesisEvent>,
    }

    fn harness_with(mock: MockBackend, config: CoordinatorConfig) -> Harness {
        let mock = Arc::new(mock);
        let pipeline =
            Arc::new(InferencePipeline::from_model(MockBackend::loaded(&mock)).with_seed(7));
        let source = MemoryStyleSource::new()
            .with_constant_style("F1", (2, 4), (1, 4), 0.0)
            .with_constant_style("M1", (2, 4), (1, 4), 0.0);
        let styles = Arc::new(StyleLoader::new(Arc::new(source)));
        let state = PlaybackState::new();
        let output = SimulatedOutput::new();
        let sequencer = Arc::new(PlaybackSequencer::new(
            Arc::new(output.clone()),
            state.clone(),
        ));
        let (tx, events) = crossbeam_channel::unbounded();
        let coordinator = Arc::new(StreamingCoordinator::new(
            pipeline,
            styles,
            sequencer,
            state,
            EventSink::new(tx),
            config,
        ));
        Harness {
            coordinator,
            mock,
            output,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with(MockBackend::new(), CoordinatorConfig::default())
    }

    fn request(id: u64, text: &str) -> SynthesisRequest {
        SynthesisRequest::new(
            id,
            text,
            PlaybackSettings {
                steps: 2,
                ..PlaybackSettings::default()
            },
        )
    }

    fn playing_indices(events: &[SynthesisEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                SynthesisEvent::ChunkPlaying { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    const FIVE_PARAGRAPHS: &str = "One.\n\nTwo.\n\nThree.\n\nFour.\n\nFive.";

    #[tokio::test(start_paused = true)]
    async fn chunks_play_in_order_then_complete() {
        let h = harness();
        let summary = h
            .coordinator
            .synthesize(request(1, FIVE_PARAGRAPHS))
            .await
            .unwrap();

        assert_eq!(summary.chunks, 5);
        let events: Vec<_> = h.events.try_iter().collect();
        assert_eq!(playing_indices(&events), vec![0, 1, 2, 3, 4]);
        assert!(events.iter().all(|e| e.request_id() == 1));
        assert!(matches!(events.first(), Some(SynthesisEvent::Started { chunks: 5, .. })));
        assert!(matches!(events.last(), Some(SynthesisEvent::Complete { chunks: 5, .. })));
        assert_eq!(h.output.started(), 5);
        assert_eq!(h.output.finished(), 5);
        assert_eq!(h.coordinator.state().current(), PlaybackStatus::Idle);
        assert_eq!(h.coordinator.active_request(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn short_first_chunk_buffers_two_before_playing() {
        let h = harness();
        h.coordinator
            .synthesize(request(1, FIVE_PARAGRAPHS))
            .await
            .unwrap();

        let events: Vec<_> = h.events.try_iter().collect();
        let first_playing = events
            .iter()
            .position(|e| matches!(e, SynthesisEvent::ChunkPlaying { .. }))
            .unwrap();
        let synthesized_before = events[..first_playing]
            .iter()
            .filter(|e| matches!(e, SynthesisEvent::ChunkSynthesized { .. }))
            .count();
        assert_eq!(synthesized_before, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn long_first_chunk_starts_after_one() {
        let h = harness();
        let long = format!("{}end.", "Lorem ipsum dolor ".repeat(12));
        let text = format!("{long}\n\nShort tail.");
        h.coordinator.synthesize(request(1, &text)).await.unwrap();

        let events: Vec<_> = h.events.try_iter().collect();
        let first_playing = events
            .iter()
            .position(|e| matches!(e, SynthesisEvent::ChunkPlaying { .. }))
            .unwrap();
        let synthesized_before = events[..first_playing]
            .iter()
            .filter(|e| matches!(e, SynthesisEvent::ChunkSynthesized { .. }))
            .count();
        assert_eq!(synthesized_before, 1);
        assert_eq!(playing_indices(&events), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_reported_per_step_and_chunk() {
        let h = harness();
        h.coordinator
            .synthesize(request(1, "First.\n\nSecond."))
            .await
            .unwrap();

        let progress: Vec<(usize, usize, usize)> = h
            .events
            .try_iter()
            .filter_map(|e| match e {
                SynthesisEvent::Progress {
                    chunk_index,
                    step,
                    total_steps,
                    ..
                } => Some((chunk_index, step, total_steps)),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![(0, 1, 2), (0, 2, 2), (1, 1, 2), (1, 2, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_reports_no_content() {
        let h = harness();
        let err = h.coordinator.synthesize(request(4, "  \n\n ")).await.unwrap_err();

        assert!(matches!(err, RiddiError::NoContent));
        let events: Vec<_> = h.events.try_iter().collect();
        assert!(matches!(events.as_slice(), [SynthesisEvent::Error { request_id: 4, .. }]));
        assert!(h.coordinator.state().current().is_error());
        assert!(h.mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stage_failure_aborts_request_with_id() {
        let h = harness_with(
            MockBackend::new().with_failure(InferenceStage::Vocode),
            CoordinatorConfig::default(),
        );
        let err = h
            .coordinator
            .synthesize(request(9, FIVE_PARAGRAPHS))
            .await
            .unwrap_err();

        match &err {
            RiddiError::Synthesis {
                request_id,
                message,
            } => {
                assert_eq!(*request_id, 9);
                assert!(message.contains("vocoder"), "{message}");
            }
            other => panic!("expected Synthesis error, got {other:?}"),
        }
        let events: Vec<_> = h.events.try_iter().collect();
        assert!(matches!(events.last(), Some(SynthesisEvent::Error { request_id: 9, .. })));
        assert!(playing_indices(&events).is_empty());
        assert!(matches!(
            h.coordinator.state().current(),
            PlaybackStatus::Error(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn error_state_clears_on_next_request() {
        let h = harness();
        h.coordinator.synthesize(request(1, "")).await.unwrap_err();
        assert!(h.coordinator.state().current().is_error());

        h.coordinator.synthesize(request(2, "Fine.")).await.unwrap();
        assert_eq!(h.coordinator.state().current(), PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_voice_is_style_load_error() {
        let h = harness();
        let mut req = request(2, "Hello.");
        req.settings.voice = Voice::M2;
        let err = h.coordinator.synthesize(req).await.unwrap_err();
        assert!(matches!(err, RiddiError::StyleLoad { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_settings_are_rejected_up_front() {
        let h = harness();
        let mut req = request(3, "Hello.");
        req.settings.speed = 3.0;
        let err = h.coordinator.synthesize(req).await.unwrap_err();
        assert!(matches!(err, RiddiError::InvalidSettings { .. }));
        assert_eq!(h.events.try_iter().count(), 0);
        assert_eq!(h.coordinator.state().current(), PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn render_only_retains_audio_without_playing() {
        let h = harness_with(
            MockBackend::new(),
            CoordinatorConfig {
                play_audio: false,
                retain_audio: true,
                ..CoordinatorConfig::default()
            },
        );
        h.coordinator
            .synthesize(request(1, FIVE_PARAGRAPHS))
            .await
            .unwrap();

        let rendered = h.coordinator.take_rendered();
        let indices: Vec<usize> = rendered.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(h.output.started(), 0);
        assert!(playing_indices(&h.events.try_iter().collect::<Vec<_>>()).is_empty());
        assert!(h.coordinator.take_rendered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_without_error_event() {
        let h = harness();
        let task = {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move { coordinator.synthesize(request(5, FIVE_PARAGRAPHS)).await })
        };
        loop {
            if h.output.started() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        h.coordinator.stop();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, RiddiError::Cancelled { request_id: 5 }));
        let events: Vec<_> = h.events.try_iter().collect();
        assert!(!events.iter().any(|e| e.is_terminal()));
        assert_eq!(h.coordinator.state().current(), PlaybackStatus::Idle);
        assert!(h.output.aborted() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_request_supersedes_a_running_one() {
        let h = harness();
        let first = {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move { coordinator.synthesize(request(1, FIVE_PARAGRAPHS)).await })
        };
        while h.output.started() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let summary = h
            .coordinator
            .synthesize(request(2, "Fresh.\n\nMore."))
            .await
            .unwrap();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, RiddiError::Cancelled { request_id: 1 }));
        assert_eq!(summary.chunks, 2);

        let events: Vec<_> = h.events.try_iter().collect();
        let first_new = events.iter().position(|e| e.request_id() == 2).unwrap();
        assert!(
            !events[first_new..].iter().any(|e| e.request_id() == 1),
            "superseded request emitted after the new one began: {events:?}"
        );
        let new_playing: Vec<usize> = events[first_new..]
            .iter()
            .filter_map(|e| match e {
                SynthesisEvent::ChunkPlaying {
                    request_id: 2,
                    index,
                    ..
                } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(new_playing, vec![0, 1]);
        assert!(matches!(
            events.last(),
            Some(SynthesisEvent::Complete {
                request_id: 2,
                chunks: 2,
                ..
            })
        ));
        assert_eq!(h.coordinator.state().current(), PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_before_first_chunk_holds_status_and_audio() {
        let h = harness_with(
            MockBackend::new().with_delay(InferenceStage::Duration, Duration::from_millis(50)),
            CoordinatorConfig::default(),
        );
        let task = {
            let coordinator = Arc::clone(&h.coordinator);
            tokio::spawn(async move { coordinator.synthesize(request(3, "One.\n\nTwo.")).await })
        };
        let mut status = h.coordinator.state().subscribe();
        status
            .wait_for(|s| matches!(s, PlaybackStatus::Loading | PlaybackStatus::Buffering))
            .await
            .unwrap();

        h.coordinator.pause();
        assert_eq!(h.coordinator.state().current(), PlaybackStatus::Paused);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.output.started(), 0);
        assert_eq!(h.coordinator.state().current(), PlaybackStatus::Paused);

        h.coordinator.resume();
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.chunks, 2);
        assert_eq!(h.output.started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn request_id_zero_is_rejected() {
        let h = harness();
        assert!(h.coordinator.synthesize(request(0, "Hi.")).await.is_err());
        assert!(h.coordinator.next_request_id() >= 1);
    }
}
