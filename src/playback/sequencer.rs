//! Strictly ordered playback of synthesized chunks.
//!
//! The sequencer owns the audio output. `play` resolves when a chunk's slot
//! ends: naturally when the device finishes, or after the remaining slot time
//! when the chunk was cut short by `pause`. Audio discarded by `pause` is
//! never replayed.

use crate::audio::output::AudioOutput;
use crate::error::{Result, RiddiError};
use crate::playback::state::{PlaybackState, PlaybackStatus};
use crate::streaming::types::SynthesizedChunk;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The chunk's slot ran to its end.
    Finished,
    /// `stop` was called.
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Control {
    generation: u64,
    paused: bool,
}

pub struct PlaybackSequencer {
    output: Arc<dyn AudioOutput>,
    state: PlaybackState,
    control: watch::Sender<Control>,
    next_index: AtomicUsize,
}

impl PlaybackSequencer {
    pub fn new(output: Arc<dyn AudioOutput>, state: PlaybackState) -> Self {
        let (control, _) = watch::channel(Control::default());
        Self {
            output,
            state,
            control,
            next_index: AtomicUsize::new(0),
        }
    }

    pub fn output_name(&self) -> &str {
        self.output.name()
    }

    pub fn is_paused(&self) -> bool {
        self.control.borrow().paused
    }

    /// Index the next `play` call must carry.
    pub fn next_index(&self) -> usize {
        self.next_index.load(Ordering::SeqCst)
    }

    /// Sound `chunk` and wait for its slot to end.
    ///
    /// Chunks must arrive in index order starting at 0 after construction
    /// or `stop`.
    pub async fn play(&self, chunk: &SynthesizedChunk) -> Result<PlayOutcome> {
        let expected = self.next_index();
        if chunk.index != expected {
            return Err(RiddiError::Other(format!(
                "chunk {} played out of order, expected {expected}",
                chunk.index
            )));
        }

        let mut control_rx = self.control.subscribe();
        let generation = control_rx.borrow_and_update().generation;
        if !self.wait_unpaused(&mut control_rx, generation).await {
            return Ok(PlayOutcome::Stopped);
        }

        let mut sounding = Some(
            self.output
                .start(Arc::clone(&chunk.samples), chunk.sample_rate)?,
        );
        self.state.set(PlaybackStatus::Playing);
        let mut remaining = Duration::from_secs_f32(chunk.duration_secs.max(0.0));

        loop {
            let segment_start = Instant::now();
            let ended = match sounding.as_mut() {
                Some(completion) => tokio::select! {
                    done = completion => Some(done.is_ok()),
                    _ = control_rx.changed() => None,
                },
                None => tokio::select! {
                    _ = tokio::time::sleep(remaining) => Some(true),
                    _ = control_rx.changed() => None,
                },
            };
            remaining = remaining.saturating_sub(segment_start.elapsed());

            match ended {
                Some(true) => {
                    self.next_index.fetch_add(1, Ordering::SeqCst);
                    return Ok(PlayOutcome::Finished);
                }
                // Cut off by the device; wait out the rest of the slot.
                Some(false) => sounding = None,
                None => {}
            }

            let control = *control_rx.borrow_and_update();
            if control.generation != generation {
                return Ok(PlayOutcome::Stopped);
            }
            if control.paused {
                sounding = None;
                if !self.wait_unpaused(&mut control_rx, generation).await {
                    return Ok(PlayOutcome::Stopped);
                }
                self.state.set(PlaybackStatus::Playing);
            }
        }
    }

    /// Wait until not paused. False if `stop` happened meanwhile.
    async fn wait_unpaused(&self, rx: &mut watch::Receiver<Control>, generation: u64) -> bool {
        loop {
            let control = *rx.borrow_and_update();
            if control.generation != generation {
                return false;
            }
            if !control.paused {
                return true;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Silence the active chunk now and hold further playback.
    pub fn pause(&self) {
        let changed = self.control.send_if_modified(|c| {
            let was_paused = c.paused;
            c.paused = true;
            !was_paused
        });
        if changed {
            self.output.abort();
            self.output.suspend();
            self.state.set(PlaybackStatus::Paused);
            tracing::debug!("Playback paused");
        }
    }

    pub fn resume(&self) {
        let changed = self.control.send_if_modified(|c| {
            let was_paused = c.paused;
            c.paused = false;
            was_paused
        });
        if changed {
            self.output.resume();
            self.state.set(PlaybackStatus::Playing);
            tracing::debug!("Playback resumed");
        }
    }

    /// Abort active audio, end every pending `play` and reset ordering.
    /// Safe to call repeatedly.
    pub fn stop(&self) {
        self.control.send_modify(|c| {
            c.generation += 1;
            c.paused = false;
        });
        self.output.abort();
        self.output.resume();
        self.next_index.store(0, Ordering::SeqCst);
        self.state.set(PlaybackStatus::Idle);
    }
}
