//! Audio output devices.

use crate::error::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Resolves with `Ok(())` when a clip finishes naturally and with an error
/// when it was aborted.
pub type ClipCompletion = oneshot::Receiver<()>;

/// A device that sounds one mono clip at a time.
///
/// Implementations must be cheap to call from async code; none of these
/// methods block on playback.
pub trait AudioOutput: Send + Sync {
    fn name(&self) -> &str;

    /// Start sounding `samples`, replacing any active clip.
    fn start(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<ClipCompletion>;

    /// Silence the active clip immediately. Its completion never fires.
    fn abort(&self);

    /// Suspend the device clock.
    fn suspend(&self);

    /// Resume the device clock.
    fn resume(&self);
}

/// Something that happened on a [`SimulatedOutput`].
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Started { samples: usize, sample_rate: u32 },
    Finished,
    Aborted,
    Suspended,
    Resumed,
}

#[derive(Default)]
struct SimulatedState {
    events: Vec<OutputEvent>,
    active: Option<(u64, JoinHandle<()>)>,
    next_clip: u64,
    suspended: bool,
}

/// Clocked stand-in for a sound card.
///
/// A started clip "plays" for exactly its duration on the tokio clock, so
/// tests with a paused clock run instantly and deterministically.
#[derive(Clone, Default)]
pub struct SimulatedOutput {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SimulatedState) -> R) -> R {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.with_state(|s| s.events.clone())
    }

    pub fn started(&self) -> usize {
        self.count(|e| matches!(e, OutputEvent::Started { .. }))
    }

    pub fn finished(&self) -> usize {
        self.count(|e| matches!(e, OutputEvent::Finished))
    }

    pub fn aborted(&self) -> usize {
        self.count(|e| matches!(e, OutputEvent::Aborted))
    }

    pub fn is_suspended(&self) -> bool {
        self.with_state(|s| s.suspended)
    }

    pub fn is_sounding(&self) -> bool {
        self.with_state(|s| s.active.as_ref().is_some_and(|(_, h)| !h.is_finished()))
    }

    fn count(&self, pred: impl Fn(&OutputEvent) -> bool) -> usize {
        self.with_state(|s| s.events.iter().filter(|e| pred(e)).count())
    }
}

impl AudioOutput for SimulatedOutput {
    fn name(&self) -> &str {
        "simulated"
    }

    fn start(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<ClipCompletion> {
        let (done_tx, done_rx) = oneshot::channel();
        let length = Duration::from_secs_f64(samples.len() as f64 / sample_rate.max(1) as f64);
        let state = Arc::clone(&self.state);
        let id = self.with_state(|s| {
            s.next_clip += 1;
            s.next_clip
        });

        let clip = tokio::spawn(async move {
            tokio::time::sleep(length).await;
            if let Ok(mut state) = state.lock() {
                state.events.push(OutputEvent::Finished);
                if state.active.as_ref().is_some_and(|(active, _)| *active == id) {
                    state.active = None;
                }
            }
            done_tx.send(()).ok();
        });

        self.with_state(|s| {
            if let Some((_, previous)) = s.active.replace((id, clip)) {
                previous.abort();
                s.events.push(OutputEvent::Aborted);
            }
            s.events.push(OutputEvent::Started {
                samples: samples.len(),
                sample_rate,
            });
        });
        Ok(done_rx)
    }

    fn abort(&self) {
        self.with_state(|s| {
            if let Some((_, active)) = s.active.take() {
                active.abort();
                s.events.push(OutputEvent::Aborted);
            }
        });
    }

    fn suspend(&self) {
        self.with_state(|s| {
            s.suspended = true;
            s.events.push(OutputEvent::Suspended);
        });
    }

    fn resume(&self) {
        self.with_state(|s| {
            s.suspended = false;
            s.events.push(OutputEvent::Resumed);
        });
    }
}
