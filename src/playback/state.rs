//! Observable playback state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Where the reader is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum PlaybackStatus {
    Idle,
    /// Loading the model or voice style for a new request.
    Loading,
    /// Waiting for synthesis to get ahead of playback.
    Buffering,
    Playing,
    Paused,
    /// The last request failed. Only a new request leaves this state.
    Error(String),
}

impl PlaybackStatus {
    /// Whether moving from `self` to `next` is allowed.
    ///
    /// A new request (`Loading`) may start from anywhere. `Error` is sticky
    /// for everything else.
    pub fn can_transition_to(&self, next: &PlaybackStatus) -> bool {
        use PlaybackStatus::*;
        match (self, next) {
            (_, Loading) => true,
            (Error(_), _) => false,
            (_, Error(_)) => true,
            (_, Idle) => true,
            (Idle, _) => false,
            (Loading, Buffering | Paused) => true,
            (Loading, _) => false,
            (Buffering | Playing | Paused, Buffering | Playing | Paused) => true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PlaybackStatus::Error(_))
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackStatus::Loading
                | PlaybackStatus::Buffering
                | PlaybackStatus::Playing
                | PlaybackStatus::Paused
        )
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackStatus::Idle => write!(f, "idle"),
            PlaybackStatus::Loading => write!(f, "loading"),
            PlaybackStatus::Buffering => write!(f, "buffering"),
            PlaybackStatus::Playing => write!(f, "playing"),
            PlaybackStatus::Paused => write!(f, "paused"),
            PlaybackStatus::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Shared handle publishing [`PlaybackStatus`] over a watch channel.
#[derive(Clone)]
pub struct PlaybackState {
    tx: Arc<watch::Sender<PlaybackStatus>>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PlaybackStatus::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> PlaybackStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.tx.subscribe()
    }

    /// Apply a transition. Returns false, leaving the state unchanged, when
    /// the transition is not allowed.
    pub fn set(&self, next: PlaybackStatus) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if *current == next {
                applied = true;
                return false;
            }
            if !current.can_transition_to(&next) {
                tracing::debug!(from = %current, to = %next, "Ignored playback transition");
                return false;
            }
            *current = next.clone();
            applied = true;
            true
        });
        applied
    }
}
