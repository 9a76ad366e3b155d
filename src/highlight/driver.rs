//! Drives the word highlight for whichever chunk is playing.

use crate::highlight::matcher::{BlockMatcher, start_word_index};
use crate::highlight::page::HighlightSurface;
use crate::highlight::schedule::WordSchedule;
use crate::playback::PlaybackStatus;
use crate::streaming::events::SynthesisEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Where and how a chunk is highlighted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightPlan {
    pub block: usize,
    /// First word of the block the chunk covers.
    pub start: usize,
    pub schedule: WordSchedule,
}

struct Shared<S> {
    surface: Mutex<S>,
    /// Bumped whenever the page is restored; timers from an older
    /// generation stop touching the surface.
    generation: AtomicU64,
}

impl<S> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, S> {
        self.surface
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Highlights one chunk at a time on a [`HighlightSurface`].
///
/// Every page mutation is undone when the next chunk begins, on `stop`, and
/// when the driver is dropped. Timers run on the tokio runtime the calls are
/// made from.
pub struct HighlightDriver<S: HighlightSurface + 'static> {
    shared: Arc<Shared<S>>,
    matcher: BlockMatcher,
    paused: watch::Sender<bool>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: HighlightSurface + 'static> HighlightDriver<S> {
    pub fn new(surface: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                surface: Mutex::new(surface),
                generation: AtomicU64::new(0),
            }),
            matcher: BlockMatcher::default(),
            paused: watch::Sender::new(false),
            timer: Mutex::new(None),
        }
    }

    pub fn with_matcher(mut self, matcher: BlockMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Run `f` against the surface.
    pub fn with_surface<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.shared.lock())
    }

    /// Restore the page, then highlight `text` over `duration`.
    ///
    /// Returns `None` when no block on the page matches the chunk; the page
    /// is left untouched in that case.
    pub fn begin_chunk(&self, text: &str, duration: Duration) -> Option<HighlightPlan> {
        self.cancel_timer();
        let (generation, plan) = {
            let mut surface = self.shared.lock();
            let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
            surface.restore();

            let block = self.matcher.locate(&*surface, text);
            let Some(block) = block else {
                tracing::debug!(text, "No page block matches chunk");
                return None;
            };
            let words = match surface.wrap_words(block) {
                Ok(words) => words,
                Err(e) => {
                    tracing::warn!(block, error = %e, "Failed to wrap block words");
                    surface.restore();
                    return None;
                }
            };
            let start = start_word_index(text, &words);
            let chunk_words = text.split_whitespace().count();
            let schedule = WordSchedule::new(&words, start, chunk_words, duration);
            tracing::debug!(block, start, words = schedule.len(), "Highlighting chunk");
            (generation, HighlightPlan {
                block,
                start,
                schedule,
            })
        };

        let shared = Arc::clone(&self.shared);
        let paused = self.paused.subscribe();
        let schedule = plan.schedule.clone();
        let timer = tokio::spawn(run_schedule(shared, generation, schedule, paused));
        if let Some(previous) = self.lock_timer().replace(timer) {
            previous.abort();
        }
        Some(plan)
    }

    /// Freeze the active word until `resume`.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Stop highlighting and restore the page.
    pub fn stop(&self) {
        self.cancel_timer();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.lock().restore();
        self.paused.send_replace(false);
    }

    /// Follow coordinator events: highlight playing chunks, restore the
    /// page once the request ends.
    pub fn handle_event(&self, event: &SynthesisEvent) {
        match event {
            SynthesisEvent::ChunkPlaying {
                text, duration_secs, ..
            } => {
                self.begin_chunk(text, Duration::from_secs_f32(duration_secs.max(0.0)));
            }
            SynthesisEvent::Complete { .. } | SynthesisEvent::Error { .. } => self.stop(),
            _ => {}
        }
    }

    /// Freeze or release the word timer to match the player.
    pub fn handle_status(&self, status: &PlaybackStatus) {
        match status {
            PlaybackStatus::Paused => self.pause(),
            PlaybackStatus::Playing => self.resume(),
            _ => {}
        }
    }

    /// Apply every playback status change until the channel closes.
    pub async fn follow(&self, mut status: watch::Receiver<PlaybackStatus>) {
        loop {
            let current = status.borrow_and_update().clone();
            self.handle_status(&current);
            if status.changed().await.is_err() {
                return;
            }
        }
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.lock_timer().take() {
            timer.abort();
        }
    }
}

impl<S: HighlightSurface + 'static> Drop for HighlightDriver<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_schedule<S: HighlightSurface>(
    shared: Arc<Shared<S>>,
    generation: u64,
    schedule: WordSchedule,
    mut paused: watch::Receiver<bool>,
) {
    let set_active = |word: Option<usize>| {
        let mut surface = shared.lock();
        if shared.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        surface.set_active_word(word);
        true
    };

    for slot in &schedule.slots {
        if !set_active(Some(slot.word)) {
            return;
        }
        if !dwell(&mut paused, slot.dwell).await {
            return;
        }
    }
    set_active(None);
}

/// Sleep for `length` of unpaused time. False if the driver went away.
async fn dwell(paused: &mut watch::Receiver<bool>, length: Duration) -> bool {
    let mut remaining = length;
    loop {
        while *paused.borrow_and_update() {
            if paused.changed().await.is_err() {
                return false;
            }
        }
        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(remaining) => return true,
            changed = paused.changed() => {
                if changed.is_err() {
                    return false;
                }
                remaining = remaining.saturating_sub(started.elapsed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::page::PageModel;
    use crate::playback::PlaybackState;

    fn page() -> PageModel {
        PageModel::new()
            .with_block("h1", "A Title")
            .with_block("p", "The quick brown fox. Jumps over it.")
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn active(driver: &HighlightDriver<PageModel>) -> Option<usize> {
        driver.with_surface(|p| p.active_word())
    }

    #[tokio::test(start_paused = true)]
    async fn words_advance_with_the_schedule() {
        let driver = HighlightDriver::new(page());
        let plan = driver
            .begin_chunk("The quick brown fox.", Duration::from_secs(2))
            .unwrap();
        assert_eq!(plan.block, 1);
        assert_eq!(plan.start, 0);
        assert_eq!(plan.schedule.len(), 4);

        advance(10).await;
        assert_eq!(active(&driver), Some(0));
        advance(750).await;
        assert_eq!(active(&driver), Some(1));
        advance(500).await;
        assert_eq!(active(&driver), Some(2));
        advance(500).await;
        assert_eq!(active(&driver), Some(3));
        advance(500).await;
        assert_eq!(active(&driver), None);
        assert_eq!(driver.with_surface(|p| p.wrapped_block()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn second_chunk_starts_mid_block() {
        let driver = HighlightDriver::new(page());
        let plan = driver
            .begin_chunk("Jumps over it.", Duration::from_millis(900))
            .unwrap();
        assert_eq!(plan.start, 4);
        advance(10).await;
        assert_eq!(active(&driver), Some(4));
        let word = driver.with_surface(|p| p.active_text().map(str::to_string));
        assert_eq!(word.as_deref(), Some("Jumps"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_restores_original_markup() {
        let driver = HighlightDriver::new(page());
        let original = driver.with_surface(|p| p.original_markup());
        driver.begin_chunk("The quick brown fox.", Duration::from_secs(2));
        advance(600).await;
        assert_ne!(driver.with_surface(|p| p.markup()), original);

        driver.stop();
        assert_eq!(driver.with_surface(|p| p.markup()), original);
        advance(3000).await;
        assert_eq!(driver.with_surface(|p| p.markup()), original);
    }

    #[tokio::test(start_paused = true)]
    async fn next_chunk_replaces_previous_highlight() {
        let driver = HighlightDriver::new(page());
        driver.begin_chunk("A Title.", Duration::from_secs(1));
        advance(10).await;
        assert_eq!(driver.with_surface(|p| p.wrapped_block()), Some(0));

        driver.begin_chunk("The quick brown fox.", Duration::from_secs(2));
        advance(10).await;
        assert_eq!(driver.with_surface(|p| p.wrapped_block()), Some(1));
        assert!(driver.with_surface(|p| p.markup()).contains("<h1>A Title</h1>"));
        assert_eq!(active(&driver), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_chunk_leaves_page_untouched() {
        let driver = HighlightDriver::new(page());
        let original = driver.with_surface(|p| p.original_markup());
        assert!(driver.begin_chunk("Nothing like this.", Duration::from_secs(1)).is_none());
        assert_eq!(driver.with_surface(|p| p.markup()), original);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_active_word() {
        let driver = HighlightDriver::new(page());
        driver.begin_chunk("The quick brown fox.", Duration::from_secs(2));
        advance(100).await;
        driver.pause();
        advance(2000).await;
        assert_eq!(active(&driver), Some(0));

        driver.resume();
        advance(300).await;
        assert_eq!(active(&driver), Some(0));
        advance(200).await;
        assert_eq!(active(&driver), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn player_pause_freezes_the_highlight() {
        let driver = Arc::new(HighlightDriver::new(page()));
        let state = PlaybackState::new();
        for status in [
            PlaybackStatus::Loading,
            PlaybackStatus::Buffering,
            PlaybackStatus::Playing,
        ] {
            state.set(status);
        }
        let follower = tokio::spawn({
            let driver = Arc::clone(&driver);
            let status = state.subscribe();
            async move { driver.follow(status).await }
        });

        driver.begin_chunk("The quick brown fox.", Duration::from_secs(2));
        advance(100).await;
        state.set(PlaybackStatus::Paused);
        advance(2000).await;
        assert_eq!(active(&driver), Some(0));

        state.set(PlaybackStatus::Playing);
        advance(300).await;
        assert_eq!(active(&driver), Some(0));
        advance(200).await;
        assert_eq!(active(&driver), Some(1));
        follower.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn events_drive_and_reset_the_page() {
        let driver = HighlightDriver::new(page());
        let original = driver.with_surface(|p| p.original_markup());
        driver.handle_event(&SynthesisEvent::ChunkPlaying {
            request_id: 1,
            index: 0,
            text: "The quick brown fox.".to_string(),
            duration_secs: 2.0,
        });
        advance(10).await;
        assert_eq!(active(&driver), Some(0));

        driver.handle_event(&SynthesisEvent::Complete {
            request_id: 1,
            chunks: 1,
            audio_secs: 2.0,
        });
        assert_eq!(driver.with_surface(|p| p.markup()), original);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_restores_the_page() {
        let driver = HighlightDriver::new(page());
        let shared = Arc::clone(&driver.shared);
        driver.begin_chunk("The quick brown fox.", Duration::from_secs(2));
        advance(10).await;
        drop(driver);
        assert_eq!(shared.lock().wrapped_block(), None);
    }
}
