//! Word timing derived from the chunk's rendered audio duration.

use crate::defaults;
use std::time::Duration;

/// One highlighted word and how long it stays active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSlot {
    /// Index into the wrapped block's words.
    pub word: usize,
    pub dwell: Duration,
}

/// Per-word highlight timetable for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WordSchedule {
    pub slots: Vec<WordSlot>,
}

impl WordSchedule {
    /// Spread `duration` evenly over the words from `start`.
    ///
    /// At most `chunk_words` words are scheduled, since a block can hold
    /// more text than the chunk being spoken. Each word gets
    /// `max(100ms, duration / words)`; a word closing a sentence dwells a
    /// further quarter slot.
    pub fn new(block_words: &[String], start: usize, chunk_words: usize, duration: Duration) -> Self {
        let available = block_words.len().saturating_sub(start);
        let count = available.min(chunk_words.max(1));
        if count == 0 {
            return Self::default();
        }

        let per_word = (duration.as_millis() as u64 / count as u64).max(defaults::MIN_WORD_MS);
        let interval = Duration::from_millis(per_word);
        let pause = Duration::from_millis(
            (per_word as f32 * defaults::SENTENCE_PAUSE_FACTOR).round() as u64,
        );

        let slots = block_words[start..start + count]
            .iter()
            .enumerate()
            .map(|(offset, word)| WordSlot {
                word: start + offset,
                dwell: if ends_sentence(word) {
                    interval + pause
                } else {
                    interval
                },
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Time until the last word is released.
    pub fn total(&self) -> Duration {
        self.slots.iter().map(|s| s.dwell).sum()
    }
}

/// Whether `word` ends in sentence-final punctuation, allowing closing
/// quotes and brackets after it.
pub fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')', ']', '\u{201D}', '\u{2019}'])
        .ends_with(['.', '!', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn even_split_of_duration() {
        let block = words("one two three four");
        let schedule = WordSchedule::new(&block, 0, 4, Duration::from_millis(2000));
        assert_eq!(schedule.len(), 4);
        assert!(schedule.slots.iter().all(|s| s.dwell == Duration::from_millis(500)));
        assert_eq!(schedule.slots[3].word, 3);
    }

    #[test]
    fn minimum_dwell_per_word() {
        let block = words("a b c d e f g h i j");
        let schedule = WordSchedule::new(&block, 0, 10, Duration::from_millis(300));
        assert!(schedule.slots.iter().all(|s| s.dwell == Duration::from_millis(100)));
    }

    #[test]
    fn sentence_end_gets_extra_pause() {
        let block = words("Stop. Go on");
        let schedule = WordSchedule::new(&block, 0, 3, Duration::from_millis(1200));
        assert_eq!(schedule.slots[0].dwell, Duration::from_millis(500));
        assert_eq!(schedule.slots[1].dwell, Duration::from_millis(400));
        assert_eq!(schedule.total(), Duration::from_millis(1300));
    }

    #[test]
    fn starts_mid_block_and_caps_at_chunk_words() {
        let block = words("one two three four five six");
        let schedule = WordSchedule::new(&block, 2, 2, Duration::from_millis(1000));
        let indices: Vec<usize> = schedule.slots.iter().map(|s| s.word).collect();
        assert_eq!(indices, vec![2, 3]);
        assert_eq!(schedule.slots[0].dwell, Duration::from_millis(500));
    }

    #[test]
    fn start_past_end_is_empty() {
        let block = words("one two");
        assert!(WordSchedule::new(&block, 5, 3, Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn sentence_end_detection() {
        assert!(ends_sentence("done."));
        assert!(ends_sentence("really?\""));
        assert!(ends_sentence("(wow!)"));
        assert!(!ends_sentence("comma,"));
        assert!(!ends_sentence("word"));
    }
}
