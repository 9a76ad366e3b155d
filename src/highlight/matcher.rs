//! Locating a spoken chunk on the page and its first word within a block.

use crate::highlight::page::{HighlightSurface, PageBlock};
use crate::text::normalize::normalize_paragraph;
use std::collections::HashSet;

/// Tags that usually hold article prose.
const PREFERRED_TAGS: &[&str] = &[
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "blockquote",
];

/// Characters of the chunk used for the prefix test.
const PREFIX_CHARS: usize = 30;

/// Chunk words compared in the overlap test.
const OVERLAP_WORDS: usize = 10;

/// Chunk words matched against a block to find the starting word.
const START_WORDS: usize = 3;

/// Words used for the page-wide fallback search.
const FALLBACK_WORDS: usize = 5;

/// Fold text into the form both sides are compared in: model-normalized,
/// lowercase, alphanumerics and single spaces only.
pub fn fold(text: &str) -> String {
    let normalized = normalize_paragraph(text).to_lowercase();
    let cleaned: String = normalized
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_words(text: &str) -> Vec<String> {
    fold(text).split(' ').filter(|w| !w.is_empty()).map(str::to_string).collect()
}

/// How well a block contains a chunk, in `[0, 1]`, ignoring tie-breakers.
///
/// - block contains the whole chunk: 1.0
/// - chunk contains the whole block (block split across chunks): 0.6 to 0.9
/// - block contains the chunk's opening characters: 0.7
/// - otherwise the share of the chunk's opening words found in the block,
///   scaled to at most 0.6
pub fn containment_score(chunk: &str, block: &str) -> f32 {
    let chunk = fold(chunk);
    let block = fold(block);
    if chunk.is_empty() || block.is_empty() {
        return 0.0;
    }
    if block.contains(&chunk) {
        return 1.0;
    }
    if chunk.contains(&block) {
        return 0.6 + 0.3 * block.len() as f32 / chunk.len() as f32;
    }
    let prefix: String = chunk.chars().take(PREFIX_CHARS).collect();
    if block.contains(prefix.trim_end()) {
        return 0.7;
    }

    let block_words: HashSet<&str> = block.split(' ').collect();
    let opening: Vec<&str> = chunk.split(' ').take(OVERLAP_WORDS).collect();
    let found = opening.iter().filter(|w| block_words.contains(*w)).count();
    0.6 * found as f32 / opening.len() as f32
}

/// Ratio of the shorter to the longer text length.
fn length_similarity(a: &str, b: &str) -> f32 {
    let (a, b) = (a.chars().count() as f32, b.chars().count() as f32);
    if a == 0.0 || b == 0.0 {
        return 0.0;
    }
    a.min(b) / a.max(b)
}

/// Best block for a chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockMatch {
    pub block: usize,
    /// Containment score plus tie-breakers.
    pub score: f32,
}

/// Scores page blocks against chunk text.
#[derive(Debug, Clone, Copy)]
pub struct BlockMatcher {
    /// Minimum containment score a block needs to be considered.
    pub threshold: f32,
    pub length_weight: f32,
    pub tag_bonus: f32,
}

impl Default for BlockMatcher {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            length_weight: 0.1,
            tag_bonus: 0.05,
        }
    }
}

impl BlockMatcher {
    /// Pick the best-scoring block above the threshold. Ties go to the
    /// earlier block.
    pub fn best_block(&self, chunk: &str, blocks: &[PageBlock]) -> Option<BlockMatch> {
        let mut best: Option<BlockMatch> = None;
        for block in blocks {
            let base = containment_score(chunk, &block.text);
            if base < self.threshold {
                continue;
            }
            let mut score = base + self.length_weight * length_similarity(chunk, &block.text);
            if PREFERRED_TAGS.contains(&block.tag.as_str()) {
                score += self.tag_bonus;
            }
            if best.is_none_or(|b| score > b.score) {
                best = Some(BlockMatch {
                    block: block.id,
                    score,
                });
            }
        }
        best
    }

    /// Resolve the block for `chunk`: extracted blocks first, then a
    /// page-wide search for the chunk's opening words.
    pub fn locate<S: HighlightSurface + ?Sized>(&self, surface: &S, chunk: &str) -> Option<usize> {
        if let Some(found) = self.best_block(chunk, &surface.blocks()) {
            return Some(found.block);
        }
        let opening: Vec<&str> = chunk.split_whitespace().take(FALLBACK_WORDS).collect();
        for take in (1..=opening.len()).rev() {
            let needle = opening[..take].join(" ");
            let needle = needle.trim_end_matches(['.', ',', '!', '?', ';', ':']);
            if let Some(id) = surface.find_text(needle) {
                tracing::debug!(block = id, needle, "Highlight fell back to page search");
                return Some(id);
            }
        }
        None
    }
}

/// Index of the block word a chunk starts at.
///
/// Looks for the chunk's first three words in sequence, then for its first
/// word alone; defaults to 0. A block that spans several chunks is entered
/// mid-way this way. Opening words repeated earlier in the block match
/// their first occurrence.
pub fn start_word_index(chunk: &str, block_words: &[String]) -> usize {
    let chunk_words = fold_words(chunk);
    let folded: Vec<String> = block_words.iter().map(|w| fold(w)).collect();
    let opening: Vec<&str> = chunk_words
        .iter()
        .take(START_WORDS)
        .map(String::as_str)
        .collect();
    let Some(first) = opening.first() else {
        return 0;
    };

    let matches_at = |i: usize| {
        opening
            .iter()
            .enumerate()
            .all(|(k, w)| folded.get(i + k).is_none_or(|b| b == w))
    };
    (0..folded.len())
        .find(|&i| folded[i] == *first && matches_at(i))
        .or_else(|| folded.iter().position(|w| w == first))
        .unwrap_or(0)
}
