//! Splits normalized article text into model-sized chunks.
//!
//! Paragraphs that fit the budget become one chunk verbatim, which keeps
//! headings isolated. Longer paragraphs are split on sentence boundaries and
//! the sentences packed greedily. A sentence is never cut, so a single
//! over-long sentence yields a chunk above the budget.

use crate::defaults;
use crate::text::normalize::{PARAGRAPH_SEPARATOR, normalize, text_len};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Abbreviations that end in a period without ending a sentence.
const ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "St.", "Ave.", "Rd.", "Blvd.", "Dept.",
    "Inc.", "Ltd.", "Co.", "Corp.", "etc.", "vs.", "i.e.", "e.g.", "Ph.D.", "No.", "Vol.",
    "Fig.", "Gen.", "Gov.", "Sen.", "Rep.", "Mt.", "U.S.", "a.m.", "p.m.",
];

/// Candidate sentence ends: terminal punctuation, optional closing quotes or
/// brackets, then whitespace.
#[allow(clippy::unwrap_used)]
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["')\]]*\s+"#).unwrap());

/// A unit of synthesis input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Zero-based position in the request; contiguous.
    pub index: usize,
    /// Normalized text.
    pub text: String,
}

impl TextChunk {
    /// Length in UTF-16 code units.
    pub fn len(&self) -> usize {
        text_len(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Chunker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Length budget per chunk in UTF-16 code units.
    pub max_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: defaults::MAX_CHUNK_CHARS,
        }
    }
}

/// Text normalizer and chunker.
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Creates a chunker with the given length budget.
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self::new(ChunkerConfig { max_chars })
    }

    pub fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    /// Normalize `raw` and split it into ordered chunks.
    ///
    /// Returns an empty vector when nothing speakable remains.
    pub fn chunk(&self, raw: &str) -> Vec<TextChunk> {
        let normalized = normalize(raw);
        self.chunk_normalized(&normalized)
    }

    /// Split already-normalized text.
    pub fn chunk_normalized(&self, normalized: &str) -> Vec<TextChunk> {
        let mut texts = Vec::new();
        for paragraph in normalized.split(PARAGRAPH_SEPARATOR) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if text_len(paragraph) <= self.config.max_chars {
                texts.push(paragraph.to_string());
                continue;
            }
            self.pack_sentences(&split_sentences(paragraph), &mut texts);
        }

        texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextChunk { index, text })
            .collect()
    }

    fn pack_sentences(&self, sentences: &[String], out: &mut Vec<String>) {
        let mut current = String::new();
        let mut current_len = 0usize;

        for sentence in sentences {
            let sentence_len = text_len(sentence);
            let joined_len = if current.is_empty() {
                sentence_len
            } else {
                current_len + 1 + sentence_len
            };

            if joined_len > self.config.max_chars && !current.is_empty() {
                out.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if current.is_empty() {
                current.push_str(sentence);
                current_len = sentence_len;
            } else {
                current.push(' ');
                current.push_str(sentence);
                current_len += 1 + sentence_len;
            }
        }

        if !current.is_empty() {
            out.push(current);
        }
    }
}

/// Split a paragraph into sentences, guarding common abbreviations and
/// single-letter initials against false boundaries.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0usize;

    for m in SENTENCE_END.find_iter(text) {
        let candidate = text[start..m.end()].trim_end();
        if ends_with_abbreviation(candidate) {
            continue;
        }
        let sentence = candidate.trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

fn ends_with_abbreviation(candidate: &str) -> bool {
    let last_word = candidate.split_whitespace().last().unwrap_or("");
    // Only a bare period can be an abbreviation; "?" and "!" always end.
    if !last_word.ends_with('.') || last_word.ends_with("..") {
        return false;
    }
    let word = last_word.trim_start_matches(['"', '\'', '(', '[']);
    // Case matters: "No." is an abbreviation, "no." ends a sentence.
    if ABBREVIATIONS.contains(&word) {
        return true;
    }
    // Single-letter initials such as "J." in "J. R. R. Tolkien".
    let stem = &word[..word.len() - 1];
    stem.chars().count() == 1 && stem.chars().all(|c| c.is_ascii_uppercase())
}
