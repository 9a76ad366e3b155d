//! The page surface the highlighter mutates.
//!
//! A host (browser extension, terminal, test) exposes its readable content as
//! tagged text blocks. The highlighter wraps one block's words in addressable
//! spans, moves an "active" marker across them and must put the original
//! markup back afterwards.

use crate::error::{Result, RiddiError};
use serde::{Deserialize, Serialize};

/// Attribute carried by every wrapped word span.
pub const WORD_ATTR: &str = "data-riddi-word";

/// Class added to the span of the word being spoken.
pub const ACTIVE_CLASS: &str = "riddi-active";

/// One block of readable page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBlock {
    /// Stable id, unique within a page.
    pub id: usize,
    /// Element tag name, lowercase (`p`, `h2`, `li`, ...).
    pub tag: String,
    /// Visible text of the block.
    pub text: String,
}

impl PageBlock {
    pub fn new(id: usize, tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into().to_ascii_lowercase(),
            text: text.into(),
        }
    }
}

/// What the highlighter needs from a page.
pub trait HighlightSurface: Send {
    /// Blocks produced by content extraction, in document order.
    fn blocks(&self) -> Vec<PageBlock>;

    /// Page-wide text search, including content extraction skipped.
    ///
    /// Returns the id of the first block whose text contains `needle`
    /// (case-insensitive).
    fn find_text(&self, needle: &str) -> Option<usize>;

    /// Wrap every word of `block` in its own span and return the words.
    ///
    /// Only one block is wrapped at a time; wrapping another block restores
    /// the previous one first.
    fn wrap_words(&mut self, block: usize) -> Result<Vec<String>>;

    /// Move the active marker to `word` of the wrapped block, or clear it.
    fn set_active_word(&mut self, word: Option<usize>);

    /// Undo every mutation made through this trait.
    fn restore(&mut self);
}

#[derive(Debug, Clone)]
struct StoredBlock {
    block: PageBlock,
    extracted: bool,
    original: String,
}

/// In-memory page: a list of blocks rendered as simple HTML.
///
/// Keeps a snapshot of each block's original markup so [`restore`]
/// is exact.
///
/// [`restore`]: HighlightSurface::restore
#[derive(Debug, Clone, Default)]
pub struct PageModel {
    blocks: Vec<StoredBlock>,
    wrapped: Option<(usize, Vec<String>)>,
    active: Option<usize>,
}

impl PageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a page from plain text, one `p` block per paragraph.
    pub fn from_text(text: &str) -> Self {
        text.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .fold(Self::new(), |page, p| page.with_block("p", p))
    }

    /// Append a block that content extraction found.
    pub fn with_block(self, tag: &str, text: &str) -> Self {
        self.push(tag, text, true)
    }

    /// Append a block only reachable through page-wide search (captions,
    /// asides and other content extraction skipped).
    pub fn with_unextracted_block(self, tag: &str, text: &str) -> Self {
        self.push(tag, text, false)
    }

    fn push(mut self, tag: &str, text: &str, extracted: bool) -> Self {
        let block = PageBlock::new(self.blocks.len(), tag, text);
        let original = format!("<{t}>{}</{t}>", escape(&block.text), t = block.tag);
        self.blocks.push(StoredBlock {
            block,
            extracted,
            original,
        });
        self
    }

    /// Current markup of the whole page.
    pub fn markup(&self) -> String {
        self.blocks
            .iter()
            .map(|stored| match &self.wrapped {
                Some((id, words)) if *id == stored.block.id => {
                    self.render_wrapped(&stored.block.tag, words)
                }
                _ => stored.original.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Markup as it was before any highlighting.
    pub fn original_markup(&self) -> String {
        self.blocks
            .iter()
            .map(|stored| stored.original.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn wrapped_block(&self) -> Option<usize> {
        self.wrapped.as_ref().map(|(id, _)| *id)
    }

    pub fn active_word(&self) -> Option<usize> {
        self.active
    }

    /// Text of the active word, if any.
    pub fn active_text(&self) -> Option<&str> {
        let (_, words) = self.wrapped.as_ref()?;
        words.get(self.active?).map(String::as_str)
    }

    fn render_wrapped(&self, tag: &str, words: &[String]) -> String {
        let spans: Vec<String> = words
            .iter()
            .enumerate()
            .map(|(i, word)| {
                let class = if self.active == Some(i) {
                    format!(" class=\"{ACTIVE_CLASS}\"")
                } else {
                    String::new()
                };
                format!("<span {WORD_ATTR}=\"{i}\"{class}>{}</span>", escape(word))
            })
            .collect();
        format!("<{tag}>{}</{tag}>", spans.join(" "))
    }
}

impl HighlightSurface for PageModel {
    fn blocks(&self) -> Vec<PageBlock> {
        self.blocks
            .iter()
            .filter(|stored| stored.extracted)
            .map(|stored| stored.block.clone())
            .collect()
    }

    fn find_text(&self, needle: &str) -> Option<usize> {
        let needle = needle.to_lowercase();
        if needle.trim().is_empty() {
            return None;
        }
        self.blocks
            .iter()
            .find(|stored| stored.block.text.to_lowercase().contains(&needle))
            .map(|stored| stored.block.id)
    }

    fn wrap_words(&mut self, block: usize) -> Result<Vec<String>> {
        self.restore();
        let stored = self
            .blocks
            .get(block)
            .ok_or_else(|| RiddiError::Other(format!("page has no block {block}")))?;
        let words: Vec<String> = stored
            .block
            .text
            .split_whitespace()
            .map(str::to_string)
            .collect();
        self.wrapped = Some((block, words.clone()));
        Ok(words)
    }

    fn set_active_word(&mut self, word: Option<usize>) {
        let len = self.wrapped.as_ref().map_or(0, |(_, words)| words.len());
        self.active = word.filter(|w| *w < len);
    }

    fn restore(&mut self) {
        self.wrapped = None;
        self.active = None;
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
