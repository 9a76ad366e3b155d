//! Character normalization for the model vocabulary.
//!
//! The model was trained on a narrow character set, so page text is folded
//! into it before chunking: diacritics decomposed and stripped, emoji dropped,
//! typographic quotes and dashes mapped to ASCII, whitespace collapsed and
//! every paragraph closed with sentence punctuation.
//!
//! Paragraph breaks survive normalization as a single blank line (`"\n\n"`),
//! which is what the chunker splits on. `normalize` is a fixed point:
//! normalizing its own output returns the same string.

use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Separator placed between normalized paragraphs.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[allow(clippy::unwrap_used)]
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r\f\v]*\n\s*").unwrap());

#[allow(clippy::unwrap_used)]
static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x{1F600}-\x{1F64F}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F700}-\x{1F77F}\x{1F780}-\x{1F7FF}\x{1F800}-\x{1F8FF}\x{1F900}-\x{1F9FF}\x{1FA00}-\x{1FA6F}\x{1FA70}-\x{1FAFF}\x{2600}-\x{26FF}\x{2700}-\x{27BF}\x{1F1E6}-\x{1F1FF}\x{FE0F}\x{200D}]+",
    )
    .unwrap()
});

#[allow(clippy::unwrap_used)]
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.!?;:])").unwrap());

#[allow(clippy::unwrap_used)]
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Characters accepted as the end of a sentence without appending a period.
const TERMINAL_CHARS: &[char] = &[
    '.', '!', '?', ';', ':', ',', '\'', '"', ')', ']', '}', '…', '。', '」', '』', '】', '〉',
    '》', '›', '»',
];

/// Typographic characters mapped onto the model's ASCII forms.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("\u{2013}", "-"),  // en dash
    ("\u{2011}", "-"),  // non-breaking hyphen
    ("\u{2014}", "-"),  // em dash
    ("_", " "),
    ("\u{201C}", "\""), // left double quote
    ("\u{201D}", "\""), // right double quote
    ("\u{201E}", "\""), // low double quote
    ("\u{2018}", "'"),  // left single quote
    ("\u{2019}", "'"),  // right single quote
    ("\u{00B4}", "'"),  // acute accent
    ("`", "'"),
    ("[", " "),
    ("]", " "),
    ("|", " "),
    ("/", " "),
    ("#", " "),
    ("\u{2192}", " "), // right arrow
    ("\u{2190}", " "), // left arrow
    ("\u{00A0}", " "), // no-break space
];

/// Symbols with no spoken form.
const DROPPED_SYMBOLS: &[char] = &['\u{2665}', '\u{2606}', '\u{2661}', '\u{00A9}', '\\'];

/// Expressions the model reads badly in abbreviated form.
const EXPANSIONS: &[(&str, &str)] = &[
    ("@", " at "),
    ("e.g.,", "for example,"),
    ("i.e.,", "that is,"),
];

/// Length of `text` in UTF-16 code units, the unit chunk budgets are stated in.
pub fn text_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Normalize raw page text, preserving paragraph boundaries.
///
/// Returns an empty string when nothing speakable remains.
pub fn normalize(raw: &str) -> String {
    let raw = raw.replace("\r\n", "\n");
    PARAGRAPH_BREAK
        .split(&raw)
        .map(normalize_paragraph)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR)
}

fn tidy_spacing(text: &str) -> String {
    let text = WHITESPACE.replace_all(text, " ");
    SPACE_BEFORE_PUNCT
        .replace_all(&text, "$1")
        .trim()
        .to_string()
}

/// Normalize a single paragraph into one line of model-ready text.
pub fn normalize_paragraph(paragraph: &str) -> String {
    // Decompose so accents become separate combining marks, then drop them.
    let decomposed: String = paragraph
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut text = EMOJI.replace_all(&decomposed, "").into_owned();

    for (from, to) in REPLACEMENTS {
        if text.contains(from) {
            text = text.replace(from, to);
        }
    }
    text.retain(|c| !DROPPED_SYMBOLS.contains(&c));

    while text.contains("\"\"") {
        text = text.replace("\"\"", "\"");
    }
    while text.contains("''") {
        text = text.replace("''", "'");
    }

    // Expansions only match once spacing is canonical, otherwise "e.g. ,"
    // would survive one pass and expand on the next.
    let mut text = tidy_spacing(&text);
    for (from, to) in EXPANSIONS {
        if text.contains(from) {
            text = text.replace(from, to);
        }
    }
    let mut text = tidy_spacing(&text);

    if text.is_empty() {
        return text;
    }
    if let Some(last) = text.chars().last()
        && !TERMINAL_CHARS.contains(&last)
    {
        text.push('.');
    }
    text
}
