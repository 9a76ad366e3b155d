//! Text preparation: vocabulary normalization and chunking.

pub mod chunker;
pub mod normalize;

pub use chunker::{ChunkerConfig, TextChunk, TextChunker, split_sentences};
pub use normalize::{normalize, text_len};
