//! Codepoint tokenizer backed by the model's `unicode_indexer.json` table.

use crate::defaults::UNKNOWN_TOKEN_ID;
use crate::error::{Result, RiddiError};
use ndarray::{Array2, Array3};
use std::path::Path;

/// Maps each codepoint to a token id through a dense lookup table.
///
/// The table is indexed by codepoint value. Codepoints past the end of the
/// table, or whose entry is negative, become [`UNKNOWN_TOKEN_ID`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeIndexer {
    table: Vec<i64>,
}

/// Token ids and validity mask for one padded batch.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    /// `[batch, max_len]`, padded with zeros.
    pub ids: Array2<i64>,
    /// `[batch, 1, max_len]`, 1.0 where a token is valid.
    pub mask: Array3<f32>,
    /// Unpadded token count per item.
    pub lengths: Vec<usize>,
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn max_len(&self) -> usize {
        self.ids.ncols()
    }
}

impl UnicodeIndexer {
    pub fn new(table: Vec<i64>) -> Self {
        Self { table }
    }

    /// Identity table covering the first `size` codepoints.
    pub fn identity(size: usize) -> Self {
        Self::new((0..size as i64).collect())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let table: Vec<i64> = serde_json::from_slice(bytes)?;
        Ok(Self::new(table))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| RiddiError::ModelLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&bytes).map_err(|e| RiddiError::ModelLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Token id for one character.
    pub fn token(&self, c: char) -> i64 {
        match self.table.get(c as usize) {
            Some(&id) if id >= 0 => id,
            _ => UNKNOWN_TOKEN_ID,
        }
    }

    /// Token ids for a string, one per codepoint.
    pub fn tokens(&self, text: &str) -> Vec<i64> {
        text.chars().map(|c| self.token(c)).collect()
    }

    /// Encode a batch into a zero-padded id matrix and matching mask.
    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> EncodedBatch {
        let rows: Vec<Vec<i64>> = texts.iter().map(|t| self.tokens(t.as_ref())).collect();
        let lengths: Vec<usize> = rows.iter().map(Vec::len).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        let mut ids = Array2::<i64>::zeros((rows.len(), max_len));
        for (i, row) in rows.iter().enumerate() {
            for (j, &id) in row.iter().enumerate() {
                ids[[i, j]] = id;
            }
        }

        EncodedBatch {
            ids,
            mask: length_to_mask(&lengths, Some(max_len)),
            lengths,
        }
    }
}

/// Build a `[batch, 1, max_len]` mask with ones over each item's valid prefix.
pub fn length_to_mask(lengths: &[usize], max_len: Option<usize>) -> Array3<f32> {
    let max_len = max_len.unwrap_or_else(|| lengths.iter().copied().max().unwrap_or(0));
    let mut mask = Array3::<f32>::zeros((lengths.len(), 1, max_len));
    for (i, &len) in lengths.iter().enumerate() {
        for j in 0..len.min(max_len) {
            mask[[i, 0, j]] = 1.0;
        }
    }
    mask
}
