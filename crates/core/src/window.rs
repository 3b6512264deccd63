//! Token streams and fixed-length windows.
//!
//! A [`TokenStream`] concatenates documents' ids, each followed by the
//! end-marker id. [`TokenStream::into_windows`] slices it into consecutive,
//! non-overlapping windows of exactly `seq_len` ids; the trailing remainder
//! shorter than `seq_len` is dropped, never padded.

use rayon::prelude::*;

use crate::tokenizer::TokenizerAdapter;
use shardprep_common::PrepResult;

/// Number of full windows a stream of `len` ids yields.
pub fn window_count(len: usize, seq_len: usize) -> usize {
    if seq_len == 0 {
        0
    } else {
        len / seq_len
    }
}

// ── TokenStream ─────────────────────────────────────────────────────────────

/// Growing buffer of ids with an end-marker after every document.
#[derive(Debug, Clone)]
pub struct TokenStream {
    ids: Vec<u32>,
    end_marker: u32,
    documents: usize,
}

impl TokenStream {
    pub fn new(end_marker: u32) -> Self {
        Self {
            ids: Vec::new(),
            end_marker,
            documents: 0,
        }
    }

    /// Append one document's ids plus the end-marker.
    ///
    /// Returns `false` (and appends nothing) for a document with no ids.
    pub fn push_document(&mut self, ids: &[u32]) -> bool {
        if ids.is_empty() {
            return false;
        }
        self.ids.reserve(ids.len() + 1);
        self.ids.extend_from_slice(ids);
        self.ids.push(self.end_marker);
        self.documents += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Documents that contributed ids.
    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.ids
    }

    /// Consume the stream into its windows.
    pub fn into_windows(self, seq_len: usize) -> Windows {
        Windows::new(self.ids, seq_len)
    }
}

// ── Windows ─────────────────────────────────────────────────────────────────

/// Lazy, single-pass iterator over full windows of a stream.
#[derive(Debug)]
pub struct Windows {
    ids: Vec<u32>,
    seq_len: usize,
    pos: usize,
}

impl Windows {
    pub fn new(ids: Vec<u32>, seq_len: usize) -> Self {
        Self {
            ids,
            seq_len,
            pos: 0,
        }
    }

    /// Ids at the end of the stream that no window will cover.
    pub fn dropped(&self) -> usize {
        if self.seq_len == 0 {
            self.ids.len()
        } else {
            self.ids.len() % self.seq_len
        }
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }
}

impl Iterator for Windows {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Vec<u32>> {
        if self.seq_len == 0 || self.pos + self.seq_len > self.ids.len() {
            return None;
        }
        let window = self.ids[self.pos..self.pos + self.seq_len].to_vec();
        self.pos += self.seq_len;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = window_count(self.ids.len().saturating_sub(self.pos), self.seq_len);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}

// ── Packing ─────────────────────────────────────────────────────────────────

/// Tokenize `documents` and concatenate them into one stream.
///
/// Documents that are blank after trimming are skipped before tokenization.
/// Tokenization runs on the rayon pool; ids are appended in document order.
pub fn pack_documents<T, S>(tokenizer: &T, documents: &[S], end_marker: u32) -> PrepResult<TokenStream>
where
    T: TokenizerAdapter + ?Sized,
    S: AsRef<str> + Sync,
{
    let encoded: Vec<Vec<u32>> = documents
        .par_iter()
        .map(|doc| {
            let doc = doc.as_ref();
            if doc.trim().is_empty() {
                Ok(Vec::new())
            } else {
                tokenizer.encode(doc)
            }
        })
        .collect::<PrepResult<_>>()?;

    let mut stream = TokenStream::new(end_marker);
    for ids in &encoded {
        stream.push_document(ids);
    }
    tracing::debug!(
        documents = stream.documents(),
        tokens = stream.len(),
        "Packed documents"
    );
    Ok(stream)
}
