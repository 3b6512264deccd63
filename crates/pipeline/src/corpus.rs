//! Lazy window stream over a sequence of input files.
//!
//! Each file is tokenized and windowed independently: the remainder of one
//! file never carries into the next.

use std::path::PathBuf;

use shardprep_common::{DatasetType, PrepResult};
use shardprep_core::{TokenizerAdapter, Windows};

use crate::dataset::file_stream;

/// Running counts for one [`CorpusWindows`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub files: u64,
    pub documents: u64,
    pub tokens: u64,
    pub windows: u64,
    /// Trailing tokens discarded because they did not fill a window.
    pub dropped_tokens: u64,
}

/// Yields one full window per item, file after file.
///
/// Fused after the first error.
pub struct CorpusWindows<'a, I> {
    kind: DatasetType,
    tokenizer: &'a dyn TokenizerAdapter,
    files: I,
    seq_len: usize,
    end_marker: u32,
    current: Option<Windows>,
    stats: CorpusStats,
    failed: bool,
}

impl<'a, I> CorpusWindows<'a, I>
where
    I: Iterator<Item = PathBuf>,
{
    pub fn new(
        kind: DatasetType,
        tokenizer: &'a dyn TokenizerAdapter,
        files: I,
        seq_len: usize,
        end_marker: u32,
    ) -> Self {
        Self {
            kind,
            tokenizer,
            files,
            seq_len,
            end_marker,
            current: None,
            stats: CorpusStats::default(),
            failed: false,
        }
    }

    pub fn stats(&self) -> CorpusStats {
        self.stats
    }

    fn open_next(&mut self) -> Option<PrepResult<()>> {
        let path = self.files.next()?;
        let stream = match file_stream(self.kind, self.tokenizer, &path, self.end_marker) {
            Ok(stream) => stream,
            Err(e) => return Some(Err(e)),
        };
        self.stats.files += 1;
        self.stats.documents += stream.documents() as u64;
        self.stats.tokens += stream.len() as u64;

        let windows = stream.into_windows(self.seq_len);
        self.stats.dropped_tokens += windows.dropped() as u64;
        tracing::debug!(
            file = %path.display(),
            windows = windows.len(),
            dropped = windows.dropped(),
            "File windowed"
        );
        self.current = Some(windows);
        Some(Ok(()))
    }
}

impl<I> Iterator for CorpusWindows<'_, I>
where
    I: Iterator<Item = PathBuf>,
{
    type Item = PrepResult<Vec<u32>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(window) = self.current.as_mut().and_then(Iterator::next) {
                self.stats.windows += 1;
                return Some(Ok(window));
            }
            self.current = None;
            if let Err(e) = self.open_next()? {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}
