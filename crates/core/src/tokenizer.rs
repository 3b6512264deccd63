//! Tokenizer adapters.
//!
//! [`TokenizerAdapter`] is the one interface the pipeline tokenizes through.
//! Two backends implement it, both on top of a HuggingFace `tokenizer.json`:
//!
//! * **[`PretrainedTokenizer`]** — the tokenizer's own pre-tokenization and model
//!   (e.g. GPT-2 byte-level BPE).
//! * **[`SegmentingTokenizer`]** — splits text into words first, remaps spaces and
//!   newlines to sentinel code points so they survive subword encoding, then
//!   encodes the space-joined words. Intended for scripts without whitespace
//!   word boundaries.

use std::path::Path;
use std::sync::Arc;

use tokenizers::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

use shardprep_common::{PrepError, PrepResult, TokenizerKind};

/// Stands in for `' '` inside segmented tokens.
pub const SPACE_SENTINEL: char = '\u{2582}';
/// Stands in for `'\n'` inside segmented tokens.
pub const NEWLINE_SENTINEL: char = '\u{2583}';

// ── Trait ───────────────────────────────────────────────────────────────────

/// Uniform tokenizer interface shared by every backend.
pub trait TokenizerAdapter: Send + Sync {
    /// Split text into token strings.
    fn tokenize(&self, text: &str) -> PrepResult<Vec<String>>;

    /// Map token strings to vocabulary ids.
    fn convert_tokens_to_ids(&self, tokens: &[String]) -> PrepResult<Vec<u32>>;

    /// Map vocabulary ids back to token strings.
    fn convert_ids_to_tokens(&self, ids: &[u32]) -> PrepResult<Vec<String>>;

    /// Turn ids back into text.
    fn decode(&self, ids: &[u32]) -> PrepResult<String>;

    fn vocab_size(&self) -> usize;

    /// End-of-document id, if the vocabulary has one.
    fn eod(&self) -> Option<u32>;

    /// End-of-text id, if the vocabulary has one.
    fn eot(&self) -> Option<u32>;

    /// Padding id, if the vocabulary has one.
    fn pad(&self) -> Option<u32>;

    /// `convert_tokens_to_ids(tokenize(text))`.
    fn encode(&self, text: &str) -> PrepResult<Vec<u32>> {
        let tokens = self.tokenize(text)?;
        self.convert_tokens_to_ids(&tokens)
    }
}

/// Special ids looked up once when a backend is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eod: Option<u32>,
    pub eot: Option<u32>,
    pub pad: Option<u32>,
}

impl SpecialTokens {
    fn resolve(tokenizer: &Tokenizer, eod: &[&str], eot: &[&str], pad: &[&str]) -> Self {
        let first = |names: &[&str]| names.iter().find_map(|name| tokenizer.token_to_id(name));
        Self {
            eod: first(eod),
            eot: first(eot),
            pad: first(pad),
        }
    }
}

fn tokenizer_error(e: impl std::fmt::Display) -> PrepError {
    PrepError::Tokenizer(e.to_string())
}

fn load_tokenizer_file(path: &Path) -> PrepResult<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| PrepError::Tokenizer(format!("load {}: {e}", path.display())))
}

fn ids_to_tokens(tokenizer: &Tokenizer, ids: &[u32]) -> PrepResult<Vec<String>> {
    ids.iter()
        .map(|&id| {
            tokenizer
                .id_to_token(id)
                .ok_or_else(|| PrepError::Tokenizer(format!("id {id} is outside the vocabulary")))
        })
        .collect()
}

// ── PretrainedTokenizer ─────────────────────────────────────────────────────

/// Generic backend: a subword tokenizer used as-is.
pub struct PretrainedTokenizer {
    inner: Tokenizer,
    special: SpecialTokens,
}

impl PretrainedTokenizer {
    pub fn new(inner: Tokenizer) -> Self {
        let special = SpecialTokens::resolve(
            &inner,
            &["<|endoftext|>", "<eod>", "</s>"],
            &["<|endoftext|>", "<eot>"],
            &["<pad>", "[PAD]"],
        );
        Self { inner, special }
    }

    /// Load from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> PrepResult<Self> {
        Ok(Self::new(load_tokenizer_file(path)?))
    }

    /// Fetch a tokenizer from the HuggingFace hub by identifier (e.g. `gpt2`).
    #[cfg(feature = "hub")]
    pub fn from_pretrained(identifier: &str) -> PrepResult<Self> {
        let inner = Tokenizer::from_pretrained(identifier, None)
            .map_err(|e| PrepError::Tokenizer(format!("load pretrained {identifier}: {e}")))?;
        Ok(Self::new(inner))
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special
    }
}

impl TokenizerAdapter for PretrainedTokenizer {
    fn tokenize(&self, text: &str) -> PrepResult<Vec<String>> {
        let enc = self.inner.encode(text, false).map_err(tokenizer_error)?;
        Ok(enc.get_tokens().to_vec())
    }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> PrepResult<Vec<u32>> {
        tokens
            .iter()
            .map(|t| {
                self.inner
                    .token_to_id(t)
                    .ok_or_else(|| PrepError::Tokenizer(format!("token {t:?} is not in the vocabulary")))
            })
            .collect()
    }

    fn convert_ids_to_tokens(&self, ids: &[u32]) -> PrepResult<Vec<String>> {
        ids_to_tokens(&self.inner, ids)
    }

    fn decode(&self, ids: &[u32]) -> PrepResult<String> {
        self.inner.decode(ids, false).map_err(tokenizer_error)
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn eod(&self) -> Option<u32> {
        self.special.eod
    }

    fn eot(&self) -> Option<u32> {
        self.special.eot
    }

    fn pad(&self) -> Option<u32> {
        self.special.pad
    }

    // The encoder already produced the ids; skip the string round trip.
    fn encode(&self, text: &str) -> PrepResult<Vec<u32>> {
        let enc = self.inner.encode(text, false).map_err(tokenizer_error)?;
        Ok(enc.get_ids().to_vec())
    }
}

// ── SegmentingTokenizer ─────────────────────────────────────────────────────

/// Segmentation backend: word segmentation, whitespace sentinels, subword encoder.
pub struct SegmentingTokenizer {
    encoder: Tokenizer,
    special: SpecialTokens,
}

impl SegmentingTokenizer {
    pub fn new(encoder: Tokenizer) -> Self {
        let special = SpecialTokens::resolve(&encoder, &["<eod>"], &["<eot>"], &["<pad>"]);
        Self { encoder, special }
    }

    /// Load the trained subword encoder from a `tokenizer.json` file.
    ///
    /// The caller checks that the file exists; see `ConvertConfig::validate`.
    pub fn from_file(path: &Path) -> PrepResult<Self> {
        Ok(Self::new(load_tokenizer_file(path)?))
    }

    pub fn special_tokens(&self) -> SpecialTokens {
        self.special
    }

    fn protect_whitespace(word: &str) -> String {
        word.chars()
            .map(|c| match c {
                ' ' => SPACE_SENTINEL,
                '\n' => NEWLINE_SENTINEL,
                c => c,
            })
            .collect()
    }

    /// Drop the joining spaces, then turn sentinels back into whitespace.
    fn restore_whitespace(text: &str) -> String {
        text.chars()
            .filter(|&c| c != ' ')
            .map(|c| match c {
                SPACE_SENTINEL => ' ',
                NEWLINE_SENTINEL => '\n',
                c => c,
            })
            .collect()
    }
}

impl TokenizerAdapter for SegmentingTokenizer {
    fn tokenize(&self, text: &str) -> PrepResult<Vec<String>> {
        Ok(text
            .split_word_bounds()
            .map(Self::protect_whitespace)
            .collect())
    }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> PrepResult<Vec<u32>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let joined = tokens.join(" ");
        let enc = self.encoder.encode(joined.as_str(), false).map_err(tokenizer_error)?;
        Ok(enc.get_ids().to_vec())
    }

    fn convert_ids_to_tokens(&self, ids: &[u32]) -> PrepResult<Vec<String>> {
        ids_to_tokens(&self.encoder, ids)
    }

    fn decode(&self, ids: &[u32]) -> PrepResult<String> {
        let text = self.encoder.decode(ids, false).map_err(tokenizer_error)?;
        Ok(Self::restore_whitespace(&text))
    }

    fn vocab_size(&self) -> usize {
        self.encoder.get_vocab_size(true)
    }

    fn eod(&self) -> Option<u32> {
        self.special.eod
    }

    fn eot(&self) -> Option<u32> {
        self.special.eot
    }

    fn pad(&self) -> Option<u32> {
        self.special.pad
    }
}

// ── Construction ────────────────────────────────────────────────────────────

/// Build the backend selected by `kind`.
///
/// The generic backend falls back to `pretrained` when no model file is given;
/// that path needs the `hub` feature.
pub fn load_tokenizer(
    kind: TokenizerKind,
    model_file: Option<&Path>,
    pretrained: &str,
) -> PrepResult<Arc<dyn TokenizerAdapter>> {
    let adapter: Arc<dyn TokenizerAdapter> = match (kind, model_file) {
        (TokenizerKind::Segmentation, Some(path)) => Arc::new(SegmentingTokenizer::from_file(path)?),
        (TokenizerKind::Segmentation, None) => {
            return Err(PrepError::Config(
                "segmentation tokenizer requires a model file".to_string(),
            ))
        }
        (TokenizerKind::Generic, Some(path)) => Arc::new(PretrainedTokenizer::from_file(path)?),
        (TokenizerKind::Generic, None) => load_pretrained(pretrained)?,
    };
    tracing::info!(
        tokenizer = %kind,
        vocab_size = adapter.vocab_size(),
        eod = ?adapter.eod(),
        "Tokenizer loaded"
    );
    Ok(adapter)
}

#[cfg(feature = "hub")]
fn load_pretrained(identifier: &str) -> PrepResult<Arc<dyn TokenizerAdapter>> {
    Ok(Arc::new(PretrainedTokenizer::from_pretrained(identifier)?))
}

#[cfg(not(feature = "hub"))]
fn load_pretrained(identifier: &str) -> PrepResult<Arc<dyn TokenizerAdapter>> {
    Err(PrepError::Config(format!(
        "no --model-file given and hub support is disabled; cannot fetch '{identifier}' \
         (rebuild with --features hub or pass a tokenizer.json)"
    )))
}

// ── Tests ───────────────────────────────────────────────────────────────────
