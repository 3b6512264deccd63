//! # shardprep-core — Text Engine
//!
//! Everything between a raw document and a fixed-length window of ids:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`normalize`] | WikiText unescaping, LAMBADA quote cleanup |
//! | [`tokenizer`] | `TokenizerAdapter`, generic and segmentation backends |
//! | [`window`] | `TokenStream`, `Windows`, parallel `pack_documents` |

pub mod normalize;
pub mod tokenizer;
pub mod window;

// ── Public re-exports ───────────────────────────────────────────────────────

pub use normalize::{clean_lambada, clean_wikitext, is_wiki_heading};
pub use tokenizer::{
    load_tokenizer, PretrainedTokenizer, SegmentingTokenizer, SpecialTokens, TokenizerAdapter,
    NEWLINE_SENTINEL, SPACE_SENTINEL,
};
pub use window::{pack_documents, window_count, TokenStream, Windows};
