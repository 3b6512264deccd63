//! # shardprep-pipeline — Conversion Pipeline
//!
//! Glob in, committed shards out:
//!
//! * **[`dataset`]** — per-dataset document extraction (wiki, lambada, openwebtext).
//! * **[`CorpusWindows`]** — lazy window stream over many files.
//! * **[`ShardOrchestrator`]** — one scoped worker thread per output shard.
//! * **[`run_conversion`]** — validate config, load tokenizer, write and commit.

pub mod convert;
pub mod corpus;
pub mod dataset;
pub mod orchestrator;

pub use convert::{
    convert_with_tokenizer, expand_inputs, glob_inputs, run_conversion, window_record, write_windows,
    ConversionSummary,
};
pub use corpus::{CorpusStats, CorpusWindows};
pub use dataset::{file_stream, read_documents};
pub use orchestrator::{OrchestratorReport, ShardOrchestrator, WorkerReport};
