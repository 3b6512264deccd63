//! # shardprep-record — Shard Files
//!
//! * **[`Schema`]** / **[`Record`]** — declared fields and the values written under them.
//! * **[`RecordWriter`]** — append-then-commit writer over one or more shard files.
//! * **[`ShardReader`]** — memory-mapped reader that only accepts committed shards.

pub mod reader;
pub mod schema;
pub mod writer;

pub use reader::{RecordIter, ShardReader};
pub use schema::{FieldSpec, FieldType, FieldValue, Record, Schema};
pub use writer::{
    partial_path, shard_file_names, CommitSummary, RecordWriter, ShardHeader, WriterOptions,
    FORMAT_VERSION,
};
