//! # shardprep-common — Shared Primitives
//!
//! Types shared across every crate in the workspace:
//!
//! * **[`ConvertConfig`]** — run configuration (serialised as JSON).
//! * **[`DatasetType`]** / **[`TokenizerKind`]** — closed sets of corpus layouts and backends.
//! * **[`PrepError`]** / **[`PrepResult`]** — the library error type.

pub mod config;
pub mod error;

pub use config::{ConvertConfig, DatasetType, TokenizerKind};
pub use error::{config_error, format_error, IoResultExt, PrepError, PrepResult};
