//! Error type shared by every library crate in the workspace.
//!
//! Binaries wrap these in `anyhow`; libraries return [`PrepResult`].

use std::path::Path;

use thiserror::Error;

/// Everything that can go wrong between reading a corpus and committing a shard.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PrepError {
    /// Invalid or inconsistent configuration, detected before any work starts.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A file the configuration depends on does not exist.
    #[error("File not found: {0}")]
    MissingFile(String),

    /// I/O failure with the path it happened on.
    #[error("IO error at '{path}': {message}")]
    Io { message: String, path: String },

    /// Failure inside the underlying tokenizer.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// A JSON-lines record could not be parsed.
    #[error("Malformed record in '{path}' line {line}: {message}")]
    Json {
        path: String,
        line: usize,
        message: String,
    },

    /// A record does not match the schema its writer is bound to.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A shard file is truncated, uncommitted, or not a shard at all.
    #[error("Shard format error in '{path}': {message}")]
    Format { path: String, message: String },

    /// Write or commit attempted on a writer that has already been sealed.
    #[error("Writer already committed")]
    AlreadyCommitted,

    /// Refusing to replace a committed output.
    #[error("Output '{0}' already exists (pass --overwrite to replace it)")]
    OutputExists(String),

    /// One or more shard workers returned an error or panicked.
    #[error("{failed} of {total} shard workers failed: {details}")]
    Workers {
        failed: usize,
        total: usize,
        details: String,
    },

    /// A worker thread panicked.
    #[error("Worker panic: {0}")]
    WorkerPanic(String),
}

/// Result alias used across the library crates.
pub type PrepResult<T> = std::result::Result<T, PrepError>;

impl PrepError {
    /// True for errors raised by validation before any input is read.
    pub fn is_config(&self) -> bool {
        matches!(self, PrepError::Config(_) | PrepError::MissingFile(_))
    }

    /// The path this error refers to, if it carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            PrepError::Io { path, .. } => Some(path),
            PrepError::Json { path, .. } => Some(path),
            PrepError::Format { path, .. } => Some(path),
            PrepError::MissingFile(path) => Some(path),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PrepError {
    fn from(err: std::io::Error) -> Self {
        PrepError::Io {
            message: err.to_string(),
            path: String::new(),
        }
    }
}

/// Attach a path to `std::io` failures.
pub trait IoResultExt<T> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> PrepResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> PrepResult<T> {
        self.map_err(|e| PrepError::Io {
            message: e.to_string(),
            path: path.as_ref().display().to_string(),
        })
    }
}

pub fn config_error(message: impl Into<String>) -> PrepError {
    PrepError::Config(message.into())
}

pub fn format_error<P: AsRef<Path>>(path: P, message: impl Into<String>) -> PrepError {
    PrepError::Format {
        path: path.as_ref().display().to_string(),
        message: message.into(),
    }
}
