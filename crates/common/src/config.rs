//! Conversion configuration.
//!
//! Serialised as JSON so a run can be repeated with `shardprep run --config`.
//! Every field has a default, so a minimal `{}` JSON describes the stock
//! openwebtext conversion.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{config_error, IoResultExt, PrepError, PrepResult};

// ── Dataset and tokenizer choices ───────────────────────────────────────────

/// Which corpus layout the input follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    /// WikiText-2 / WikiText-103: one marked-up file, blank-line paragraphs.
    Wiki,
    /// LAMBADA: JSON lines with a `text` field.
    Lambada,
    /// OpenWebText: many small plain-text files.
    OpenWebText,
}

impl DatasetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Wiki => "wiki",
            DatasetType::Lambada => "lambada",
            DatasetType::OpenWebText => "openwebtext",
        }
    }

    /// Only openwebtext fans out over several workers.
    pub fn is_parallel(&self) -> bool {
        matches!(self, DatasetType::OpenWebText)
    }
}

impl FromStr for DatasetType {
    type Err = PrepError;

    fn from_str(s: &str) -> PrepResult<Self> {
        match s {
            "wiki" => Ok(DatasetType::Wiki),
            "lambada" => Ok(DatasetType::Lambada),
            "openwebtext" => Ok(DatasetType::OpenWebText),
            other => Err(config_error(format!("Not support dataset type: {other}"))),
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokenizer backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// A subword tokenizer used as-is (e.g. GPT-2 BPE).
    Generic,
    /// Word segmentation first, then a trained subword encoder.
    Segmentation,
}

impl TokenizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenizerKind::Generic => "generic",
            TokenizerKind::Segmentation => "segmentation",
        }
    }

    /// The segmentation backend cannot run without its trained model file.
    pub fn requires_model_file(&self) -> bool {
        matches!(self, TokenizerKind::Segmentation)
    }
}

impl FromStr for TokenizerKind {
    type Err = PrepError;

    fn from_str(s: &str) -> PrepResult<Self> {
        match s {
            "generic" | "gpt" => Ok(TokenizerKind::Generic),
            "segmentation" | "jieba" => Ok(TokenizerKind::Segmentation),
            other => Err(config_error(format!("Not support tokenizer: {other}"))),
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ConvertConfig ───────────────────────────────────────────────────────────

/// Everything one conversion run needs.
///
/// Backwards-compatible: missing fields fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Corpus layout of the input.
    pub dataset_type: DatasetType,
    /// Path or glob pattern of the input files.
    pub input_glob: String,
    /// Base path of the output shard file(s).
    pub output_file: PathBuf,
    /// Tokenizer backend.
    pub tokenizer: TokenizerKind,
    /// `tokenizer.json` artifact. Required for the segmentation backend.
    pub model_file: Option<PathBuf>,
    /// Hub identifier used by the generic backend when `model_file` is unset.
    pub pretrained: String,
    /// Number of output shards (and openwebtext workers).
    pub file_partition: usize,
    /// Window length in tokens.
    pub seq_length: usize,
    /// End-of-text id appended after every document.
    pub eot: u32,
    /// Schema field name the windows are stored under.
    pub data_column_name: String,
    /// Windows handed to the writer per call.
    pub write_batch_size: usize,
    /// Rayon pool size for per-document tokenization; 0 keeps rayon's default.
    pub num_threads: usize,
    /// Replace existing committed outputs instead of failing.
    pub overwrite: bool,
    /// Draw a progress spinner while workers run.
    pub show_progress: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            dataset_type: DatasetType::OpenWebText,
            input_glob: "*.txt".to_string(),
            output_file: PathBuf::from("./output/records"),
            tokenizer: TokenizerKind::Segmentation,
            model_file: None,
            pretrained: "gpt2".to_string(),
            file_partition: 1,
            seq_length: 1025,
            eot: 3,
            data_column_name: "input_ids".to_string(),
            write_batch_size: 1024,
            num_threads: 0,
            overwrite: false,
            show_progress: true,
        }
    }
}

impl ConvertConfig {
    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> PrepResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| config_error(format!("serialise config: {e}")))?;
        std::fs::write(path, json).with_path(path)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> PrepResult<Self> {
        let json = std::fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&json)
            .map_err(|e| config_error(format!("parse {}: {e}", path.display())))
    }

    /// Check every constraint that can be checked before touching the input.
    pub fn validate(&self) -> PrepResult<()> {
        if self.seq_length == 0 {
            return Err(config_error("seq_length must be at least 1"));
        }
        if self.file_partition == 0 {
            return Err(config_error("file_partition must be at least 1"));
        }
        if self.write_batch_size == 0 {
            return Err(config_error("write_batch_size must be at least 1"));
        }
        if self.data_column_name.is_empty() {
            return Err(config_error("data_column_name must not be empty"));
        }
        if self.input_glob.is_empty() {
            return Err(config_error("input_glob must not be empty"));
        }
        if self.output_file.file_name().is_none() {
            return Err(config_error(format!(
                "output_file '{}' does not name a file",
                self.output_file.display()
            )));
        }
        if i32::try_from(self.eot).is_err() {
            return Err(config_error(format!("eot {} does not fit in int32", self.eot)));
        }
        match &self.model_file {
            Some(path) if !path.exists() => {
                return Err(PrepError::MissingFile(format!(
                    "file {} do not exists.",
                    path.display()
                )));
            }
            None if self.tokenizer.requires_model_file() => {
                return Err(config_error(format!(
                    "tokenizer '{}' requires --model-file",
                    self.tokenizer
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
