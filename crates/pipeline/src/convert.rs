//! Conversion entry point: config in, committed shards out.
//!
//! wiki and lambada run on the calling thread with one writer spread over
//! `file_partition` shards; openwebtext hands its file list to the
//! [`ShardOrchestrator`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shardprep_common::{
    config_error, ConvertConfig, DatasetType, IoResultExt, PrepError, PrepResult,
};
use shardprep_core::{load_tokenizer, TokenizerAdapter};
use shardprep_record::{FieldValue, Record, RecordWriter, Schema, WriterOptions};

use crate::corpus::CorpusWindows;
use crate::orchestrator::ShardOrchestrator;

/// What one conversion run produced.
#[derive(Debug, Clone)]
pub struct ConversionSummary {
    pub dataset_type: DatasetType,
    /// Committed output files, in shard order.
    pub output_files: Vec<PathBuf>,
    pub records: u64,
    pub files: u64,
}

impl ConversionSummary {
    /// The file users are pointed to after a run.
    pub fn first_output(&self) -> Option<&Path> {
        self.output_files.first().map(PathBuf::as_path)
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

/// Wrap one window as a single-field int32 record.
pub fn window_record(field: &str, window: &[u32]) -> PrepResult<Record> {
    let ids = window
        .iter()
        .map(|&id| {
            i32::try_from(id).map_err(|_| PrepError::Schema(format!("token id {id} does not fit in int32")))
        })
        .collect::<PrepResult<Vec<i32>>>()?;
    let mut record = Record::new();
    record.insert(field.to_string(), FieldValue::Int32(ids));
    Ok(record)
}

/// Drain `windows` into `writer` in batches of `batch_size`.
///
/// Returns the number of records written. `label` names the writer in logs.
pub fn write_windows<I>(
    writer: &mut RecordWriter,
    windows: I,
    field: &str,
    batch_size: usize,
    label: &str,
) -> PrepResult<u64>
where
    I: IntoIterator<Item = PrepResult<Vec<u32>>>,
{
    let batch_size = batch_size.max(1);
    let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
    let mut count = 0u64;
    for window in windows {
        batch.push(window_record(field, &window?)?);
        if batch.len() == batch_size {
            writer.write_raw_data(&batch)?;
            count += batch.len() as u64;
            batch.clear();
            tracing::info!(writer = label, records = count, "Transformed records");
        }
    }
    if !batch.is_empty() {
        writer.write_raw_data(&batch)?;
        count += batch.len() as u64;
        tracing::info!(writer = label, records = count, "Transformed records");
    }
    Ok(count)
}

// ── Inputs ──────────────────────────────────────────────────────────────────

/// Lazily walk the regular files `pattern` matches.
///
/// Only the pattern is checked up front; unreadable entries are logged and
/// skipped as the iterator advances.
pub fn glob_inputs(pattern: &str) -> PrepResult<impl Iterator<Item = PathBuf>> {
    let entries = glob::glob(pattern)
        .map_err(|e| config_error(format!("bad input glob '{pattern}': {e}")))?;
    Ok(entries.filter_map(|entry| match entry {
        Ok(path) if path.is_file() => Some(path),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unreadable input entry");
            None
        }
    }))
}

/// Every regular file `pattern` matches, in sorted order.
pub fn expand_inputs(pattern: &str) -> PrepResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = glob_inputs(pattern)?.collect();
    files.sort();
    Ok(files)
}

// ── Conversion ──────────────────────────────────────────────────────────────

/// Validate `config`, load its tokenizer and run the conversion.
pub fn run_conversion(config: &ConvertConfig) -> PrepResult<ConversionSummary> {
    config.validate()?;
    let tokenizer = load_tokenizer(
        config.tokenizer,
        config.model_file.as_deref(),
        &config.pretrained,
    )?;
    convert_with_tokenizer(config, tokenizer)
}

/// Run the conversion with an already-built tokenizer.
///
/// Creates the output directory if needed.
pub fn convert_with_tokenizer(
    config: &ConvertConfig,
    tokenizer: Arc<dyn TokenizerAdapter>,
) -> PrepResult<ConversionSummary> {
    config.validate()?;
    if let Some(dir) = config.output_file.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).with_path(dir)?;
        }
    }
    tracing::info!(
        dataset = %config.dataset_type,
        pattern = %config.input_glob,
        seq_length = config.seq_length,
        partitions = config.file_partition,
        "Starting conversion"
    );

    if config.dataset_type.is_parallel() {
        let inputs = glob_inputs(&config.input_glob)?;
        let report = ShardOrchestrator::new(config, tokenizer).run(inputs)?;
        if report.total_files() == 0 {
            tracing::warn!(pattern = %config.input_glob, "Input glob matched no files");
        }
        return Ok(ConversionSummary {
            dataset_type: config.dataset_type,
            output_files: report.output_files(),
            records: report.total_records(),
            files: report.total_files(),
        });
    }

    let inputs = expand_inputs(&config.input_glob)?;
    if inputs.is_empty() {
        return Err(config_error(format!(
            "input glob '{}' matched no files",
            config.input_glob
        )));
    }
    convert_sequential(config, tokenizer.as_ref(), inputs)
}

fn convert_sequential(
    config: &ConvertConfig,
    tokenizer: &dyn TokenizerAdapter,
    inputs: Vec<PathBuf>,
) -> PrepResult<ConversionSummary> {
    let options = WriterOptions {
        shard_count: config.file_partition,
        description: config.dataset_type.as_str().to_string(),
        overwrite: config.overwrite,
    };
    let mut writer = RecordWriter::create(
        &config.output_file,
        Schema::token_ids(&config.data_column_name),
        &options,
    )?;

    let mut corpus = CorpusWindows::new(
        config.dataset_type,
        tokenizer,
        inputs.into_iter(),
        config.seq_length,
        config.eot,
    );
    write_windows(
        &mut writer,
        corpus.by_ref(),
        &config.data_column_name,
        config.write_batch_size,
        "main",
    )?;
    let committed = writer.commit()?;
    let stats = corpus.stats();
    tracing::info!(
        records = committed.total_records(),
        files = stats.files,
        documents = stats.documents,
        dropped_tokens = stats.dropped_tokens,
        "Conversion committed"
    );

    Ok(ConversionSummary {
        dataset_type: config.dataset_type,
        records: committed.total_records(),
        output_files: committed.files,
        files: stats.files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_record_wraps_ids() {
        let record = window_record("input_ids", &[1, 2, 3]).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record["input_ids"].as_i32().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn window_record_rejects_ids_past_int32() {
        let too_big = i32::MAX as u32 + 1;
        assert!(matches!(window_record("input_ids", &[too_big]), Err(PrepError::Schema(_))));
    }

    #[test]
    fn write_windows_flushes_trailing_batch() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        let mut writer =
            RecordWriter::create(&base, Schema::token_ids("input_ids"), &WriterOptions::default())
                .unwrap();
        let windows = (0..5u32).map(|i| Ok(vec![i, i + 1]));
        let written = write_windows(&mut writer, windows, "input_ids", 2, "test").unwrap();
        assert_eq!(written, 5);
        assert_eq!(writer.records_written(), 5);
        writer.commit().unwrap();
    }

    #[test]
    fn write_windows_stops_on_first_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        let mut writer =
            RecordWriter::create(&base, Schema::token_ids("input_ids"), &WriterOptions::default())
                .unwrap();
        let windows = vec![Ok(vec![1, 2]), Err(PrepError::Tokenizer("boom".into())), Ok(vec![3, 4])];
        assert!(write_windows(&mut writer, windows, "input_ids", 8, "test").is_err());
        assert_eq!(writer.records_written(), 0);
    }

    #[test]
    fn expand_inputs_keeps_sorted_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("c.txt")).unwrap();
        let pattern = format!("{}/*.txt", dir.path().display());
        let files = expand_inputs(&pattern).unwrap();
        let names: Vec<_> = files.iter().filter_map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn expand_inputs_rejects_bad_pattern() {
        assert!(expand_inputs("[").unwrap_err().is_config());
        assert!(glob_inputs("[").is_err());
    }

    #[test]
    fn glob_inputs_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("b.txt")).unwrap();
        let pattern = format!("{}/*.txt", dir.path().display());
        let files: Vec<PathBuf> = glob_inputs(&pattern).unwrap().collect();
        assert_eq!(files, vec![dir.path().join("a.txt")]);
    }
}
