//! Append-then-commit shard writer.
//!
//! # Format (shard file)
//!
//! ```text
//! [MAGIC: 4 bytes "SHRD"]
//! [VERSION: u32 LE]
//! [HEADER_JSON_LEN: u32 LE]
//! [HEADER_JSON: utf-8 ShardHeader]
//! [RECORD_0: per schema field in name order: dtype(u8) + count(u64) + payload]
//! ...
//! [NUM_RECORDS: u64 LE]
//! [FOOTER_MAGIC: 4 bytes "DRHS"]
//! ```
//!
//! Until [`RecordWriter::commit`] runs, data lives in `<file>.partial`. Commit
//! appends the footer, fsyncs and renames to the final name, so a file under
//! its final name is always complete. A writer dropped without committing
//! deletes its partial files.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use shardprep_common::{IoResultExt, PrepError, PrepResult};

use crate::schema::{Record, Schema};

pub(crate) const MAGIC: &[u8; 4] = b"SHRD";
pub(crate) const FOOTER_MAGIC: &[u8; 4] = b"DRHS";
pub const FORMAT_VERSION: u32 = 1;
/// Magic + version + header length.
pub(crate) const PREAMBLE_LEN: usize = 4 + 4 + 4;
/// Record count + footer magic.
pub(crate) const FOOTER_LEN: usize = 8 + 4;

/// Metadata stored at the start of every shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardHeader {
    pub schema: Schema,
    /// Free text, by convention the dataset type.
    pub description: String,
    pub shard_id: usize,
    pub shard_count: usize,
    pub writer: String,
}

// ── Naming ──────────────────────────────────────────────────────────────────

/// Physical file names for `shard_count` shards of `base`.
///
/// One shard is `base` itself; otherwise `base` + index zero-padded to the
/// digit count of `shard_count - 1` (12 shards → `base00` .. `base11`).
pub fn shard_file_names(base: &Path, shard_count: usize) -> Vec<PathBuf> {
    if shard_count <= 1 {
        return vec![base.to_path_buf()];
    }
    let width = (shard_count - 1).to_string().len();
    (0..shard_count)
        .map(|i| {
            let mut name = OsString::from(base.as_os_str());
            name.push(format!("{i:0width$}"));
            PathBuf::from(name)
        })
        .collect()
}

/// Where a shard lives until it is committed.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Physical files to spread records over, round-robin.
    pub shard_count: usize,
    /// Stored in every shard header.
    pub description: String,
    /// Replace committed files that already exist.
    pub overwrite: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            shard_count: 1,
            description: String::new(),
            overwrite: false,
        }
    }
}

/// What [`RecordWriter::commit`] sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub files: Vec<PathBuf>,
    pub records_per_shard: Vec<u64>,
}

impl CommitSummary {
    pub fn total_records(&self) -> u64 {
        self.records_per_shard.iter().sum()
    }
}

// ── RecordWriter ────────────────────────────────────────────────────────────

struct ShardSink {
    path: PathBuf,
    partial: PathBuf,
    out: Option<BufWriter<File>>,
    records: u64,
}

/// Schema-bound writer over one or more shard files.
pub struct RecordWriter {
    sinks: Vec<ShardSink>,
    schema: Schema,
    overwrite: bool,
    next_shard: usize,
    committed: bool,
    scratch: Vec<u8>,
}

impl RecordWriter {
    /// Create the partial files for every shard of `base` and write their headers.
    pub fn create(base: &Path, schema: Schema, options: &WriterOptions) -> PrepResult<Self> {
        schema.check()?;
        if options.shard_count == 0 {
            return Err(PrepError::Config("shard_count must be at least 1".into()));
        }
        let paths = shard_file_names(base, options.shard_count);
        if !options.overwrite {
            if let Some(existing) = paths.iter().find(|p| p.exists()) {
                return Err(PrepError::OutputExists(existing.display().to_string()));
            }
        }

        let mut writer = Self {
            sinks: Vec::with_capacity(paths.len()),
            schema,
            overwrite: options.overwrite,
            next_shard: 0,
            committed: false,
            scratch: Vec::new(),
        };
        for (shard_id, path) in paths.into_iter().enumerate() {
            let header = ShardHeader {
                schema: writer.schema.clone(),
                description: options.description.clone(),
                shard_id,
                shard_count: options.shard_count,
                writer: concat!("shardprep ", env!("CARGO_PKG_VERSION")).to_string(),
            };
            let partial = partial_path(&path);
            let file = File::create(&partial).with_path(&partial)?;
            let mut sink = ShardSink {
                path,
                partial,
                out: Some(BufWriter::new(file)),
                records: 0,
            };
            let written = write_preamble(&mut sink, &header);
            // Tracked even on failure so Drop removes the partial file.
            writer.sinks.push(sink);
            written?;
        }
        tracing::debug!(
            base = %base.display(),
            shards = writer.sinks.len(),
            "Opened shard writer"
        );
        Ok(writer)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Final (committed) paths of every shard.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.sinks.iter().map(|s| s.path.clone()).collect()
    }

    pub fn records_written(&self) -> u64 {
        self.sinks.iter().map(|s| s.records).sum()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Validate and append a batch. Nothing is written if any record is invalid.
    pub fn write_raw_data(&mut self, records: &[Record]) -> PrepResult<()> {
        if self.committed {
            return Err(PrepError::AlreadyCommitted);
        }
        for record in records {
            self.schema.validate(record)?;
        }
        for record in records {
            self.scratch.clear();
            for (name, spec) in self.schema.fields() {
                let value = &record[name];
                self.scratch.push(spec.field_type.code());
                self.scratch.extend_from_slice(&(value.len() as u64).to_le_bytes());
                value.write_payload(&mut self.scratch);
            }
            let sink = &mut self.sinks[self.next_shard];
            let out = sink.out.as_mut().ok_or(PrepError::AlreadyCommitted)?;
            out.write_all(&self.scratch).with_path(&sink.partial)?;
            sink.records += 1;
            self.next_shard = (self.next_shard + 1) % self.sinks.len();
        }
        Ok(())
    }

    /// Seal every shard: footer, fsync, rename to the final name.
    ///
    /// Every shard is footed and synced before any is renamed. If a rename
    /// fails, shards already moved to their final names are removed again, so
    /// a failed commit never leaves part of the set under final names.
    pub fn commit(&mut self) -> PrepResult<CommitSummary> {
        if self.committed {
            return Err(PrepError::AlreadyCommitted);
        }
        for sink in &mut self.sinks {
            seal(sink)?;
        }

        let mut published: Vec<&Path> = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            if let Err(e) = publish(sink, self.overwrite) {
                for path in published {
                    if let Err(undo) = std::fs::remove_file(path) {
                        tracing::warn!(file = %path.display(), error = %undo, "Could not roll back shard");
                    }
                }
                return Err(e);
            }
            published.push(&sink.path);
            tracing::debug!(file = %sink.path.display(), records = sink.records, "Committed shard");
        }
        self.committed = true;
        Ok(CommitSummary {
            files: self.paths(),
            records_per_shard: self.sinks.iter().map(|s| s.records).collect(),
        })
    }
}

/// Footer + fsync; the file stays at its partial path.
fn seal(sink: &mut ShardSink) -> PrepResult<()> {
    let mut out = sink.out.take().ok_or(PrepError::AlreadyCommitted)?;
    out.write_all(&sink.records.to_le_bytes()).with_path(&sink.partial)?;
    out.write_all(FOOTER_MAGIC).with_path(&sink.partial)?;
    let file = out
        .into_inner()
        .map_err(|e| e.into_error())
        .with_path(&sink.partial)?;
    file.sync_all().with_path(&sink.partial)?;
    Ok(())
}

/// Move a sealed partial file to its final name.
fn publish(sink: &ShardSink, overwrite: bool) -> PrepResult<()> {
    if overwrite && sink.path.exists() {
        std::fs::remove_file(&sink.path).with_path(&sink.path)?;
    }
    std::fs::rename(&sink.partial, &sink.path).with_path(&sink.path)
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for sink in &mut self.sinks {
            sink.out.take();
            if sink.partial.exists() {
                if let Err(e) = std::fs::remove_file(&sink.partial) {
                    tracing::warn!(file = %sink.partial.display(), error = %e, "Could not remove uncommitted shard");
                } else {
                    tracing::warn!(file = %sink.path.display(), records = sink.records, "Discarded uncommitted shard");
                }
            }
        }
    }
}

fn write_preamble(sink: &mut ShardSink, header: &ShardHeader) -> PrepResult<()> {
    let json = serde_json::to_vec(header)
        .map_err(|e| PrepError::Schema(format!("serialise shard header: {e}")))?;
    let json_len = u32::try_from(json.len())
        .map_err(|_| PrepError::Schema("shard header too large".into()))?;
    let out = sink.out.as_mut().ok_or(PrepError::AlreadyCommitted)?;
    out.write_all(MAGIC).with_path(&sink.partial)?;
    out.write_all(&FORMAT_VERSION.to_le_bytes()).with_path(&sink.partial)?;
    out.write_all(&json_len.to_le_bytes()).with_path(&sink.partial)?;
    out.write_all(&json).with_path(&sink.partial)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldValue;

    fn window(field: &str, ids: &[i32]) -> Record {
        let mut record = Record::new();
        record.insert(field.to_string(), FieldValue::Int32(ids.to_vec()));
        record
    }

    #[test]
    fn shard_names_are_zero_padded() {
        let names = shard_file_names(Path::new("out"), 12);
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], PathBuf::from("out00"));
        assert_eq!(names[11], PathBuf::from("out11"));

        assert_eq!(shard_file_names(Path::new("out"), 1), vec![PathBuf::from("out")]);
        let ten = shard_file_names(Path::new("/data/wiki.rec"), 10);
        assert_eq!(ten[0], PathBuf::from("/data/wiki.rec0"));
        assert_eq!(ten[9], PathBuf::from("/data/wiki.rec9"));
        assert_eq!(shard_file_names(Path::new("x"), 101)[7], PathBuf::from("x007"));
    }

    #[test]
    fn commit_renames_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("train");
        let mut writer =
            RecordWriter::create(&base, Schema::token_ids("input_ids"), &WriterOptions::default())
                .unwrap();
        writer.write_raw_data(&[window("input_ids", &[1, 2, 3])]).unwrap();
        assert!(!base.exists());
        assert!(partial_path(&base).exists());

        let summary = writer.commit().unwrap();
        assert_eq!(summary.files, vec![base.clone()]);
        assert_eq!(summary.total_records(), 1);
        assert!(base.exists());
        assert!(!partial_path(&base).exists());
    }

    #[test]
    fn writes_after_commit_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("train");
        let mut writer =
            RecordWriter::create(&base, Schema::token_ids("input_ids"), &WriterOptions::default())
                .unwrap();
        writer.commit().unwrap();
        assert!(matches!(
            writer.write_raw_data(&[window("input_ids", &[1])]),
            Err(PrepError::AlreadyCommitted)
        ));
        assert!(matches!(writer.commit(), Err(PrepError::AlreadyCommitted)));
    }

    #[test]
    fn invalid_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("train");
        let mut writer =
            RecordWriter::create(&base, Schema::token_ids("input_ids"), &WriterOptions::default())
                .unwrap();
        let batch = [window("input_ids", &[1]), window("tokens", &[2])];
        assert!(matches!(writer.write_raw_data(&batch), Err(PrepError::Schema(_))));
        assert_eq!(writer.records_written(), 0);
    }

    #[test]
    fn dropped_writer_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("train");
        {
            let options = WriterOptions { shard_count: 3, ..Default::default() };
            let mut writer =
                RecordWriter::create(&base, Schema::token_ids("input_ids"), &options).unwrap();
            writer.write_raw_data(&[window("input_ids", &[1])]).unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn existing_output_is_refused_unless_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("train");
        std::fs::write(&base, b"old").unwrap();
        let schema = Schema::token_ids("input_ids");
        assert!(matches!(
            RecordWriter::create(&base, schema.clone(), &WriterOptions::default()),
            Err(PrepError::OutputExists(_))
        ));

        let options = WriterOptions { overwrite: true, ..Default::default() };
        let mut writer = RecordWriter::create(&base, schema, &options).unwrap();
        writer.commit().unwrap();
        assert_ne!(std::fs::read(&base).unwrap(), b"old");
    }

    #[test]
    fn failed_commit_publishes_no_shard() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("wiki");
        let options = WriterOptions { shard_count: 2, ..Default::default() };
        let mut writer = RecordWriter::create(&base, Schema::token_ids("input_ids"), &options).unwrap();
        let batch: Vec<Record> = (0..4).map(|i| window("input_ids", &[i])).collect();
        writer.write_raw_data(&batch).unwrap();

        // A directory squatting on the second final name makes its rename fail.
        let blocked = dir.path().join("wiki1");
        std::fs::create_dir(&blocked).unwrap();
        assert!(matches!(writer.commit(), Err(PrepError::Io { .. })));
        assert!(!writer.is_committed());
        assert!(!dir.path().join("wiki0").exists());

        drop(writer);
        let mut left: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        left.sort();
        assert_eq!(left, vec![blocked]);
    }

    #[test]
    fn records_round_robin_across_shards() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("wiki");
        let options = WriterOptions { shard_count: 2, ..Default::default() };
        let mut writer = RecordWriter::create(&base, Schema::token_ids("input_ids"), &options).unwrap();
        let batch: Vec<Record> = (0..5).map(|i| window("input_ids", &[i])).collect();
        writer.write_raw_data(&batch).unwrap();
        let summary = writer.commit().unwrap();
        assert_eq!(summary.records_per_shard, vec![3, 2]);
        assert_eq!(summary.files, vec![dir.path().join("wiki0"), dir.path().join("wiki1")]);
    }
}
