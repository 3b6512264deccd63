//! Parallel shard orchestrator.
//!
//! One scoped worker thread per output shard. The calling thread feeds input
//! paths into a bounded queue; every worker owns exactly one
//! [`RecordWriter`] and commits it when the queue closes. A run succeeds only
//! if every worker does: failures and panics are collected per worker and
//! surfaced as one [`PrepError::Workers`].

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};

use shardprep_common::{ConvertConfig, PrepError, PrepResult};
use shardprep_core::TokenizerAdapter;
use shardprep_record::{shard_file_names, RecordWriter, Schema, WriterOptions};

use crate::convert::write_windows;
use crate::corpus::{CorpusStats, CorpusWindows};

/// Paths queued per worker before the feeder blocks.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// What one worker committed.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub shard_id: usize,
    pub path: PathBuf,
    pub records: u64,
    pub stats: CorpusStats,
}

/// Reports of every worker, in shard order.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorReport {
    pub workers: Vec<WorkerReport>,
}

impl OrchestratorReport {
    pub fn output_files(&self) -> Vec<PathBuf> {
        self.workers.iter().map(|w| w.path.clone()).collect()
    }

    pub fn total_records(&self) -> u64 {
        self.workers.iter().map(|w| w.records).sum()
    }

    pub fn total_files(&self) -> u64 {
        self.workers.iter().map(|w| w.stats.files).sum()
    }
}

pub struct ShardOrchestrator<'a> {
    config: &'a ConvertConfig,
    tokenizer: Arc<dyn TokenizerAdapter>,
}

impl<'a> ShardOrchestrator<'a> {
    pub fn new(config: &'a ConvertConfig, tokenizer: Arc<dyn TokenizerAdapter>) -> Self {
        Self { config, tokenizer }
    }

    /// Spread `inputs` over `file_partition` workers and wait for all of them.
    ///
    /// `inputs` is pulled on the calling thread only as fast as workers drain
    /// the queue.
    pub fn run<I>(&self, inputs: I) -> PrepResult<OrchestratorReport>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let workers = self.config.file_partition.max(1);
        let paths = shard_file_names(&self.config.output_file, workers);
        if !self.config.overwrite {
            if let Some(existing) = paths.iter().find(|p| p.exists()) {
                return Err(PrepError::OutputExists(existing.display().to_string()));
            }
        }

        tracing::info!(workers, "Launching shard workers");
        let progress = self.progress_bar();
        let (tx, rx) = crossbeam_channel::bounded::<PathBuf>(workers * QUEUE_DEPTH_PER_WORKER);

        let outcomes: Vec<PrepResult<WorkerReport>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for (shard_id, path) in paths.iter().enumerate() {
                let rx = rx.clone();
                let progress = progress.clone();
                let spawned = thread::Builder::new()
                    .name(format!("shard-{shard_id}"))
                    .spawn_scoped(scope, move || self.run_worker(shard_id, path, rx, &progress));
                handles.push(spawned);
            }
            drop(rx);

            for input in inputs {
                // Only fails once every worker has exited.
                if tx.send(input).is_err() {
                    break;
                }
            }
            drop(tx);

            handles
                .into_iter()
                .map(|spawned| match spawned {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|payload| Err(PrepError::WorkerPanic(panic_message(payload)))),
                    Err(e) => Err(PrepError::from(e)),
                })
                .collect()
        });
        progress.finish_and_clear();

        collect_reports(outcomes)
    }

    fn run_worker(
        &self,
        shard_id: usize,
        path: &Path,
        files: Receiver<PathBuf>,
        progress: &ProgressBar,
    ) -> PrepResult<WorkerReport> {
        let config = self.config;
        let options = WriterOptions {
            shard_count: 1,
            description: config.dataset_type.as_str().to_string(),
            overwrite: config.overwrite,
        };
        let mut writer =
            RecordWriter::create(path, Schema::token_ids(&config.data_column_name), &options)?;
        let label = format!("shard-{shard_id}");

        let files = files.into_iter().inspect(|_| progress.inc(1));
        let mut corpus = CorpusWindows::new(
            config.dataset_type,
            self.tokenizer.as_ref(),
            files,
            config.seq_length,
            config.eot,
        );
        let records = write_windows(
            &mut writer,
            corpus.by_ref(),
            &config.data_column_name,
            config.write_batch_size,
            &label,
        )?;
        writer.commit()?;

        let stats = corpus.stats();
        tracing::info!(
            shard = shard_id,
            records,
            files = stats.files,
            dropped_tokens = stats.dropped_tokens,
            "Shard committed"
        );
        Ok(WorkerReport {
            shard_id,
            path: path.to_path_buf(),
            records,
            stats,
        })
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(200));
        pb
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Fold per-worker outcomes into one report, or one error naming every failure.
fn collect_reports(outcomes: Vec<PrepResult<WorkerReport>>) -> PrepResult<OrchestratorReport> {
    let total = outcomes.len();
    let mut workers = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (shard_id, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(report) => workers.push(report),
            Err(e) => {
                tracing::error!(shard = shard_id, error = %e, "Shard worker failed");
                failures.push(format!("shard-{shard_id}: {e}"));
            }
        }
    }
    if !failures.is_empty() {
        return Err(PrepError::Workers {
            failed: failures.len(),
            total,
            details: failures.join("; "),
        });
    }
    Ok(OrchestratorReport { workers })
}
