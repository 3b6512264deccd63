//! End-to-end conversions over temporary corpora.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shardprep_common::{ConvertConfig, DatasetType, PrepError, PrepResult, TokenizerKind};
use shardprep_core::TokenizerAdapter;
use shardprep_pipeline::{convert_with_tokenizer, ShardOrchestrator};
use shardprep_record::ShardReader;

/// Every whitespace-separated word is its own id; anything non-numeric fails.
struct NumberTokenizer;

impl TokenizerAdapter for NumberTokenizer {
    fn tokenize(&self, text: &str) -> PrepResult<Vec<String>> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }
    fn convert_tokens_to_ids(&self, tokens: &[String]) -> PrepResult<Vec<u32>> {
        tokens
            .iter()
            .map(|t| {
                t.parse()
                    .map_err(|_| PrepError::Tokenizer(format!("not a number: {t}")))
            })
            .collect()
    }
    fn convert_ids_to_tokens(&self, ids: &[u32]) -> PrepResult<Vec<String>> {
        Ok(ids.iter().map(u32::to_string).collect())
    }
    fn decode(&self, ids: &[u32]) -> PrepResult<String> {
        Ok(self.convert_ids_to_tokens(ids)?.join(" "))
    }
    fn vocab_size(&self) -> usize {
        usize::MAX
    }
    fn eod(&self) -> Option<u32> {
        Some(0)
    }
    fn eot(&self) -> Option<u32> {
        Some(0)
    }
    fn pad(&self) -> Option<u32> {
        None
    }
}

fn tokenizer() -> Arc<dyn TokenizerAdapter> {
    Arc::new(NumberTokenizer)
}

fn config(dir: &Path, kind: DatasetType, pattern: &str) -> ConvertConfig {
    ConvertConfig {
        dataset_type: kind,
        input_glob: dir.join(pattern).display().to_string(),
        output_file: dir.join("out").join("records"),
        tokenizer: TokenizerKind::Generic,
        model_file: None,
        seq_length: 1024,
        eot: 0,
        show_progress: false,
        ..Default::default()
    }
}

/// `count` ids starting at 1, one document.
fn numbers(count: u32) -> String {
    (1..=count).map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
}

fn read_windows(path: &Path) -> Vec<Vec<i32>> {
    let reader = ShardReader::open(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap()["input_ids"].as_i32().unwrap().to_vec())
        .collect()
}

fn leftover_partials(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "partial"))
        .collect()
}

#[test]
fn openwebtext_spreads_files_over_shards() {
    let dir = tempfile::tempdir().unwrap();
    // 2049 ids + eot = 2050 tokens per file: two windows of 1024 each, 2 dropped.
    for name in ["a.txt", "b.txt", "c.txt"] {
        std::fs::write(dir.path().join(name), numbers(2049)).unwrap();
    }
    let mut cfg = config(dir.path(), DatasetType::OpenWebText, "*.txt");
    cfg.file_partition = 2;

    let summary = convert_with_tokenizer(&cfg, tokenizer()).unwrap();
    assert_eq!(summary.records, 6);
    assert_eq!(summary.files, 3);
    assert_eq!(summary.output_files.len(), 2);
    assert!(summary.first_output().unwrap().ends_with("records0"));

    let windows: Vec<Vec<i32>> = summary.output_files.iter().flat_map(|p| read_windows(p)).collect();
    assert_eq!(windows.len(), 6);
    assert!(windows.iter().all(|w| w.len() == 1024));
    // Files are windowed independently, so every window starts at 1 or 1025.
    assert!(windows.iter().all(|w| w[0] == 1 || w[0] == 1025));
    assert!(leftover_partials(&dir.path().join("out")).is_empty());
}

#[test]
fn single_partition_writes_exactly_the_output_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), numbers(10)).unwrap();
    let mut cfg = config(dir.path(), DatasetType::OpenWebText, "*.txt");
    cfg.seq_length = 4;

    let summary = convert_with_tokenizer(&cfg, tokenizer()).unwrap();
    assert_eq!(summary.output_files, vec![cfg.output_file.clone()]);
    let windows = read_windows(&cfg.output_file);
    assert_eq!(windows, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
}

#[test]
fn zero_byte_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.txt"), "").unwrap();
    std::fs::write(dir.path().join("full.txt"), "1 2 3\n\n4 5").unwrap();
    let mut cfg = config(dir.path(), DatasetType::OpenWebText, "*.txt");
    cfg.seq_length = 3;

    let summary = convert_with_tokenizer(&cfg, tokenizer()).unwrap();
    // 1 2 3 <eot> 4 5 <eot>
    assert_eq!(summary.records, 2);
    assert_eq!(read_windows(&cfg.output_file), vec![vec![1, 2, 3], vec![0, 4, 5]]);
}

#[test]
fn failing_worker_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), numbers(8)).unwrap();
    std::fs::write(dir.path().join("b.txt"), "1 2 three 4").unwrap();
    let mut cfg = config(dir.path(), DatasetType::OpenWebText, "*.txt");
    cfg.file_partition = 2;
    cfg.seq_length = 4;

    match convert_with_tokenizer(&cfg, tokenizer()) {
        Err(PrepError::Workers { failed, total, .. }) => assert_eq!((failed, total), (1, 2)),
        other => panic!("expected Workers error, got {other:?}"),
    }
    let out = dir.path().join("out");
    let committed = ["records0", "records1"]
        .iter()
        .filter(|name| out.join(name).exists())
        .count();
    assert_eq!(committed, 1);
    assert!(leftover_partials(&out).is_empty());
}

#[test]
fn wiki_round_robins_over_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let text = " = Title = \n\n 1 2 3 4 5 \n\n = = Section = = \n\n 6 7 8 9 \n";
    std::fs::write(dir.path().join("wiki.train.tokens"), text).unwrap();
    let mut cfg = config(dir.path(), DatasetType::Wiki, "wiki.*");
    cfg.file_partition = 2;
    cfg.seq_length = 2;

    let summary = convert_with_tokenizer(&cfg, tokenizer()).unwrap();
    // 1 2 3 4 5 <eot> 6 7 8 9 <eot>: five windows, one token dropped.
    assert_eq!(summary.records, 5);
    assert_eq!(
        read_windows(&summary.output_files[0]),
        vec![vec![1, 2], vec![5, 0], vec![8, 9]]
    );
    assert_eq!(read_windows(&summary.output_files[1]), vec![vec![3, 4], vec![6, 7]]);
}

#[test]
fn lambada_strips_quotes_and_sentence_ends() {
    let dir = tempfile::tempdir().unwrap();
    let lines = "{\"text\": \"\u{201C}7 8 9.\u{201D}\"}\n{\"text\": \"10 11 .\"}\n";
    std::fs::write(dir.path().join("lambada.jsonl"), lines).unwrap();
    let mut cfg = config(dir.path(), DatasetType::Lambada, "*.jsonl");
    cfg.seq_length = 2;

    let summary = convert_with_tokenizer(&cfg, tokenizer()).unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(
        read_windows(&cfg.output_file),
        vec![vec![7, 8], vec![9, 0], vec![10, 11]]
    );
}

#[test]
fn wiki_without_inputs_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), DatasetType::Wiki, "*.tokens");
    let err = convert_with_tokenizer(&cfg, tokenizer()).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn existing_output_needs_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), numbers(8)).unwrap();
    let mut cfg = config(dir.path(), DatasetType::OpenWebText, "*.txt");
    cfg.seq_length = 4;

    convert_with_tokenizer(&cfg, tokenizer()).unwrap();
    assert!(matches!(
        convert_with_tokenizer(&cfg, tokenizer()),
        Err(PrepError::OutputExists(_))
    ));

    cfg.overwrite = true;
    let summary = convert_with_tokenizer(&cfg, tokenizer()).unwrap();
    assert_eq!(summary.records, 2);
}

#[test]
fn orchestrator_pulls_inputs_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path(), DatasetType::OpenWebText, "*.txt");
    cfg.file_partition = 2;
    cfg.seq_length = 4;
    std::fs::create_dir_all(dir.path().join("out")).unwrap();

    // Each input is only written when the feeder asks for it.
    let root = dir.path().to_path_buf();
    let mut next = 0u32;
    let inputs = std::iter::from_fn(move || {
        if next == 5 {
            return None;
        }
        next += 1;
        let path = root.join(format!("doc{next}.txt"));
        std::fs::write(&path, numbers(7)).unwrap();
        Some(path)
    });

    let report = ShardOrchestrator::new(&cfg, tokenizer()).run(inputs).unwrap();
    // 7 ids + eot = 8 tokens per file: two windows each.
    assert_eq!(report.total_files(), 5);
    assert_eq!(report.total_records(), 10);
    let windows: Vec<Vec<i32>> = report.output_files().iter().flat_map(|p| read_windows(p)).collect();
    assert_eq!(windows.len(), 10);
    assert!(windows.iter().all(|w| *w == vec![1, 2, 3, 4] || *w == vec![5, 6, 7, 0]));
}
