use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use shardprep_common::{ConvertConfig, DatasetType, TokenizerKind};
use shardprep_pipeline::run_conversion;
use shardprep_record::{FieldValue, ShardReader};

/// Ids shown per field by `inspect`.
const PREVIEW_IDS: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "shardprep", about = "Convert text corpora into sharded token-window records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tokenize a corpus and write fixed-length windows to shard files.
    Convert(ConvertArgs),
    /// Run a conversion described by a JSON config (created with defaults if missing).
    Run(RunArgs),
    /// Print the header and first records of a committed shard.
    Inspect(InspectArgs),
}

// ── Convert ────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// wiki, lambada or openwebtext.
    #[arg(long, default_value = "openwebtext")]
    dataset_type: DatasetType,
    #[arg(long, default_value = "*.txt")]
    input_glob: String,
    #[arg(long, default_value = "./output/records")]
    output_file: PathBuf,
    /// generic (alias gpt) or segmentation (alias jieba).
    #[arg(long, default_value = "segmentation")]
    tokenizer: TokenizerKind,
    /// tokenizer.json for the selected backend.
    #[arg(long)]
    model_file: Option<PathBuf>,
    /// Hub identifier for the generic backend when no model file is given.
    #[arg(long, default_value = "gpt2")]
    pretrained: String,
    #[arg(long, default_value_t = 1)]
    file_partition: usize,
    #[arg(long, default_value_t = 1025)]
    seq_length: usize,
    #[arg(long, default_value_t = 3)]
    eot: u32,
    #[arg(long, default_value = "input_ids")]
    data_column_name: String,
    #[arg(long, default_value_t = 1024)]
    write_batch_size: usize,
    /// Rayon threads for tokenization; 0 keeps rayon's default.
    #[arg(long, default_value_t = 0)]
    num_threads: usize,
    #[arg(long)]
    overwrite: bool,
    #[arg(long)]
    no_progress: bool,
    /// Also write the resolved config to this JSON file.
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl ConvertArgs {
    fn to_config(&self) -> ConvertConfig {
        ConvertConfig {
            dataset_type: self.dataset_type,
            input_glob: self.input_glob.clone(),
            output_file: self.output_file.clone(),
            tokenizer: self.tokenizer,
            model_file: self.model_file.clone(),
            pretrained: self.pretrained.clone(),
            file_partition: self.file_partition,
            seq_length: self.seq_length,
            eot: self.eot,
            data_column_name: self.data_column_name.clone(),
            write_batch_size: self.write_batch_size,
            num_threads: self.num_threads,
            overwrite: self.overwrite,
            show_progress: !self.no_progress,
        }
    }
}

// ── Run / Inspect ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct RunArgs {
    #[arg(long, default_value = "shardprep.json")]
    config: PathBuf,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    #[arg(long)]
    file: PathBuf,
    /// Number of records to print.
    #[arg(long, default_value_t = 3)]
    show: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Convert(args) => cmd_convert(args),
        Command::Run(args) => cmd_run(args),
        Command::Inspect(args) => cmd_inspect(args),
    }
}

// ── Command implementations ────────────────────────────────────────────────────

fn cmd_convert(args: ConvertArgs) -> Result<()> {
    let config = args.to_config();
    if let Some(path) = &args.save_config {
        config.save(path)?;
        eprintln!("Saved config to {}", path.display());
    }
    execute(&config)
}

fn cmd_run(args: RunArgs) -> Result<()> {
    if !args.config.exists() {
        ConvertConfig::default().save(&args.config)?;
        eprintln!(
            "Created default config at {}; edit it and run again",
            args.config.display()
        );
        return Ok(());
    }
    let config = ConvertConfig::load(&args.config)?;
    execute(&config)
}

fn execute(config: &ConvertConfig) -> Result<()> {
    if config.num_threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .build_global()
            .context("failed to configure the rayon thread pool")?;
    }

    let summary = run_conversion(config)?;
    let first = summary
        .first_output()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| config.output_file.display().to_string());
    println!("Transform finished, output files refer: {first}");
    if !summary.dataset_type.is_parallel() {
        println!("Transformed {} records.", summary.records);
    }
    eprintln!(
        "{} input files, {} records in {} shard file(s)",
        summary.files,
        summary.records,
        summary.output_files.len()
    );
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> Result<()> {
    let reader = ShardReader::open(&args.file)?;
    let header = reader.header();
    println!("file:        {}", reader.path().display());
    println!("description: {}", header.description);
    println!("shard:       {} of {}", header.shard_id, header.shard_count);
    println!("writer:      {}", header.writer);
    println!("schema:      {}", serde_json::to_string(&header.schema)?);
    println!("records:     {}", reader.len());

    for (index, record) in reader.records().take(args.show).enumerate() {
        let record = record?;
        for (name, value) in &record {
            println!("[{index}] {name}: {}", preview(value));
        }
    }
    Ok(())
}

fn preview(value: &FieldValue) -> String {
    match value.as_i32() {
        Some(ids) => {
            let head: Vec<String> = ids.iter().take(PREVIEW_IDS).map(i32::to_string).collect();
            let more = if ids.len() > PREVIEW_IDS { ", ..." } else { "" };
            format!("len={} [{}{more}]", ids.len(), head.join(", "))
        }
        None => format!("{:?} len={}", value.field_type(), value.len()),
    }
}
