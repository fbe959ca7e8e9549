//! Semdex CLI
//!
//! Command-line interface for the local semantic document index.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use semdex_core::storage::default_db_path;
use semdex_core::{
    IngestReport, Metric, Pipeline, QueryResult, SemdexConfig, Store, StoreStats,
};

/// Semdex - local semantic document index
#[derive(Parser, Debug)]
#[command(name = "semdex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ingest text files and query them by meaning")]
#[command(long_about = "Semdex embeds documents with a local BERT encoder (ONNX Runtime) and stores them in SQLite.\n\nInput files hold one document per blank-line-separated paragraph.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Database file (default: platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Use an in-memory database
    #[arg(long, global = true, conflicts_with = "db")]
    memory: bool,

    /// ONNX model file
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// tokenizer.json to use instead of the cached vocabulary
    #[arg(long, global = true)]
    tokenizer: Option<PathBuf>,

    /// Vocabulary name used for the cache lookup
    #[arg(long, global = true)]
    model_name: Option<String>,

    /// Distance metric for a new database (l2, cosine); existing ones keep theirs
    #[arg(long, global = true)]
    metric: Option<Metric>,

    /// Pooled inference sessions
    #[arg(long, global = true)]
    sessions: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed and store every document in a file
    Ingest {
        /// UTF-8 text file, documents separated by blank lines
        file: PathBuf,
    },

    /// Find the stored documents closest to a text
    Query {
        text: String,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Print the text stored under an id
    Get { id: String },

    /// Remove one document
    Delete { id: String },

    /// Remove every document
    Flush,

    /// Show database statistics
    Stats,

    /// Ingest a file into a throwaway in-memory store and query it once
    Run {
        file: PathBuf,
        query: String,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.log_json);

    let config = build_config(&cli.global)?;
    let json = cli.global.json;

    match cli.command {
        Commands::Ingest { file } => run_ingest(&config, &file, json).await,
        Commands::Query { text, k } => {
            let k = k.unwrap_or(config.top_k);
            run_query(&config, text, k, json).await
        }
        Commands::Get { id } => run_get(&config, &id, json),
        Commands::Delete { id } => run_delete(&config, &id),
        Commands::Flush => run_flush(&config),
        Commands::Stats => run_stats(&config, json),
        Commands::Run { file, query, k } => {
            let k = k.unwrap_or(config.top_k);
            run_oneshot(config, &file, query, k, json).await
        }
    }
}

/// Logs go to stderr so stdout stays clean for results
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Environment first, then explicit flags
fn build_config(args: &GlobalArgs) -> anyhow::Result<SemdexConfig> {
    let mut config = SemdexConfig::from_env().context("Invalid SEMDEX_* environment")?;

    if let Some(db) = &args.db {
        config.db_path = Some(db.clone());
    }
    if args.memory {
        config.in_memory = true;
    }
    if let Some(model) = &args.model {
        config.model_path = Some(model.clone());
    }
    if let Some(tokenizer) = &args.tokenizer {
        config.tokenizer_path = Some(tokenizer.clone());
    }
    if let Some(name) = &args.model_name {
        config.model_name = name.clone();
    }
    if let Some(metric) = args.metric {
        config.metric = Some(metric);
    }
    if let Some(sessions) = args.sessions {
        config.sessions = sessions;
    }

    config.validate()?;
    Ok(config)
}

/// `None` means in-memory
fn db_location(config: &SemdexConfig) -> anyhow::Result<Option<PathBuf>> {
    if config.in_memory {
        return Ok(None);
    }
    match &config.db_path {
        Some(path) => Ok(Some(path.clone())),
        None => Ok(Some(default_db_path()?)),
    }
}

/// Open the store alone, for commands that never embed
fn open_store(config: &SemdexConfig) -> anyhow::Result<Store> {
    let store = match db_location(config)? {
        Some(path) => Store::new(Some(path.clone()), config.store_options())
            .with_context(|| format!("Failed to open database {}", path.display()))?,
        None => Store::open_in_memory(config.store_options())?,
    };
    Ok(store)
}

fn open_pipeline(config: &SemdexConfig) -> anyhow::Result<Arc<Pipeline<semdex_core::EmbeddingRuntime>>> {
    let pipeline = Pipeline::open(
        &config.runtime_options(),
        db_location(config)?,
        config.store_options(),
        config.pipeline_options(),
    )
    .with_context(|| {
        format!(
            "Failed to initialize (model: {}, vocabulary: {})",
            config.model_path().display(),
            config.model_name
        )
    })?;
    Ok(Arc::new(pipeline))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run ingest command
async fn run_ingest(config: &SemdexConfig, file: &Path, json: bool) -> anyhow::Result<()> {
    let pipeline = open_pipeline(config)?;
    let report = pipeline
        .ingest_file_async(file)
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "{}: {}",
        "Documents Ingested".white().bold(),
        report.inserted.len().to_string().green()
    );
    if report.skipped_blank > 0 {
        println!("{}: {}", "Blank Segments Skipped".white().bold(), report.skipped_blank);
    }
    if !report.failed.is_empty() {
        println!(
            "{}: {}",
            "Failed".white().bold(),
            report.failed.len().to_string().red()
        );
        for failure in &report.failed {
            println!(
                "  {} #{} \"{}\": {}",
                "!".red(),
                failure.index,
                failure.excerpt,
                failure.error.dimmed()
            );
        }
    }
}

/// Run query command
async fn run_query(config: &SemdexConfig, text: String, k: usize, json: bool) -> anyhow::Result<()> {
    let pipeline = open_pipeline(config)?;
    let results = pipeline.search_async(text, k).await?;

    if json {
        return print_json(&results);
    }
    print_results(&results);
    Ok(())
}

fn print_results(results: &[QueryResult]) {
    if results.is_empty() {
        println!("{}", "No documents found.".dimmed());
        return;
    }

    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{} {} {}",
            format!("{}.", rank + 1).cyan().bold(),
            format!("[{:.4}]", hit.distance).yellow(),
            hit.id.dimmed()
        );
        println!("   {}", hit.text);
    }
}

/// Run get command
fn run_get(config: &SemdexConfig, id: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let text = store.get_text(id)?;

    if json {
        return print_json(&serde_json::json!({ "id": id, "text": text }));
    }
    println!("{}", text);
    Ok(())
}

/// Run delete command
fn run_delete(config: &SemdexConfig, id: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if store.delete(id)? {
        println!("{} {}", "Deleted".green(), id);
    } else {
        println!("{} {}", "Not found:".yellow(), id);
    }
    Ok(())
}

/// Run flush command
fn run_flush(config: &SemdexConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let before = store.len()?;
    store.flush()?;
    println!("{} {} documents", "Flushed".green(), before);
    Ok(())
}

/// Run stats command
fn run_stats(config: &SemdexConfig, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;

    if json {
        return print_json(&stats);
    }
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &StoreStats) {
    println!("{}", "=== Semdex Statistics ===".cyan().bold());
    println!();
    println!("{}: {}", "Documents".white().bold(), stats.documents);
    println!("{}: {}", "Indexed Vectors".white().bold(), stats.indexed_vectors);
    println!("{}: {}", "Dimensions".white().bold(), stats.dimensions);
    println!("{}: {}", "Metric".white().bold(), stats.metric);
    println!("{}: {}", "Index".white().bold(), stats.index_kind);
    if let Some(model) = &stats.embedding_model {
        println!("{}: {}", "Embedding Model".white().bold(), model);
    }
    println!("{}: {}", "SQLite Version".white().bold(), stats.sqlite_version);
    println!("{}: {}", "Schema Version".white().bold(), stats.schema_version);
    match &stats.path {
        Some(path) => println!("{}: {}", "Database".white().bold(), path.display()),
        None => println!("{}: {}", "Database".white().bold(), "in-memory".dimmed()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OneShotOutput {
    report: IngestReport,
    results: Vec<QueryResult>,
}

/// Run the one-shot ingest-then-query flow
async fn run_oneshot(
    mut config: SemdexConfig,
    file: &Path,
    query: String,
    k: usize,
    json: bool,
) -> anyhow::Result<()> {
    config.in_memory = true;
    let pipeline = open_pipeline(&config)?;

    let report = pipeline
        .ingest_file_async(file)
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;
    info!(documents = report.inserted.len(), "Ingestion complete");

    let results = pipeline.search_async(query, k).await?;

    if json {
        return print_json(&OneShotOutput { report, results });
    }
    print_report(&report);
    println!();
    print_results(&results);
    Ok(())
}
