//! # Complaint RAG CLI (`crag`)
//!
//! ## Usage
//!
//! ```bash
//! crag --config ./config/crag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crag index` | Chunk, embed and index the complaint dataset |
//! | `crag retrieve "<q>"` | Show the chunks most similar to a question |
//! | `crag ask "<q>"` | Answer a question from the indexed complaints |
//! | `crag eval` | Answer a batch of analyst questions |
//! | `crag stats` | Summarise the persisted index |

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use complaint_rag::progress::ProgressMode;
use complaint_rag::{answer, config, ingest, retrieve, stats};

/// Retrieval-augmented question answering over customer complaints.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/crag.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "crag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crag.toml")]
    config: PathBuf,

    /// Log indexing and query milestones to stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the complaint dataset.
    ///
    /// Fails if the collection already exists unless `--rebuild` (drop and
    /// recreate) or `--append` (add to it) is given.
    Index {
        /// Dataset file; overrides `[dataset] path`.
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Drop the existing collection first.
        #[arg(long, conflicts_with = "append")]
        rebuild: bool,

        /// Add to the existing collection.
        #[arg(long)]
        append: bool,

        /// Index at most this many complaints.
        #[arg(long)]
        limit: Option<usize>,

        /// Show record and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to human when stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Show the chunks most similar to a question.
    Retrieve {
        question: String,

        /// Number of chunks; defaults to `[retrieval] top_k`.
        #[arg(long, short)]
        k: Option<usize>,
    },

    /// Answer a question from the indexed complaints.
    Ask {
        question: String,

        /// Number of chunks to ground the answer on.
        #[arg(long, short)]
        k: Option<usize>,

        /// Print the answer record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a batch of questions and print the top sources for each.
    Eval {
        /// One question per line; defaults to the built-in analyst questions.
        #[arg(long)]
        questions: Option<PathBuf>,

        /// Write all answer records to this JSON file.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Summarise the persisted index.
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Index {
            dataset,
            rebuild,
            append,
            limit,
            dry_run,
            progress,
        } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_index(&cfg, dataset, rebuild, append, limit, dry_run, mode).await?;
        }
        Commands::Retrieve { question, k } => {
            retrieve::run_retrieve(&cfg, &question, k).await?;
        }
        Commands::Ask { question, k, json } => {
            answer::run_ask(&cfg, &question, k, json).await?;
        }
        Commands::Eval { questions, output } => {
            answer::run_eval(&cfg, questions.as_deref(), output.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
