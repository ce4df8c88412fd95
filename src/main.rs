mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragsync::config::RagsyncConfig;

#[derive(Parser)]
#[command(
    name = "ragsync",
    version,
    about = "Keep document embeddings in sync and answer questions over them"
)]
struct Cli {
    /// Config file (default: ~/.ragsync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed every record whose vector is missing or from another model
    Sync,
    /// Remove fields from every record in the collection
    RetireField {
        /// Field names (dotted paths allowed)
        #[arg(required = true)]
        fields: Vec<String>,
        /// Also remove the embedding model tag and timestamp (implied when
        /// the vector field itself is retired)
        #[arg(long)]
        with_metadata: bool,
    },
    /// Answer a question using the most similar documents as context
    Query {
        /// The question (words are joined with spaces)
        question: Vec<String>,
        /// Number of documents to retrieve
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        top_k: Option<usize>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Load documents from a JSON array or JSON Lines file
    Import {
        file: PathBuf,
    },
    /// Manage vector indexes
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Show embedding coverage and indexes
    Status,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the configured vector index if it does not exist
    Ensure,
    /// List vector indexes
    List,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RagsyncConfig::load_from(path)?,
        None => RagsyncConfig::load()?,
    };

    // Log to stderr so stdout only carries command output.
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ok = match cli.command {
        Command::Sync => cli::sync::sync(&config).await?,
        Command::RetireField {
            fields,
            with_metadata,
        } => cli::retire::retire_field(&config, &fields, with_metadata)?,
        Command::Query {
            question,
            top_k,
            stream,
        } => {
            let question = (!question.is_empty()).then(|| question.join(" "));
            cli::query::query(&config, question, top_k, stream).await?;
            true
        }
        Command::Import { file } => {
            cli::import::import(&config, &file)?;
            true
        }
        Command::Index { action } => {
            match action {
                IndexAction::Ensure => cli::index::ensure(&config)?,
                IndexAction::List => cli::index::list(&config)?,
            }
            true
        }
        Command::Status => {
            cli::status::status(&config)?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
