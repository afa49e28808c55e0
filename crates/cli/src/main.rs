//! ragent CLI — the main entry point.
//!
//! Commands:
//! - `chunk`   — Split a file and print the chunks
//! - `ingest`  — Chunk, embed and index files or directories
//! - `search`  — Query the index
//! - `tools`   — List the built-in tools
//! - `call`    — Invoke one tool with JSON arguments
//! - `config`  — Show, validate or initialize the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragent",
    about = "ragent — retrieval-augmented, tool-using agent runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.ragent/config.toml)
    #[arg(short, long, global = true, env = "RAGENT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a text file into chunks
    Chunk {
        file: PathBuf,

        /// Override chunking.max_size
        #[arg(long)]
        max_size: Option<usize>,

        /// Override chunking.overlap
        #[arg(long)]
        overlap: Option<usize>,

        /// Print chunks as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ingest files or directories into the index
    Ingest {
        #[arg(required = true)]
        sources: Vec<String>,

        /// Index file (defaults to index.path from the config)
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Search the index
    Search {
        query: String,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only return chunks from this source
        #[arg(long)]
        source: Option<String>,

        /// Drop results scoring below this
        #[arg(long)]
        min_score: Option<f32>,

        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// List available tools
    Tools,

    /// Invoke a tool directly
    Call {
        tool: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,

        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chunk {
            file,
            max_size,
            overlap,
            json,
        } => commands::chunk::run(config_path, &file, max_size, overlap, json).await?,
        Commands::Ingest { sources, index } => {
            commands::ingest::run(config_path, &sources, index.as_deref()).await?
        }
        Commands::Search {
            query,
            top_k,
            source,
            min_score,
            index,
        } => {
            let options = commands::search::SearchArgs {
                top_k,
                source,
                min_score,
            };
            commands::search::run(config_path, &query, options, index.as_deref()).await?
        }
        Commands::Tools => commands::tools::list(config_path).await?,
        Commands::Call {
            tool,
            arguments,
            index,
        } => commands::tools::call(config_path, &tool, &arguments, index.as_deref()).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Init { force } => commands::config_cmd::init(config_path, force)?,
        },
    }

    Ok(())
}
