use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vuln_rag::Result;
use vuln_rag::commands::{
    analyze_snippet, ingest_corpus, list_collections, query_collection, remove_collection,
    resolve_config_dir,
};
use vuln_rag::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "vuln-rag")]
#[command(about = "Retrieval-grounded vulnerability detection for code snippets")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and collections [default: ~/.vuln-rag]
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding server, reasoner and retrieval defaults
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build a collection from a corpus of vulnerability patterns
    Ingest {
        /// Corpus root with one directory per vulnerability class
        corpus_dir: PathBuf,
        /// Collection name, defaults to retrieval.collection
        #[arg(long)]
        collection: Option<String>,
    },
    /// Show the reference patterns most similar to a code snippet
    Query {
        /// File containing the snippet, or - for stdin
        input: String,
        /// Collection name, defaults to retrieval.collection
        #[arg(long)]
        collection: Option<String>,
        /// Number of references to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Analyze a code snippet with retrieved patterns as grounding
    Analyze {
        /// File containing the snippet, or - for stdin
        input: String,
        /// Collection name, defaults to retrieval.collection
        #[arg(long)]
        collection: Option<String>,
        /// Number of references to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// List persisted collections
    Collections,
    /// Delete a persisted collection
    Remove {
        /// Collection name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest {
            corpus_dir,
            collection,
        } => {
            ingest_corpus(&config_dir, &corpus_dir, collection).await?;
        }
        Commands::Query {
            input,
            collection,
            k,
        } => {
            query_collection(&config_dir, &input, collection, k).await?;
        }
        Commands::Analyze {
            input,
            collection,
            k,
        } => {
            analyze_snippet(&config_dir, &input, collection, k).await?;
        }
        Commands::Collections => {
            list_collections(&config_dir).await?;
        }
        Commands::Remove { name } => {
            remove_collection(&config_dir, &name).await?;
        }
    }

    Ok(())
}
