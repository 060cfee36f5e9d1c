use thiserror::Error;

pub type Result<T> = std::result::Result<T, VulnError>;

#[derive(Error, Debug)]
pub enum VulnError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Store(#[from] database::StoreError),

    #[error(transparent)]
    Ingest(#[from] indexer::IngestError),

    #[error(transparent)]
    Reasoner(#[from] analysis::reasoner::ReasonerError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod analysis;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod retriever;
