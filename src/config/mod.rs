// Configuration management module
// TOML settings for the embedder, reasoner, corpus layout and retrieval defaults

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, CorpusConfig, OllamaConfig, ReasonerConfig, RetrievalConfig,
};
