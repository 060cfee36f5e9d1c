use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::analysis::{Analyzer, OpenRouterClient};
use crate::config::Config;
use crate::database::CollectionStore;
use crate::embeddings::OllamaClient;
use crate::indexer::IngestionPipeline;
use crate::retriever::{QueryResult, Retriever};

const PREVIEW_LENGTH: usize = 72;

/// Directory holding `config.toml` and the collections, `--config-dir` or `~/.vuln-rag`
#[inline]
pub fn resolve_config_dir(config_dir: Option<PathBuf>) -> Result<PathBuf> {
    match config_dir {
        Some(dir) => Ok(dir),
        None => Ok(Config::default_dir()?),
    }
}

/// Read a code snippet from a file, or from stdin when `input` is `-`
#[inline]
pub fn read_snippet(input: &str) -> Result<String> {
    let snippet = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read snippet from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read snippet from {input}"))?
    };

    if snippet.trim().is_empty() {
        bail!("Code snippet is empty");
    }

    Ok(snippet)
}

/// Build a collection from a corpus directory and persist it
#[inline]
pub async fn ingest_corpus(
    config_dir: &Path,
    corpus_dir: &Path,
    collection: Option<String>,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let name = collection.unwrap_or_else(|| config.retrieval.collection.clone());

    let embedder =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    embedder
        .health_check()
        .context("Ollama is not ready; run 'vuln-rag config' to check the connection")?;

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    info!(
        "Ingesting {} into collection '{}'",
        corpus_dir.display(),
        name
    );

    let report = IngestionPipeline::from_config(embedder, &config)
        .with_progress(bar)
        .run(corpus_dir, &name)
        .await?;

    println!(
        "{} Indexed {} documents from {} categories into '{}'",
        style("✓").green(),
        report.documents,
        report.categories,
        style(&report.collection).cyan()
    );
    if let Some(dimension) = report.dimension {
        println!("  Embedding dimension: {dimension}");
    }
    if report.skipped > 0 {
        println!("  Skipped entries: {}", report.skipped);
    }
    println!("  Stored at: {}", report.path.display());

    Ok(())
}

/// Print the reference documents most similar to a snippet
#[inline]
pub async fn query_collection(
    config_dir: &Path,
    input: &str,
    collection: Option<String>,
    top_k: Option<usize>,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let snippet = read_snippet(input)?;
    let retriever = open_retriever(&config, collection).await?;
    let k = top_k.unwrap_or(config.retrieval.top_k);

    let result = retriever.retrieve(&snippet, k)?;
    print_references(&result);

    Ok(())
}

/// Retrieve references for a snippet and ask the reasoner for an analysis
#[inline]
pub async fn analyze_snippet(
    config_dir: &Path,
    input: &str,
    collection: Option<String>,
    top_k: Option<usize>,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let snippet = read_snippet(input)?;
    let reasoner = OpenRouterClient::new(&config.reasoner)?;
    let retriever = open_retriever(&config, collection).await?;
    let k = top_k.unwrap_or(config.retrieval.top_k);

    let analysis = Analyzer::new(retriever, reasoner, k).analyze(&snippet)?;

    print_references(&analysis.references);
    println!();
    println!("{}", style("Analysis Result").bold());
    println!();
    println!("{}", analysis.report.answer.trim_end());

    if let Some(findings) = &analysis.report.findings {
        println!();
        match &findings.vulnerability {
            Some(name) => println!("{} {}", style("Finding:").red().bold(), name),
            None => println!("{}", style("No vulnerability reported").green()),
        }
    }

    Ok(())
}

/// List persisted collections
#[inline]
pub async fn list_collections(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;
    let store = CollectionStore::from_config(&config);
    let summaries = store.list().await?;

    if summaries.is_empty() {
        println!("No collections have been built yet.");
        println!("Use 'vuln-rag ingest <CORPUS_DIR>' to build one.");
        return Ok(());
    }

    println!("Collections ({} total):", summaries.len());
    println!();

    for summary in &summaries {
        let marker = if summary.name == config.retrieval.collection {
            " (default)"
        } else {
            ""
        };
        println!("{}{}", style(&summary.name).cyan().bold(), marker);
        println!("   Documents: {}", summary.document_count);
        match summary.dimension {
            Some(dimension) => println!("   Dimension: {dimension}"),
            None => println!("   Dimension: -"),
        }
        println!("   Embedding model: {}", summary.embedding_model);
        println!(
            "   Built: {}",
            summary.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!();
    }

    Ok(())
}

/// Delete a persisted collection
#[inline]
pub async fn remove_collection(config_dir: &Path, name: &str) -> Result<()> {
    let config = Config::load(config_dir)?;
    let store = CollectionStore::from_config(&config);

    store.remove(name).await?;
    println!("{} Removed collection '{}'", style("✓").green(), name);

    if name == config.retrieval.collection {
        warn!("Removed the default collection '{}'", name);
    }

    Ok(())
}

async fn open_retriever(
    config: &Config,
    collection: Option<String>,
) -> Result<Retriever<OllamaClient>> {
    let name = collection.unwrap_or_else(|| config.retrieval.collection.clone());
    let embedder =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    let store = CollectionStore::from_config(config);

    let retriever = Retriever::open(&store, &name, embedder)
        .await
        .with_context(|| format!("Failed to open collection '{name}'"))?;
    Ok(retriever)
}

fn print_references(result: &QueryResult) {
    if result.is_empty() {
        println!("No reference vulnerabilities available.");
        return;
    }

    println!("Reference vulnerabilities ({}):", result.len());
    for (rank, hit) in result.iter().enumerate() {
        let document = &hit.document;
        println!(
            "{:>2}. {} {} {}",
            rank + 1,
            style(format!("{:.3}", hit.score)).yellow(),
            style(&document.vulnerability_class).red(),
            document.pattern_name
        );
        println!("    {} ({})", document.source_ref, document.severity);
        println!("    {}", preview(document.title.as_deref().unwrap_or(&document.text)));
    }
}

/// First line of `text`, shortened to fit a terminal row
fn preview(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    if line.chars().count() > PREVIEW_LENGTH {
        let cut: String = line.chars().take(PREVIEW_LENGTH - 1).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn preview_shortens_long_lines() {
        assert_eq!(preview("\n\n  first line \nsecond"), "first line");
        assert_eq!(preview(""), "");

        let long = "x".repeat(PREVIEW_LENGTH + 10);
        let shortened = preview(&long);
        assert_eq!(shortened.chars().count(), PREVIEW_LENGTH);
        assert!(shortened.ends_with('…'));
    }

    #[test]
    fn read_snippet_from_file() {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let path = temp_dir.path().join("snippet.js");
        std::fs::write(&path, "res.send(req.query.q)").expect("should write snippet");

        let snippet = read_snippet(path.to_str().expect("utf-8 path")).expect("should read");
        assert_eq!(snippet, "res.send(req.query.q)");

        std::fs::write(&path, "  \n").expect("should write snippet");
        assert!(read_snippet(path.to_str().expect("utf-8 path")).is_err());
        assert!(read_snippet("/nonexistent/snippet.js").is_err());
    }

    #[test]
    fn explicit_config_dir_wins() {
        let dir = PathBuf::from("/tmp/vuln-rag-test");
        assert_eq!(
            resolve_config_dir(Some(dir.clone())).expect("should resolve"),
            dir
        );
    }

    #[tokio::test]
    async fn collection_commands_on_empty_store() {
        let temp_dir = TempDir::new().expect("should create temp dir");

        list_collections(temp_dir.path())
            .await
            .expect("listing an empty store succeeds");
        assert!(remove_collection(temp_dir.path(), "absent").await.is_err());
    }
}
