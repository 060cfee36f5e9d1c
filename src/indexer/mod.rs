// Indexer module
// Turns a corpus of labeled pattern files into a persisted collection

pub mod corpus;


use indicatif::ProgressBar;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, CorpusConfig};
use crate::database::{
    Collection, CollectionStore, DocumentId, StoreError, VectorIndex, VulnerabilityDocument,
};
use crate::embeddings::Embedder;

pub use corpus::{
    ClassMapper, CorpusScan, PatternFile, extract_title, is_valid_class_label, scan_corpus,
};

const DEFAULT_BATCH_SIZE: usize = 16;

/// Failures that abort an ingestion run. Nothing is persisted when one occurs.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to read corpus entry {}: {source}", path.display())]
    CorpusRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid category directory {directory:?}: {reason}")]
    InvalidCategory { directory: String, reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a successful ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: String,
    pub documents: usize,
    pub categories: usize,
    pub skipped: usize,
    pub dimension: Option<usize>,
    pub path: PathBuf,
}

/// Builds a collection from a corpus directory and persists it once complete
pub struct IngestionPipeline<E: Embedder> {
    embedder: E,
    store: CollectionStore,
    corpus: CorpusConfig,
    batch_size: usize,
    dimension: Option<usize>,
    progress: ProgressBar,
}

impl<E: Embedder> IngestionPipeline<E> {
    #[inline]
    pub fn new(embedder: E, store: CollectionStore, corpus: CorpusConfig) -> Self {
        Self {
            embedder,
            store,
            corpus,
            batch_size: DEFAULT_BATCH_SIZE,
            dimension: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Pipeline using the corpus settings, batch size and expected dimension from `config`
    #[inline]
    pub fn from_config(embedder: E, config: &Config) -> Self {
        Self::new(
            embedder,
            CollectionStore::from_config(config),
            config.corpus.clone(),
        )
        .with_batch_size(config.ollama.batch_size as usize)
        .with_dimension(config.ollama.embedding_dimension as usize)
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Fix the index dimension up front instead of taking it from the first vector
    #[inline]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    #[inline]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[inline]
    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// Read, embed and index the whole corpus in memory.
    ///
    /// Ids are assigned sequentially from 0 in traversal order.
    #[inline]
    pub fn build(
        &self,
        root: &Path,
        name: &str,
    ) -> Result<(Collection, CorpusScan), IngestError> {
        let index = match self.dimension {
            Some(dimension) => VectorIndex::with_dimension(dimension)?,
            None => VectorIndex::new(),
        };
        let mut collection = Collection::with_index(name, self.embedder.model_name(), index)?;

        info!("Scanning corpus at {}", root.display());
        let mut scan = scan_corpus(root, &self.corpus)?;
        let files = std::mem::take(&mut scan.files);
        info!(
            "Found {} pattern documents in {} categories",
            files.len(),
            scan.categories
        );

        self.progress.set_length(files.len() as u64);
        self.progress.set_message(format!("Embedding {name}"));

        let mut next_id: DocumentId = 0;
        for batch in files.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|file| file.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| IngestError::Embedding(format!("{e:#}")))?;

            if vectors.len() != batch.len() {
                return Err(IngestError::Embedding(format!(
                    "embedder returned {} vectors for {} documents",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (file, vector) in batch.iter().zip(vectors) {
                let document = self.document_for(next_id, file);
                debug!(
                    "Indexing document {} ({}/{})",
                    next_id, document.vulnerability_class, document.pattern_name
                );
                collection.add(document, vector)?;
                next_id += 1;
            }

            self.progress.inc(batch.len() as u64);
        }

        Ok((collection, scan))
    }

    /// Ingest `root` into the collection `name`, replacing any previous build.
    ///
    /// The collection is written exactly once, after every document has been
    /// embedded, so a failed run leaves the existing collection in place.
    #[inline]
    pub async fn run(&self, root: &Path, name: &str) -> Result<IngestReport, IngestError> {
        let (collection, scan) = match self.build(root, name) {
            Ok(built) => built,
            Err(e) => {
                self.progress
                    .abandon_with_message(format!("Ingestion of {name} failed"));
                return Err(e);
            }
        };

        if collection.is_empty() {
            warn!(
                "Corpus {} produced no documents; persisting empty collection '{}'",
                root.display(),
                name
            );
        }

        self.progress.set_message(format!("Persisting {name}"));
        let path = self.store.persist(&collection).await?;
        self.progress.finish_with_message(format!("Indexed {name}"));

        let report = IngestReport {
            collection: name.to_string(),
            documents: collection.len(),
            categories: scan.categories,
            skipped: scan.skipped.len(),
            dimension: collection.dimension(),
            path,
        };

        info!(
            "Ingested {} documents from {} categories into '{}' ({} entries skipped)",
            report.documents, report.categories, report.collection, report.skipped
        );

        Ok(report)
    }

    fn document_for(&self, id: DocumentId, file: &PatternFile) -> VulnerabilityDocument {
        VulnerabilityDocument {
            id,
            text: file.text.clone(),
            vulnerability_class: file.vulnerability_class.clone(),
            pattern_name: file.pattern_name.clone(),
            language: self.corpus.language.clone(),
            severity: self.corpus.severity,
            source_ref: file.source_ref.clone(),
            title: file.title.clone(),
        }
    }
}
