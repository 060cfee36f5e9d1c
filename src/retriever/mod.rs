// Retriever module
// Query text in, ranked reference documents out


use tracing::{debug, info};

use crate::database::{Collection, CollectionStore, StoreError, VulnerabilityDocument};
use crate::embeddings::Embedder;
use crate::{Result, VulnError};

/// A reference document and its cosine similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub document: VulnerabilityDocument,
    pub score: f32,
}

/// Hits ordered by descending score. Empty when nothing has been indexed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub hits: Vec<RetrievedDocument>,
}

impl QueryResult {
    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, RetrievedDocument> {
        self.hits.iter()
    }

    #[inline]
    pub fn documents(&self) -> impl Iterator<Item = &VulnerabilityDocument> {
        self.hits.iter().map(|hit| &hit.document)
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a RetrievedDocument;
    type IntoIter = std::slice::Iter<'a, RetrievedDocument>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// Serves similarity queries against one immutable collection
pub struct Retriever<E: Embedder> {
    collection: Collection,
    embedder: E,
}

impl<E: Embedder> Retriever<E> {
    #[inline]
    pub fn new(collection: Collection, embedder: E) -> Self {
        if collection.embedding_model() != embedder.model_name() {
            debug!(
                "Collection '{}' was built with '{}', querying with '{}'",
                collection.name(),
                collection.embedding_model(),
                embedder.model_name()
            );
        }

        Self {
            collection,
            embedder,
        }
    }

    /// Load a persisted collection by name and serve queries from it
    #[inline]
    pub async fn open(store: &CollectionStore, name: &str, embedder: E) -> Result<Self> {
        let collection = store.load(name).await?;
        info!(
            "Retriever ready on '{}' ({} documents)",
            collection.name(),
            collection.len()
        );
        Ok(Self::new(collection, embedder))
    }

    #[inline]
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Return up to `k` documents most similar to `query`.
    ///
    /// An empty collection yields an empty result rather than an error.
    #[inline]
    pub fn retrieve(&self, query: &str, k: usize) -> Result<QueryResult> {
        if k == 0 {
            return Err(
                StoreError::InvalidArgument("k must be a positive integer".to_string()).into(),
            );
        }

        if self.collection.index().is_empty() {
            debug!(
                "Collection '{}' is empty, no references available",
                self.collection.name()
            );
            return Ok(QueryResult::default());
        }

        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| VulnError::Embedding(format!("{e:#}")))?;

        let scored = match self.collection.index().search(&vector, k) {
            Ok(scored) => scored,
            Err(StoreError::EmptyIndex) => return Ok(QueryResult::default()),
            Err(e) => return Err(e.into()),
        };

        let hits = scored
            .into_iter()
            .map(|hit| {
                let document = self.collection.documents().get(hit.document_id)?;
                Ok(RetrievedDocument {
                    document: document.clone(),
                    score: hit.score,
                })
            })
            .collect::<std::result::Result<Vec<_>, StoreError>>()?;

        debug!(
            "Retrieved {} of {} requested references from '{}'",
            hits.len(),
            k,
            self.collection.name()
        );

        Ok(QueryResult { hits })
    }
}
