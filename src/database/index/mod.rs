#[cfg(test)]
mod tests;

use std::collections::HashSet;
use tracing::debug;

use super::StoreError;
use super::documents::DocumentId;

/// One stored embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub document_id: DocumentId,
    pub vector: Vec<f32>,
    norm: f64,
}

impl IndexEntry {
    fn new(document_id: DocumentId, vector: Vec<f32>) -> Self {
        let norm = l2_norm(&vector);
        Self {
            document_id,
            vector,
            norm,
        }
    }
}

/// Search hit: a document id and its cosine similarity to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub document_id: DocumentId,
    pub score: f32,
}

/// Exact nearest-neighbour index over fixed-dimension embeddings.
///
/// Similarity is cosine similarity in `[-1, 1]`, higher is closer. A
/// zero-length vector scores `0.0` against everything. Equal scores keep
/// insertion order, so results are deterministic for a given build.
///
/// Search is a linear scan over every entry, which is fine for corpora of
/// up to a few thousand documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
    ids: HashSet<DocumentId>,
}

impl VectorIndex {
    /// Create an index whose dimension is fixed by the first insert
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index with an explicitly configured dimension
    #[inline]
    pub fn with_dimension(dimension: usize) -> Result<Self, StoreError> {
        if dimension == 0 {
            return Err(StoreError::InvalidArgument(
                "vector dimension must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            dimension: Some(dimension),
            ..Self::default()
        })
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Add an embedding for `document_id`.
    ///
    /// Every check runs before anything is written, so a failed insert
    /// leaves the index exactly as it was.
    #[inline]
    pub fn insert(&mut self, document_id: DocumentId, vector: Vec<f32>) -> Result<(), StoreError> {
        if vector.is_empty() {
            return Err(StoreError::InvalidArgument(
                "cannot index an empty vector".to_string(),
            ));
        }

        match self.dimension {
            Some(expected) if vector.len() != expected => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            _ => {}
        }

        if vector.iter().any(|component| !component.is_finite()) {
            return Err(StoreError::InvalidArgument(format!(
                "vector for document {document_id} contains non-finite values"
            )));
        }

        if self.ids.contains(&document_id) {
            return Err(StoreError::DuplicateId(document_id));
        }

        self.dimension.get_or_insert(vector.len());
        self.ids.insert(document_id);
        self.entries.push(IndexEntry::new(document_id, vector));
        Ok(())
    }

    /// Return up to `k` entries ranked by descending cosine similarity
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidArgument(
                "k must be a positive integer".to_string(),
            ));
        }

        let Some(expected) = self.dimension.filter(|_| !self.entries.is_empty()) else {
            return Err(StoreError::EmptyIndex);
        };

        if query.len() != expected {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        if query.iter().any(|component| !component.is_finite()) {
            return Err(StoreError::InvalidArgument(
                "query vector contains non-finite values".to_string(),
            ));
        }

        let query_norm = l2_norm(query);

        let mut scored: Vec<ScoredId> = self
            .entries
            .iter()
            .map(|entry| ScoredId {
                document_id: entry.document_id,
                score: cosine(query, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        debug!(
            "Scanned {} vectors, returning {} hits",
            self.entries.len(),
            scored.len()
        );

        Ok(scored)
    }
}

// Sums are accumulated in f64 so large finite components cannot overflow
fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

fn cosine(a: &[f32], a_norm: f64, b: &[f32], b_norm: f64) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let score = (dot / (a_norm * b_norm)).clamp(-1.0, 1.0) as f32;
    // -0.0 sorts below 0.0 under total_cmp, so fold it for stable ties
    if score == 0.0 { 0.0 } else { score }
}
