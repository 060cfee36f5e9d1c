
use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use super::StoreError;

/// Identifier assigned sequentially at ingestion time
pub type DocumentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A labeled vulnerability pattern, immutable once stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VulnerabilityDocument {
    pub id: DocumentId,
    /// Full pattern description, prose and code example
    pub text: String,
    /// Category label such as `SQL_INJECTION`, taken from the corpus directory
    pub vulnerability_class: String,
    /// Fine-grained label taken from the pattern file name
    pub pattern_name: String,
    pub language: String,
    pub severity: Severity,
    /// Path of the source file relative to the corpus root
    pub source_ref: String,
    /// First heading of the document, when it has one
    pub title: Option<String>,
}

/// Keyed document storage backing a collection.
///
/// The store lives in memory; durability comes from persisting the owning
/// [`Collection`](super::Collection) as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStore {
    documents: BTreeMap<DocumentId, VulnerabilityDocument>,
}

impl DocumentStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new document, refusing to replace an existing id
    #[inline]
    pub fn put(&mut self, document: VulnerabilityDocument) -> Result<(), StoreError> {
        match self.documents.entry(document.id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateId(document.id)),
            Entry::Vacant(slot) => {
                slot.insert(document);
                Ok(())
            }
        }
    }

    #[inline]
    pub fn get(&self, id: DocumentId) -> Result<&VulnerabilityDocument, StoreError> {
        self.documents.get(&id).ok_or(StoreError::NotFound(id))
    }

    /// Iterate over every stored document. Each call starts a fresh pass.
    #[inline]
    pub fn all(&self) -> impl Iterator<Item = &VulnerabilityDocument> + Clone {
        self.documents.values()
    }

    #[inline]
    pub fn contains(&self, id: DocumentId) -> bool {
        self.documents.contains_key(&id)
    }

    /// Next id in the monotonic sequence
    #[inline]
    pub fn next_id(&self) -> DocumentId {
        self.documents
            .last_key_value()
            .map_or(0, |(id, _)| id.saturating_add(1))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
