// Named collections: a document store and its vector index persisted together
// as a single SQLite file under the collections directory


use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::StoreError;
use super::documents::{DocumentId, DocumentStore, Severity, VulnerabilityDocument};
use super::index::VectorIndex;
use crate::config::Config;

static MIGRATOR: Migrator = sqlx::migrate!("src/database/collection/migrations");

const COLLECTION_EXTENSION: &str = "db";
const MAX_NAME_LENGTH: usize = 128;

/// Whether `name` can be used as a collection name (and therefore a file name)
#[inline]
pub fn is_valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() <= MAX_NAME_LENGTH
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// A document store and the vector index built over it.
///
/// Every index entry resolves to exactly one document and vice versa; the
/// only way to grow a collection is [`Collection::add`], which updates both.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    name: String,
    embedding_model: String,
    created_at: DateTime<Utc>,
    documents: DocumentStore,
    index: VectorIndex,
}

impl Collection {
    #[inline]
    pub fn new(name: &str, embedding_model: &str) -> Result<Self, StoreError> {
        Self::with_index(name, embedding_model, VectorIndex::new())
    }

    /// Start a collection over a pre-configured (empty) index
    #[inline]
    pub fn with_index(
        name: &str,
        embedding_model: &str,
        index: VectorIndex,
    ) -> Result<Self, StoreError> {
        if !is_valid_collection_name(name) {
            return Err(StoreError::InvalidArgument(format!(
                "invalid collection name: {name:?}"
            )));
        }

        if !index.is_empty() {
            return Err(StoreError::InvalidArgument(
                "a new collection must start from an empty index".to_string(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            embedding_model: embedding_model.to_string(),
            created_at: Utc::now(),
            documents: DocumentStore::new(),
            index,
        })
    }

    /// Add a document together with its embedding. Nothing is written unless both succeed.
    #[inline]
    pub fn add(
        &mut self,
        document: VulnerabilityDocument,
        vector: Vec<f32>,
    ) -> Result<(), StoreError> {
        if self.documents.contains(document.id) {
            return Err(StoreError::DuplicateId(document.id));
        }

        self.index.insert(document.id, vector)?;
        self.documents.put(document)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.index.dimension()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[inline]
    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            name: self.name.clone(),
            embedding_model: self.embedding_model.clone(),
            dimension: self.dimension(),
            document_count: self.len(),
            created_at: self.created_at,
        }
    }

    /// Check that store and index have the same cardinality and every entry resolves
    #[inline]
    pub fn verify_integrity(&self) -> Result<(), StoreError> {
        if self.index.len() != self.documents.len() {
            return Err(StoreError::Corrupt(format!(
                "{} index entries for {} documents",
                self.index.len(),
                self.documents.len()
            )));
        }

        if let Some(orphan) = self
            .index
            .entries()
            .iter()
            .find(|entry| !self.documents.contains(entry.document_id))
        {
            return Err(StoreError::Corrupt(format!(
                "index entry refers to missing document {}",
                orphan.document_id
            )));
        }

        Ok(())
    }
}

/// Descriptive information about a persisted collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub name: String,
    pub embedding_model: String,
    pub dimension: Option<usize>,
    pub document_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct InfoRow {
    name: String,
    embedding_model: String,
    dimension: Option<i64>,
    document_count: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: i64,
    text: String,
    vulnerability_class: String,
    pattern_name: String,
    language: String,
    severity: Severity,
    source_ref: String,
    title: Option<String>,
}

#[derive(Debug, FromRow)]
struct VectorRow {
    document_id: i64,
    vector: Vec<u8>,
}

impl InfoRow {
    fn into_summary(self) -> Result<CollectionSummary, StoreError> {
        let dimension = self
            .dimension
            .map(|d| usize::try_from(d).map_err(|_| corrupt_value("dimension", d)))
            .transpose()?;
        let document_count = usize::try_from(self.document_count)
            .map_err(|_| corrupt_value("document_count", self.document_count))?;

        Ok(CollectionSummary {
            name: self.name,
            embedding_model: self.embedding_model,
            dimension,
            document_count,
            created_at: self.created_at,
        })
    }
}

impl TryFrom<DocumentRow> for VulnerabilityDocument {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: from_sql_id(row.id)?,
            text: row.text,
            vulnerability_class: row.vulnerability_class,
            pattern_name: row.pattern_name,
            language: row.language,
            severity: row.severity,
            source_ref: row.source_ref,
            title: row.title,
        })
    }
}

/// Reads and writes collections under a root directory, one `<name>.db` file each
#[derive(Debug, Clone)]
pub struct CollectionStore {
    root: PathBuf,
}

impl CollectionStore {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.collections_path())
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_collection_name(name) {
            return Err(StoreError::InvalidArgument(format!(
                "invalid collection name: {name:?}"
            )));
        }
        Ok(self.root.join(format!("{name}.{COLLECTION_EXTENSION}")))
    }

    #[inline]
    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_ok_and(|path| path.is_file())
    }

    /// Write `collection` to disk, replacing any previous collection of the same name.
    ///
    /// The bundle is written to a staging file and renamed into place only
    /// after the transaction commits, so readers see either the old or the
    /// new collection and a failed write leaves the old one untouched.
    #[inline]
    pub async fn persist(&self, collection: &Collection) -> Result<PathBuf, StoreError> {
        collection.verify_integrity()?;
        let final_path = self.path_for(collection.name())?;

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            StoreError::Database(format!(
                "Failed to create collections directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let staging_path = self.root.join(format!(
            ".{}.{}.staging",
            collection.name(),
            Uuid::new_v4()
        ));
        debug!(
            "Writing collection '{}' to staging file {}",
            collection.name(),
            staging_path.display()
        );

        if let Err(e) = write_bundle(&staging_path, collection).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging_path).await {
                warn!(
                    "Failed to remove staging file {}: {}",
                    staging_path.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tokio::fs::rename(&staging_path, &final_path)
            .await
            .map_err(|e| {
                StoreError::Database(format!(
                    "Failed to move collection into place at {}: {}",
                    final_path.display(),
                    e
                ))
            })?;

        info!(
            "Persisted collection '{}' ({} documents) to {}",
            collection.name(),
            collection.len(),
            final_path.display()
        );

        Ok(final_path)
    }

    /// Load a persisted collection for read-only serving
    #[inline]
    pub async fn load(&self, name: &str) -> Result<Collection, StoreError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(StoreError::IndexNotFound(name.to_string()));
        }

        debug!("Loading collection '{}' from {}", name, path.display());

        let pool = open_read_only(&path).await?;
        let result = read_bundle(&pool).await;
        pool.close().await;
        let collection = result?;

        if collection.name() != name {
            warn!(
                "Collection file {} records name '{}'",
                path.display(),
                collection.name()
            );
        }

        info!(
            "Loaded collection '{}' with {} documents",
            name,
            collection.len()
        );
        Ok(collection)
    }

    /// Summaries of every collection under the root, sorted by name
    #[inline]
    pub async fn list(&self) -> Result<Vec<CollectionSummary>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            StoreError::Database(format!(
                "Failed to read collections directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_collection = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(COLLECTION_EXTENSION));
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .filter(|stem| is_collection && is_valid_collection_name(stem));

            if let Some(stem) = stem {
                names.push(stem.to_string());
            }
        }

        names.sort();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            match self.read_summary(&name).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!("Skipping unreadable collection '{}': {}", name, e),
            }
        }

        Ok(summaries)
    }

    /// Delete a persisted collection
    #[inline]
    pub async fn remove(&self, name: &str) -> Result<(), StoreError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(StoreError::IndexNotFound(name.to_string()));
        }

        tokio::fs::remove_file(&path).await.map_err(|e| {
            StoreError::Database(format!(
                "Failed to remove collection {}: {}",
                path.display(),
                e
            ))
        })?;

        info!("Removed collection '{}'", name);
        Ok(())
    }

    async fn read_summary(&self, name: &str) -> Result<CollectionSummary, StoreError> {
        let path = self.path_for(name)?;
        let pool = open_read_only(&path).await?;
        let result = fetch_info(&pool).await;
        pool.close().await;
        let mut summary = result?.into_summary()?;
        summary.name = name.to_string();
        Ok(summary)
    }
}

async fn write_bundle(path: &Path, collection: &Collection) -> Result<(), StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let result = insert_rows(&pool, collection).await;
    pool.close().await;
    result
}

async fn insert_rows(pool: &SqlitePool, collection: &Collection) -> Result<(), StoreError> {
    MIGRATOR.run(pool).await?;

    let mut tx = pool.begin().await?;

    let dimension = collection
        .dimension()
        .map(|d| i64::try_from(d).map_err(|_| invalid_count("dimension", d)))
        .transpose()?;
    let document_count =
        i64::try_from(collection.len()).map_err(|_| invalid_count("documents", collection.len()))?;

    sqlx::query(
        "INSERT INTO collection_info (name, embedding_model, dimension, document_count, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(collection.name())
    .bind(collection.embedding_model())
    .bind(dimension)
    .bind(document_count)
    .bind(collection.created_at())
    .execute(&mut *tx)
    .await?;

    for document in collection.documents().all() {
        sqlx::query(
            "INSERT INTO documents (id, text, vulnerability_class, pattern_name, language, severity, source_ref, title) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(to_sql_id(document.id)?)
        .bind(document.text.as_str())
        .bind(document.vulnerability_class.as_str())
        .bind(document.pattern_name.as_str())
        .bind(document.language.as_str())
        .bind(document.severity)
        .bind(document.source_ref.as_str())
        .bind(document.title.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    for (position, entry) in collection.index().entries().iter().enumerate() {
        let position =
            i64::try_from(position).map_err(|_| invalid_count("position", position))?;
        sqlx::query("INSERT INTO vectors (position, document_id, vector) VALUES (?, ?, ?)")
            .bind(position)
            .bind(to_sql_id(entry.document_id)?)
            .bind(encode_vector(&entry.vector))
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    debug!(
        "Committed {} documents and {} vectors",
        collection.len(),
        collection.index().len()
    );
    Ok(())
}

async fn open_read_only(path: &Path) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .read_only(true);

    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?)
}

async fn fetch_info(pool: &SqlitePool) -> Result<InfoRow, StoreError> {
    sqlx::query_as::<_, InfoRow>(
        "SELECT name, embedding_model, dimension, document_count, created_at FROM collection_info LIMIT 1",
    )
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::Corrupt("missing collection_info row".to_string()))
}

async fn read_bundle(pool: &SqlitePool) -> Result<Collection, StoreError> {
    let summary = fetch_info(pool).await?.into_summary()?;

    let mut documents = DocumentStore::new();
    let mut rows = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, text, vulnerability_class, pattern_name, language, severity, source_ref, title \
         FROM documents ORDER BY id",
    )
    .fetch(pool);

    while let Some(row) = rows.try_next().await? {
        documents.put(VulnerabilityDocument::try_from(row)?)?;
    }
    drop(rows);

    let mut index = match summary.dimension {
        Some(dimension) => VectorIndex::with_dimension(dimension)
            .map_err(|e| StoreError::Corrupt(format!("bad recorded dimension: {e}")))?,
        None => VectorIndex::new(),
    };

    let mut rows = sqlx::query_as::<_, VectorRow>(
        "SELECT document_id, vector FROM vectors ORDER BY position",
    )
    .fetch(pool);

    while let Some(row) = rows.try_next().await? {
        let document_id = from_sql_id(row.document_id)?;
        let vector = decode_vector(&row.vector)?;
        index
            .insert(document_id, vector)
            .map_err(|e| StoreError::Corrupt(format!("vector for document {document_id}: {e}")))?;
    }
    drop(rows);

    if documents.len() != summary.document_count {
        return Err(StoreError::Corrupt(format!(
            "expected {} documents, found {}",
            summary.document_count,
            documents.len()
        )));
    }

    let collection = Collection {
        name: summary.name,
        embedding_model: summary.embedding_model,
        created_at: summary.created_at,
        documents,
        index,
    };
    collection.verify_integrity()?;
    Ok(collection)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, StoreError> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Corrupt(format!(
            "vector blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn to_sql_id(id: DocumentId) -> Result<i64, StoreError> {
    i64::try_from(id)
        .map_err(|_| StoreError::InvalidArgument(format!("document id {id} does not fit in SQLite")))
}

fn from_sql_id(id: i64) -> Result<DocumentId, StoreError> {
    DocumentId::try_from(id).map_err(|_| corrupt_value("document id", id))
}

fn corrupt_value(field: &str, value: i64) -> StoreError {
    StoreError::Corrupt(format!("negative {field}: {value}"))
}

fn invalid_count(field: &str, value: usize) -> StoreError {
    StoreError::InvalidArgument(format!("{field} {value} does not fit in SQLite"))
}
