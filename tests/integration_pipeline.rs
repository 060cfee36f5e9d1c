#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingestion and retrieval against a temporary collections directory

mod common;

use common::{DIMENSION, HashingEmbedder, PATTERNS, write_corpus};
use std::fs;
use tempfile::TempDir;
use vuln_rag::VulnError;
use vuln_rag::config::CorpusConfig;
use vuln_rag::database::{CollectionStore, StoreError};
use vuln_rag::indexer::{IngestError, IngestionPipeline};
use vuln_rag::retriever::Retriever;

const COLLECTION: &str = "web-vulnerabilities";

struct TestEnv {
    corpus: TempDir,
    store_dir: TempDir,
}

impl TestEnv {
    fn new(files: &[(&str, &str)]) -> Self {
        let corpus = TempDir::new().expect("should create corpus dir");
        write_corpus(corpus.path(), files);
        Self {
            corpus,
            store_dir: TempDir::new().expect("should create store dir"),
        }
    }

    fn store(&self) -> CollectionStore {
        CollectionStore::new(self.store_dir.path())
    }

    fn pipeline(&self) -> IngestionPipeline<HashingEmbedder> {
        IngestionPipeline::new(HashingEmbedder, self.store(), CorpusConfig::default())
            .with_batch_size(4)
            .with_dimension(DIMENSION)
    }

    async fn ingest(&self) {
        self.pipeline()
            .run(self.corpus.path(), COLLECTION)
            .await
            .expect("should ingest corpus");
    }

    async fn retriever(&self) -> Retriever<HashingEmbedder> {
        Retriever::open(&self.store(), COLLECTION, HashingEmbedder)
            .await
            .expect("should open collection")
    }
}

#[tokio::test]
async fn ingested_text_round_trips() {
    let env = TestEnv::new(&PATTERNS);
    env.ingest().await;

    let collection = env
        .store()
        .load(COLLECTION)
        .await
        .expect("should load collection");
    assert_eq!(collection.len(), PATTERNS.len());
    assert_eq!(collection.dimension(), Some(DIMENSION));
    assert_eq!(collection.embedding_model(), "hashing-test");

    for document in collection.documents().all() {
        let (_, text) = PATTERNS
            .iter()
            .find(|(path, _)| *path == document.source_ref)
            .expect("every document comes from the corpus");
        assert_eq!(document.text, *text);
        assert_eq!(
            collection
                .documents()
                .get(document.id)
                .expect("should resolve id")
                .text,
            *text
        );
    }
}

#[tokio::test]
async fn document_text_retrieves_itself_first() {
    let env = TestEnv::new(&PATTERNS);
    env.ingest().await;
    let retriever = env.retriever().await;

    for (source_ref, text) in PATTERNS {
        let result = retriever.retrieve(text, 3).expect("should retrieve");
        let top = &result.hits[0];

        assert_eq!(top.document.source_ref, source_ref);
        assert!((top.score - 1.0).abs() < 1e-5, "self-similarity is {}", top.score);
        assert!(result.iter().all(|hit| hit.score <= top.score));
    }
}

#[tokio::test]
async fn top_k_results_resolve() {
    let env = TestEnv::new(&PATTERNS);
    env.ingest().await;
    let retriever = env.retriever().await;

    let snippet = "app.get('/search', (req, res) => db.query(`SELECT * FROM t WHERE a='${req.query.a}'`))";
    let result = retriever.retrieve(snippet, 3).expect("should retrieve");

    assert_eq!(result.len(), 3);
    for hit in &result {
        let stored = retriever
            .collection()
            .documents()
            .get(hit.document.id)
            .expect("hit resolves to a stored document");
        assert_eq!(stored, &hit.document);
    }

    let scores: Vec<f32> = result.iter().map(|hit| hit.score).collect();
    assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn k_larger_than_collection() {
    let env = TestEnv::new(&PATTERNS[..5]);
    env.ingest().await;
    let retriever = env.retriever().await;

    let result = retriever
        .retrieve("res.send(req.query.q)", 100)
        .expect("should retrieve");
    assert_eq!(result.len(), 5);
}

#[tokio::test]
async fn empty_corpus_yields_no_grounding() {
    let env = TestEnv::new(&[]);
    env.ingest().await;
    let retriever = env.retriever().await;

    let result = retriever
        .retrieve("res.send(req.query.q)", 3)
        .expect("empty collection is not an error");
    assert!(result.is_empty());
}

#[tokio::test]
async fn zero_k_is_rejected() {
    let env = TestEnv::new(&PATTERNS[..2]);
    env.ingest().await;
    let retriever = env.retriever().await;

    assert!(matches!(
        retriever.retrieve("anything", 0),
        Err(VulnError::Store(StoreError::InvalidArgument(_)))
    ));
}

#[tokio::test]
async fn failed_ingestion_keeps_previous_collection() {
    let env = TestEnv::new(&PATTERNS);
    env.ingest().await;
    let before = env
        .store()
        .load(COLLECTION)
        .await
        .expect("should load collection");

    // A new document plus one that cannot be read as text
    write_corpus(env.corpus.path(), &[("xss/dom_write.md", "document.write(name)")]);
    fs::write(
        env.corpus.path().join("xss/corrupted.md"),
        [0xc3, 0x28, 0xa0, 0xa1],
    )
    .expect("should write corrupted file");

    let result = env.pipeline().run(env.corpus.path(), COLLECTION).await;
    assert!(matches!(result, Err(IngestError::CorpusRead { .. })));

    let after = env
        .store()
        .load(COLLECTION)
        .await
        .expect("previous collection is still loadable");
    assert_eq!(after, before);

    let retriever = env.retriever().await;
    let result = retriever
        .retrieve("document.write(name)", 1)
        .expect("should retrieve");
    assert_ne!(result.hits[0].document.source_ref, "xss/dom_write.md");
}

#[tokio::test]
async fn reingestion_replaces_collection() {
    let env = TestEnv::new(&PATTERNS[..3]);
    env.ingest().await;

    write_corpus(env.corpus.path(), &PATTERNS[3..6]);
    env.ingest().await;

    let collection = env
        .store()
        .load(COLLECTION)
        .await
        .expect("should load collection");
    assert_eq!(collection.len(), 6);

    let ids: Vec<u64> = collection.documents().all().map(|d| d.id).collect();
    assert_eq!(ids, (0..6).collect::<Vec<u64>>());
}

#[tokio::test]
async fn collections_coexist() {
    let env = TestEnv::new(&PATTERNS[..4]);
    let pipeline = env.pipeline();
    pipeline
        .run(env.corpus.path(), "sql-only")
        .await
        .expect("should ingest corpus");

    write_corpus(env.corpus.path(), &PATTERNS[4..]);
    pipeline
        .run(env.corpus.path(), "everything")
        .await
        .expect("should ingest corpus");

    let summaries = env.store().list().await.expect("should list collections");
    let names: Vec<(&str, usize)> = summaries
        .iter()
        .map(|s| (s.name.as_str(), s.document_count))
        .collect();
    assert_eq!(names, vec![("everything", 10), ("sql-only", 4)]);
}

#[tokio::test]
async fn concurrent_readers_share_a_collection() {
    let env = TestEnv::new(&PATTERNS);
    env.ingest().await;
    let retriever = env.retriever().await;

    std::thread::scope(|scope| {
        let handles: Vec<_> = PATTERNS
            .iter()
            .map(|(source_ref, text)| {
                let retriever = &retriever;
                scope.spawn(move || {
                    let result = retriever.retrieve(text, 1).expect("should retrieve");
                    assert_eq!(result.hits[0].document.source_ref, *source_ref);
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("reader thread should not panic");
        }
    });
}
