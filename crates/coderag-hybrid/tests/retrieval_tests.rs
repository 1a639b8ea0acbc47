use std::sync::Arc;

use parking_lot::Mutex;

use coderag_core::{Chunk, DenseIndex, Document, Embedder, Error, RelevanceScorer, Result, RetrievalSettings, VectorStore};
use coderag_embed::FakeEmbedder;
use coderag_hybrid::{ModelCache, ModelLoader, QueryStage, Reranker, Retriever};
use coderag_vector::{table::open_db, LanceStore, MemoryVectorStore, MmrParams};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new(
            "src/auth.py",
            "import hashlib\n\ndef reset_password(user, token):\n    verify(token)\n    user.password = hashlib.sha256(token).hexdigest()\n",
        )
        .with_repository("backend"),
        Document::new("src/billing.py", "def charge_card(card, amount):\n    gateway.charge(card, amount)\n")
            .with_repository("backend"),
        Document::new("web/login.ts", "export function login(user: string, password: string) {\n  return api.post('/login')\n}\n")
            .with_repository("frontend"),
        Document::new("README.md", "# Accounts\n\nPassword resets send a one-time token by email.\n"),
    ]
}

/// Scores documents by how many query words they contain.
struct OverlapScorer;

impl RelevanceScorer for OverlapScorer {
    fn model_id(&self) -> &str {
        "overlap"
    }

    fn score(&self, query: &str, documents: &[&str]) -> anyhow::Result<Vec<f32>> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        Ok(documents
            .iter()
            .map(|d| {
                let d = d.to_lowercase();
                words.iter().filter(|w| d.contains(w.as_str())).count() as f32
            })
            .collect())
    }
}

fn working_reranker(top_n: usize) -> Reranker {
    let loader: ModelLoader =
        Arc::new(|_: &str| -> anyhow::Result<Arc<dyn RelevanceScorer>> { Ok(Arc::new(OverlapScorer)) });
    Reranker::new("overlap", top_n, Arc::new(ModelCache::new()), loader)
}

fn missing_reranker(top_n: usize) -> Reranker {
    let loader: ModelLoader = Arc::new(|id: &str| -> anyhow::Result<Arc<dyn RelevanceScorer>> {
        Err(anyhow::anyhow!("no local weights for {id}"))
    });
    Reranker::new("missing/model", top_n, Arc::new(ModelCache::new()), loader)
}

fn memory_retriever(reranker: Reranker) -> Retriever<MemoryVectorStore> {
    let store = MemoryVectorStore::new(Arc::new(FakeEmbedder::new(256)), MmrParams::default());
    Retriever::new(store, RetrievalSettings::default()).expect("settings").with_reranker(reranker)
}

#[tokio::test]
async fn never_built_snapshot_is_not_found() {
    init_tracing();
    let retriever = memory_retriever(missing_reranker(4));
    let err = retriever.retrieve("x", "demo").await.err().expect("must fail");
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn retrieves_and_reranks() {
    init_tracing();
    let retriever = memory_retriever(working_reranker(3));
    let report = retriever.ingest("main", &corpus()).await.expect("ingest");
    assert_eq!(report.documents, 4);
    assert!(report.skipped.is_empty());
    assert_eq!(retriever.registry().names(), vec!["main".to_string()]);

    let outcome = retriever.retrieve("reset_password token", "main").await.expect("retrieve");
    assert!(outcome.reranked);
    assert_eq!(
        outcome.trace,
        vec![
            QueryStage::Received,
            QueryStage::DenseSearched,
            QueryStage::SparseSearched,
            QueryStage::Fused,
            QueryStage::Reranked,
            QueryStage::Returned,
        ]
    );
    assert!(!outcome.results.is_empty() && outcome.results.len() <= 3);
    assert_eq!(outcome.results[0].chunk.source_path, "src/auth.py");
    assert!(outcome.results.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(outcome.results.iter().all(|r| r.fused_score > 0.0));
    assert_eq!(outcome.sources()[0], "backend/src/auth.py");
}

#[tokio::test]
async fn missing_reranker_keeps_fused_order() {
    init_tracing();
    let retriever = memory_retriever(missing_reranker(2));
    retriever.ingest("main", &corpus()).await.expect("ingest");

    let outcome = retriever.retrieve("charge_card amount", "main").await.expect("retrieve");
    assert!(!outcome.reranked);
    assert_eq!(outcome.trace[4], QueryStage::RerankSkipped);
    assert_eq!(outcome.results.len(), 2);
    for r in &outcome.results {
        assert_eq!(r.score, r.fused_score);
    }
    assert!(outcome.results[0].score >= outcome.results[1].score);
    assert!(outcome.results[0].provenance.dense_rank.is_some() || outcome.results[0].provenance.sparse_rank.is_some());
}

#[tokio::test]
async fn malformed_documents_are_reported_not_fatal() {
    let retriever = memory_retriever(missing_reranker(4));
    let mut docs = corpus();
    docs.push(Document::new("empty.py", "   \n\t"));
    let report = retriever.ingest("main", &docs).await.expect("ingest");
    assert_eq!(report.documents, 4);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].source_path, "empty.py");
    assert!(matches!(report.skipped[0].error, Error::MalformedDocument { .. }));
}

#[tokio::test]
async fn empty_ingest_retires_the_snapshot() {
    let retriever = memory_retriever(missing_reranker(4));
    retriever.ingest("main", &corpus()).await.expect("ingest");
    assert!(retriever.retrieve("login", "main").await.is_ok());

    let report = retriever.ingest("main", &[]).await.expect("empty ingest");
    assert_eq!(report.chunks, 0);
    assert!(retriever.registry().is_empty());
    assert!(retriever.retrieve("login", "main").await.err().expect("must fail").is_not_found());
}

#[tokio::test]
async fn rebuilding_replaces_the_published_snapshot() {
    let retriever = memory_retriever(missing_reranker(4));
    retriever.ingest("main", &corpus()).await.expect("ingest");
    let first = retriever.session("main").await.expect("session");

    let docs = vec![Document::new("src/only.rs", "fn only() -> u32 { 42 }\n")];
    retriever.ingest("main", &docs).await.expect("rebuild");
    let second = retriever.session("main").await.expect("session");
    assert_eq!(second.chunk_count, 1);
    assert!(first.chunk_count > 1);

    let outcome = retriever.retrieve("only", "main").await.expect("retrieve");
    assert!(outcome.results.iter().all(|r| r.chunk.source_path == "src/only.rs"));
}

/// Dense side that never finds anything, to drive the empty-fusion path.
struct BlindStore {
    chunks: Mutex<Vec<Chunk>>,
}

struct BlindIndex;

impl DenseIndex for BlindIndex {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Chunk>> {
        Ok(Vec::new())
    }
}

impl VectorStore for BlindStore {
    type Index = BlindIndex;

    async fn write_snapshot(&self, _snapshot: &str, chunks: &[Chunk]) -> Result<usize> {
        *self.chunks.lock() = chunks.to_vec();
        Ok(chunks.len())
    }

    async fn open(&self, _snapshot: &str) -> Result<BlindIndex> {
        Ok(BlindIndex)
    }

    async fn load_chunks(&self, _snapshot: &str) -> Result<Vec<Chunk>> {
        Ok(self.chunks.lock().clone())
    }

    async fn drop_snapshot(&self, _snapshot: &str) -> Result<()> {
        self.chunks.lock().clear();
        Ok(())
    }
}

#[tokio::test]
async fn no_signal_hits_is_no_matches() {
    let store = BlindStore { chunks: Mutex::new(Vec::new()) };
    let retriever = Retriever::new(store, RetrievalSettings::default()).expect("settings").with_reranker(missing_reranker(4));
    retriever.ingest("main", &corpus()).await.expect("ingest");

    let err = retriever.retrieve("zzzqqq", "main").await.err().expect("must fail");
    assert!(matches!(err, Error::NoMatches(_)), "{err}");

    let outcome = retriever.retrieve("charge_card", "main").await.expect("sparse still answers");
    assert!(outcome.results.iter().all(|r| r.provenance.dense_rank.is_none()));
}

async fn lance_store(uri: &str) -> LanceStore {
    let db = open_db(uri).await.expect("db");
    LanceStore::new(db, Arc::new(FakeEmbedder::new(256)), MmrParams::default())
}

#[tokio::test]
async fn lance_snapshot_survives_a_new_retriever() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let uri = tmp.path().to_string_lossy().to_string();

    let writer = Retriever::new(lance_store(&uri).await, RetrievalSettings::default())
        .expect("settings")
        .with_reranker(missing_reranker(4));
    let report = writer.ingest("backend", &corpus()).await.expect("ingest");

    let reader = Retriever::new(lance_store(&uri).await, RetrievalSettings::default())
        .expect("settings")
        .with_reranker(working_reranker(4));
    assert!(reader.registry().is_empty());
    let outcome = reader.retrieve("reset_password token", "backend").await.expect("retrieve");
    assert!(outcome.reranked);
    assert_eq!(outcome.results[0].chunk.source_path, "src/auth.py");
    assert_eq!(reader.session("backend").await.expect("session").chunk_count, report.chunks);

    reader.drop_snapshot("backend").await.expect("drop");
    assert!(reader.retrieve("token", "backend").await.err().expect("must fail").is_not_found());
}

/// Fails any embedding batch that carries text mentioning `unembeddable`.
struct FlakyEmbedder(FakeEmbedder);

impl Embedder for FlakyEmbedder {
    fn dim(&self) -> usize {
        self.0.dim()
    }
    fn max_len(&self) -> usize {
        self.0.max_len()
    }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("unembeddable")) {
            anyhow::bail!("transient embed failure");
        }
        self.0.embed_batch(texts)
    }
}

async fn flaky_store(uri: &str) -> LanceStore {
    let db = open_db(uri).await.expect("db");
    LanceStore::new(db, Arc::new(FlakyEmbedder(FakeEmbedder::new(256))), MmrParams::default())
}

#[tokio::test]
async fn failed_lance_rebuild_never_serves_a_partial_snapshot() {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let uri = tmp.path().to_string_lossy().to_string();

    let first = Retriever::new(flaky_store(&uri).await, RetrievalSettings::default())
        .expect("settings")
        .with_reranker(missing_reranker(4));
    let old: Vec<Document> = (0..3).map(|i| Document::new(format!("old{i}.py"), format!("def old_{i}():\n    return {i}\n"))).collect();
    first.ingest("main", &old).await.expect("ingest");

    // The failing chunk sits in the second embedding batch.
    let mut new: Vec<Document> =
        (0..100).map(|i| Document::new(format!("new{i}.py"), format!("def new_{i}():\n    return {i}\n"))).collect();
    new[80] = Document::new("new80.py", "unembeddable = True\n");
    let err = first.ingest("main", &new).await.err().expect("rebuild must fail");
    assert!(err.to_string().contains("transient embed failure"), "{err}");

    let fresh = Retriever::new(flaky_store(&uri).await, RetrievalSettings::default())
        .expect("settings")
        .with_reranker(missing_reranker(4));
    let snapshot = fresh.session("main").await.expect("previous snapshot still served");
    assert_eq!(snapshot.chunk_count, 3);
    let chunks = fresh.store().load_chunks("main").await.expect("load");
    assert!(chunks.iter().all(|c| c.source_path.starts_with("old")));

    let outcome = fresh.retrieve("old_1", "main").await.expect("retrieve");
    assert!(outcome.results.iter().all(|r| r.chunk.source_path.starts_with("old")));
}
