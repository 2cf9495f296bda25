//! End-to-end scenarios through the library API, using the offline hash
//! embedder and stub generators.

use std::sync::Arc;

use async_trait::async_trait;
use complaint_rag::answer::RagOrchestrator;
use complaint_rag::chunk::Chunker;
use complaint_rag::embedding::{embed_query, Embedder, HashEmbedder};
use complaint_rag::error::{RagError, Result};
use complaint_rag::generation::{EchoGenerator, Generator};
use complaint_rag::ingest::IndexingPipeline;
use complaint_rag::models::ComplaintRecord;
use complaint_rag::progress::NoProgress;
use complaint_rag::retrieve::Retriever;
use complaint_rag::store::VectorStore;
use tempfile::TempDir;

fn record(id: &str, product: &str, narrative: &str) -> ComplaintRecord {
    ComplaintRecord {
        id: id.to_string(),
        product: product.to_string(),
        narrative: narrative.to_string(),
    }
}

fn two_complaints() -> Vec<ComplaintRecord> {
    vec![
        record("1", "Credit card", "my credit card was charged twice"),
        record("2", "Personal loan", "loan officer never called back"),
    ]
}

fn pipeline(embedder: Arc<dyn Embedder>) -> IndexingPipeline {
    IndexingPipeline::new(Chunker::new(512, 50).unwrap(), embedder)
}

#[tokio::test]
async fn two_records_query_returns_matching_complaint() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let store = VectorStore::in_memory();
    let collection = store
        .create_collection("complaints", embedder.model_info(), false)
        .await
        .unwrap();

    let stats = pipeline(Arc::clone(&embedder))
        .index_records(&collection, &two_complaints(), &NoProgress)
        .await;
    assert_eq!(stats.chunks, 2, "each narrative fits in one chunk");
    assert_eq!(stats.inserted, 2);

    let retriever = Retriever::open(&store, "complaints", Arc::clone(&embedder))
        .await
        .unwrap();
    let top = retriever.retrieve("double charge on card", 1).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].metadata.complaint_id, "1");
    assert_eq!(top[0].metadata.product, "Credit card");

    // The loan chunk would have scored lower
    let both = retriever.retrieve("double charge on card", 5).await.unwrap();
    assert_eq!(both.len(), 2);
    assert!(both[0].similarity > both[1].similarity);
    assert_eq!(both[1].metadata.complaint_id, "2");
}

#[tokio::test]
async fn embedding_is_deterministic() {
    let embedder = HashEmbedder::default();
    let a = embed_query(&embedder, "loan officer never called back").await.unwrap();
    let b = embed_query(&embedder, "loan officer never called back").await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn empty_index_still_invokes_generator() {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let store = VectorStore::in_memory();
    store
        .create_collection("complaints", embedder.model_info(), false)
        .await
        .unwrap();

    let retriever = Retriever::open(&store, "complaints", embedder).await.unwrap();
    assert!(retriever.retrieve("anything", 5).await.unwrap().is_empty());

    let orchestrator = RagOrchestrator::new(retriever, Arc::new(EchoGenerator));
    let (answer, chunks, metadata) = orchestrator
        .answer_question("What are the main concerns regarding savings accounts?")
        .await
        .unwrap()
        .into_parts();

    assert!(chunks.is_empty());
    assert!(metadata.is_empty());
    assert!(answer.contains("don't have enough information"));
    assert!(answer.contains("savings accounts?"));
}

/// Fails any batch containing the word "poison".
struct FlakyEmbedder(HashEmbedder);

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        self.0.model_name()
    }
    fn dims(&self) -> usize {
        self.0.dims()
    }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(RagError::Embedding {
                provider: "flaky".to_string(),
                message: "forced failure".to_string(),
            });
        }
        self.0.embed_batch(texts).await
    }
}

#[tokio::test]
async fn indexing_survives_one_failing_record() {
    let embedder: Arc<dyn Embedder> = Arc::new(FlakyEmbedder(HashEmbedder::default()));
    let store = VectorStore::in_memory();
    let collection = store
        .create_collection("complaints", embedder.model_info(), false)
        .await
        .unwrap();

    let mut records = two_complaints();
    records.push(record("3", "BNPL", "poison record that cannot be embedded"));
    records.push(record("4", "Savings account", "savings account closed without notice"));

    let stats = pipeline(embedder)
        .index_records(&collection, &records, &NoProgress)
        .await;

    assert_eq!(stats.records, 4);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.inserted, 3);
    assert_eq!(stats.failed, 0);
    assert!(collection.get("3_0").await.is_none());
}

#[tokio::test]
async fn persisted_index_reopens_for_retrieval() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vector_store");
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(96));

    {
        let store = VectorStore::load(&dir).await.unwrap();
        let collection = store
            .create_collection("complaints", embedder.model_info(), false)
            .await
            .unwrap();
        pipeline(Arc::clone(&embedder))
            .index_records(&collection, &two_complaints(), &NoProgress)
            .await;
        store.persist().await.unwrap();
    }

    let reopened = VectorStore::load(&dir).await.unwrap();
    let retriever = Retriever::open(&reopened, "complaints", Arc::clone(&embedder))
        .await
        .unwrap();
    let top = retriever.retrieve("double charge on card", 1).await.unwrap();
    assert_eq!(top[0].metadata.complaint_id, "1");

    // A different embedding model cannot query this index
    let other: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(48));
    assert!(matches!(
        Retriever::open(&reopened, "complaints", other).await,
        Err(RagError::ModelMismatch { .. })
    ));
}

#[tokio::test]
async fn generator_failure_is_typed() {
    struct Broken;

    #[async_trait]
    impl Generator for Broken {
        fn model_name(&self) -> &str {
            "broken"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(RagError::Generation("model crashed".to_string()))
        }
    }

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let store = VectorStore::in_memory();
    let collection = store
        .create_collection("complaints", embedder.model_info(), false)
        .await
        .unwrap();
    pipeline(Arc::clone(&embedder))
        .index_records(&collection, &two_complaints(), &NoProgress)
        .await;

    let retriever = Retriever::open(&store, "complaints", embedder).await.unwrap();
    let orchestrator = RagOrchestrator::new(retriever, Arc::new(Broken));
    let err = orchestrator.answer_question("card?").await.unwrap_err();
    assert!(matches!(err, RagError::Generation(msg) if msg == "model crashed"));
}
