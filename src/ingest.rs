//! Indexing Pipeline.
//!
//! Coordinates `dataset → chunking → embedding → vector index → persist`.
//!
//! Each complaint is an independent unit of work: its narrative is split
//! into chunks, the chunks are embedded in batches, and every resulting
//! vector is inserted under the deterministic id `{complaint_id}_{index}`.
//! Complaints are processed concurrently (`embedding.concurrency` at a time).
//!
//! A failure never aborts the run. When a batch embedding call fails, its
//! chunks are retried one at a time so that only the offending chunk is
//! lost. Chunks whose embedding fails are counted as **skipped**; chunks
//! whose insertion fails (for example a duplicate id) are counted as
//! **failed**. Both are logged with the chunk id. Whitespace-only chunks
//! are never sent to the embedder and are counted as **blank chunks**.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::chunk::Chunker;
use crate::config::Config;
use crate::dataset;
use crate::embedding::{create_embedder, embed_texts, Embedder};
use crate::models::{Chunk, ChunkMetadata, ComplaintRecord, IndexedVector};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress, ProgressMode};
use crate::store::{Collection, VectorStore};

/// Outcome counts of one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Complaints seen.
    pub records: usize,
    /// Complaints whose narrative was empty or whitespace-only.
    pub empty_records: usize,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Whitespace-only chunks, dropped before embedding.
    pub blank_chunks: usize,
    pub inserted: usize,
    /// Chunks whose embedding failed.
    pub skipped: usize,
    /// Chunks whose insertion failed.
    pub failed: usize,
}

impl IndexStats {
    fn merge(&mut self, other: IndexStats) {
        self.records += other.records;
        self.empty_records += other.empty_records;
        self.chunks += other.chunks;
        self.blank_chunks += other.blank_chunks;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

pub struct IndexingPipeline {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    concurrency: usize,
}

impl IndexingPipeline {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            chunker,
            embedder,
            batch_size: 64,
            concurrency: 4,
        }
    }

    /// Chunks per embedding request. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Complaints indexed at the same time. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Chunk, embed and insert every record into `collection`.
    pub async fn index_records(
        &self,
        collection: &Collection,
        records: &[ComplaintRecord],
        progress: &dyn IndexProgressReporter,
    ) -> IndexStats {
        let total = records.len() as u64;
        let mut stats = IndexStats::default();
        let mut done = 0u64;

        let mut outcomes = stream::iter(records)
            .map(|record| self.index_record(collection, record))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            stats.merge(outcome);
            done += 1;
            progress.report(IndexProgressEvent::Indexing { n: done, total });
        }

        info!(
            collection = collection.name(),
            records = stats.records,
            chunks = stats.chunks,
            blank_chunks = stats.blank_chunks,
            inserted = stats.inserted,
            skipped = stats.skipped,
            failed = stats.failed,
            "indexing finished"
        );
        stats
    }

    async fn index_record(&self, collection: &Collection, record: &ComplaintRecord) -> IndexStats {
        let mut stats = IndexStats {
            records: 1,
            ..IndexStats::default()
        };

        if record.narrative.trim().is_empty() {
            stats.empty_records = 1;
            return stats;
        }

        let mut chunks = self.chunker.split(&record.id, &record.narrative);
        stats.chunks = chunks.len();
        chunks.retain(|chunk| {
            let blank = chunk.text.trim().is_empty();
            if blank {
                debug!(chunk_id = %chunk.id(), "dropping whitespace-only chunk");
            }
            !blank
        });
        stats.blank_chunks = stats.chunks - chunks.len();

        for batch in chunks.chunks(self.batch_size) {
            for (chunk, vector) in self.embed_batch(batch).await {
                let Some(vector) = vector else {
                    stats.skipped += 1;
                    continue;
                };
                let entry = IndexedVector {
                    chunk_id: chunk.id(),
                    vector,
                    metadata: ChunkMetadata {
                        complaint_id: record.id.clone(),
                        product: record.product.clone(),
                        chunk_index: chunk.index,
                    },
                    text: chunk.text.clone(),
                };
                let chunk_id = entry.chunk_id.clone();
                match collection.add(entry).await {
                    Ok(()) => stats.inserted += 1,
                    Err(e) => {
                        warn!(chunk_id = %chunk_id, error = %e, "failed to insert chunk");
                        stats.failed += 1;
                    }
                }
            }
        }

        stats
    }

    /// Embed a batch, falling back to one request per chunk if the batch
    /// call fails. `None` marks a chunk whose embedding could not be produced.
    async fn embed_batch<'c>(&self, batch: &'c [Chunk]) -> Vec<(&'c Chunk, Option<Vec<f32>>)> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

        match embed_texts(self.embedder.as_ref(), &texts).await {
            Ok(vectors) => batch.iter().zip(vectors.into_iter().map(Some)).collect(),
            Err(batch_err) if batch.len() > 1 => {
                warn!(
                    chunks = batch.len(),
                    error = %batch_err,
                    "batch embedding failed, retrying chunks individually"
                );
                let mut out = Vec::with_capacity(batch.len());
                for chunk in batch {
                    let vector = match embed_texts(self.embedder.as_ref(), &[chunk.text.clone()])
                        .await
                    {
                        Ok(mut v) => v.pop(),
                        Err(e) => {
                            warn!(chunk_id = %chunk.id(), error = %e, "skipping chunk");
                            None
                        }
                    };
                    out.push((chunk, vector));
                }
                out
            }
            Err(e) => {
                let chunk = &batch[0];
                warn!(chunk_id = %chunk.id(), error = %e, "skipping chunk");
                vec![(chunk, None)]
            }
        }
    }
}

/// Run `crag index`: load the dataset, build the collection, persist it.
pub async fn run_index(
    config: &Config,
    dataset_override: Option<PathBuf>,
    rebuild: bool,
    append: bool,
    limit: Option<usize>,
    dry_run: bool,
    progress_mode: ProgressMode,
) -> Result<()> {
    let Some(path) = dataset_override.or_else(|| config.dataset.path.clone()) else {
        bail!("No dataset given: pass --dataset or set [dataset] path in config");
    };

    let reporter: Box<dyn IndexProgressReporter> = if dry_run {
        Box::new(NoProgress)
    } else {
        progress_mode.reporter()
    };
    reporter.report(IndexProgressEvent::Loading {
        path: path.display().to_string(),
    });

    let mut records = dataset::load_complaints(&config.dataset, &path)?;
    if let Some(lim) = limit {
        records.truncate(lim);
    }

    let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
    let collection_name = &config.index.collection;

    if dry_run {
        let empty = records
            .iter()
            .filter(|r| r.narrative.trim().is_empty())
            .count();
        let estimated: usize = records
            .iter()
            .map(|r| chunker.windows(&r.narrative).count())
            .sum();
        println!("index {} (dry-run)", collection_name);
        println!("  records: {}", records.len());
        println!("  empty narratives: {}", empty);
        println!("  estimated chunks: {}", estimated);
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let store = VectorStore::load(&config.index.path).await?;

    if rebuild && store.delete_collection(collection_name).await {
        info!(collection = %collection_name, "dropped existing collection for rebuild");
    }
    let collection = store
        .create_collection(collection_name, embedder.model_info(), append)
        .await?;

    let pipeline = IndexingPipeline::new(chunker, embedder)
        .with_batch_size(config.embedding.batch_size)
        .with_concurrency(config.embedding.concurrency);
    let stats = pipeline
        .index_records(&collection, &records, reporter.as_ref())
        .await;

    collection
        .set_source_digest(Some(dataset::file_digest(&path)?))
        .await;
    store.persist().await?;

    println!("index {}", collection_name);
    println!("  model: {}", collection.model());
    println!("  records: {}", stats.records);
    println!("  empty narratives: {}", stats.empty_records);
    println!("  chunks: {}", stats.chunks);
    println!("  blank chunks: {}", stats.blank_chunks);
    println!("  inserted: {}", stats.inserted);
    println!("  skipped: {}", stats.skipped);
    println!("  failed: {}", stats.failed);
    println!("  total vectors: {}", collection.len().await);
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::error::RagError;
    use async_trait::async_trait;

    /// Fails any request containing the word "poison".
    struct PoisonEmbedder(HashEmbedder);

    #[async_trait]
    impl Embedder for PoisonEmbedder {
        fn model_name(&self) -> &str {
            self.0.model_name()
        }
        fn dims(&self) -> usize {
            self.0.dims()
        }
        async fn embed_batch(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(RagError::embedding("test", "poisoned input"));
            }
            self.0.embed_batch(texts).await
        }
    }

    fn record(id: &str, product: &str, narrative: &str) -> ComplaintRecord {
        ComplaintRecord {
            id: id.to_string(),
            product: product.to_string(),
            narrative: narrative.to_string(),
        }
    }

    async fn collection_for(embedder: &dyn Embedder) -> Arc<Collection> {
        VectorStore::in_memory()
            .create_collection("complaints", embedder.model_info(), false)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_failing_record_is_skipped_others_indexed() {
        let embedder: Arc<dyn Embedder> = Arc::new(PoisonEmbedder(HashEmbedder::new(32)));
        let collection = collection_for(embedder.as_ref()).await;
        let pipeline = IndexingPipeline::new(Chunker::new(512, 50).unwrap(), embedder)
            .with_batch_size(8)
            .with_concurrency(2);

        let records = vec![
            record("1", "Credit card", "my credit card was charged twice"),
            record("2", "Personal loan", "poison pill narrative"),
            record("3", "Savings account", "savings account closed without notice"),
        ];
        let stats = pipeline
            .index_records(&collection, &records, &NoProgress)
            .await;

        assert_eq!(stats.records, 3);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
        assert!(collection.get("1_0").await.is_some());
        assert!(collection.get("2_0").await.is_none());
        assert!(collection.get("3_0").await.is_some());
    }

    #[tokio::test]
    async fn test_batch_failure_falls_back_per_chunk() {
        let embedder: Arc<dyn Embedder> = Arc::new(PoisonEmbedder(HashEmbedder::new(32)));
        let collection = collection_for(embedder.as_ref()).await;
        let pipeline = IndexingPipeline::new(Chunker::new(20, 5).unwrap(), embedder);

        // Several chunks in one batch, only one of them poisoned
        let narrative = "first clean sentence. second clean sentence. poison here. last clean part";
        let stats = pipeline
            .index_records(&collection, &[record("9", "Credit card", narrative)], &NoProgress)
            .await;

        assert!(stats.chunks > 2);
        assert!(stats.skipped >= 1);
        assert_eq!(stats.inserted + stats.skipped, stats.chunks);
        assert!(stats.inserted >= 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_count_as_failed() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let collection = collection_for(embedder.as_ref()).await;
        let pipeline = IndexingPipeline::new(Chunker::new(512, 50).unwrap(), embedder);

        let records = vec![
            record("1", "Credit card", "charged twice"),
            record("1", "Credit card", "charged three times"),
        ];
        let stats = pipeline
            .index_records(&collection, &records, &NoProgress)
            .await;

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(collection.len().await, 1);
    }

    #[tokio::test]
    async fn test_empty_narratives_counted() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let collection = collection_for(embedder.as_ref()).await;
        let pipeline = IndexingPipeline::new(Chunker::new(512, 50).unwrap(), embedder);

        let records = vec![record("1", "Credit card", "   "), record("2", "Credit card", "")];
        let stats = pipeline
            .index_records(&collection, &records, &NoProgress)
            .await;

        assert_eq!(stats.empty_records, 2);
        assert_eq!(stats.chunks, 0);
        assert!(collection.is_empty().await);
    }

    #[tokio::test]
    async fn test_whitespace_only_chunks_not_embedded() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let collection = collection_for(embedder.as_ref()).await;
        let pipeline = IndexingPipeline::new(Chunker::new(10, 2).unwrap(), embedder);

        // The run of spaces in the middle yields chunks with no text at all
        let narrative = format!("alpha{}omega", " ".repeat(40));
        let stats = pipeline
            .index_records(&collection, &[record("5", "BNPL", &narrative)], &NoProgress)
            .await;

        assert_eq!(stats.empty_records, 0);
        assert!(stats.blank_chunks >= 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.inserted + stats.blank_chunks, stats.chunks);
        assert_eq!(collection.len().await, stats.inserted);
        assert!(collection.get("5_0").await.unwrap().text.contains("alpha"));
        assert!(collection.get("5_1").await.is_none());
    }

    #[tokio::test]
    async fn test_metadata_recorded_per_chunk() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let collection = collection_for(embedder.as_ref()).await;
        let pipeline = IndexingPipeline::new(Chunker::new(30, 5).unwrap(), embedder);

        let narrative = "the transfer was sent on monday and never arrived at the bank";
        let stats = pipeline
            .index_records(
                &collection,
                &[record("77", "Money transfers", narrative)],
                &NoProgress,
            )
            .await;

        assert!(stats.chunks >= 2);
        let second = collection.get("77_1").await.unwrap();
        assert_eq!(second.metadata.complaint_id, "77");
        assert_eq!(second.metadata.product, "Money transfers");
        assert_eq!(second.metadata.chunk_index, 1);
    }
}
