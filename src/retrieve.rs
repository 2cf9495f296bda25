//! Retriever: question → top-k most similar chunks.
//!
//! A [`Retriever`] is bound to one collection and one embedder. Binding
//! checks that the embedder is the model the collection was built with, so
//! a query is never compared against vectors from a different embedding
//! space.

use std::sync::Arc;

use anyhow::Result as AnyResult;
use tracing::debug;

use crate::config::Config;
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::error::{RagError, Result};
use crate::models::RetrievedChunk;
use crate::store::{Collection, VectorStore};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    collection: Arc<Collection>,
}

impl Retriever {
    /// Bind to collection `name` in `store`.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if the collection has not been built.
    /// - [`RagError::ModelMismatch`] if `embedder` differs from the indexed model.
    pub async fn open(store: &VectorStore, name: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let collection = store.get_collection(name).await?;
        Self::new(collection, embedder)
    }

    pub fn new(collection: Arc<Collection>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let query_model = embedder.model_info();
        if collection.model() != &query_model {
            return Err(RagError::ModelMismatch {
                collection: collection.name().to_string(),
                indexed: collection.model().to_string(),
                query: query_model.to_string(),
            });
        }
        Ok(Self {
            embedder,
            collection,
        })
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The `k` chunks most similar to `question`, most similar first.
    ///
    /// An empty collection yields an empty result.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let vector = embed_query(self.embedder.as_ref(), question).await?;
        let hits = self.collection.query(&vector, k).await?;
        debug!(
            collection = self.collection.name(),
            k,
            hits = hits.len(),
            "retrieved chunks"
        );

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: hit.text,
                metadata: hit.metadata,
                similarity: hit.similarity,
            })
            .collect())
    }
}

/// Build a retriever over the persisted index named in `config`.
pub async fn open_from_config(config: &Config) -> Result<Retriever> {
    let embedder = create_embedder(&config.embedding)?;
    let store = VectorStore::load(&config.index.path).await?;
    Retriever::open(&store, &config.index.collection, embedder).await
}

/// Run `crag retrieve`.
pub async fn run_retrieve(config: &Config, question: &str, k: Option<usize>) -> AnyResult<()> {
    let retriever = open_from_config(config).await?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let chunks = retriever.retrieve(question, k).await?;

    if chunks.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / complaint {}",
            i + 1,
            chunk.similarity,
            chunk.metadata.product,
            chunk.metadata.complaint_id
        );
        println!("    chunk: {}", chunk.metadata.chunk_index);
        println!("    excerpt: \"{}\"", chunk.text.replace('\n', " ").trim());
        println!();
    }

    Ok(())
}
