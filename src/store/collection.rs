//! A single named collection of embedded chunks.
//!
//! Vector search is exact brute-force cosine similarity over every stored
//! vector. Entries sit behind a `tokio::sync::RwLock`, so concurrent `add`
//! calls with distinct ids are safe and queries never block each other.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{ChunkMetadata, EmbeddingModelInfo, IndexedVector};

/// One query result: flat `(id, similarity, metadata, text)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub similarity: f32,
    pub metadata: ChunkMetadata,
    pub text: String,
}

/// Summary counts for `crag stats`.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub vectors: usize,
    pub complaints: usize,
    pub products: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
pub(crate) struct Entries {
    positions: HashMap<String, usize>,
    pub(crate) vectors: Vec<IndexedVector>,
}

#[derive(Debug)]
pub struct Collection {
    name: String,
    model: EmbeddingModelInfo,
    created_at: i64,
    source_digest: RwLock<Option<String>>,
    pub(crate) entries: RwLock<Entries>,
}

impl Collection {
    pub(crate) fn new(name: &str, model: EmbeddingModelInfo, created_at: i64) -> Self {
        Self {
            name: name.to_string(),
            model,
            created_at,
            source_digest: RwLock::new(None),
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Embedding model this collection was built with.
    pub fn model(&self) -> &EmbeddingModelInfo {
        &self.model
    }

    /// Unix timestamp of creation.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// SHA-256 of the dataset that populated the collection, if recorded.
    pub async fn source_digest(&self) -> Option<String> {
        self.source_digest.read().await.clone()
    }

    pub async fn set_source_digest(&self, digest: Option<String>) {
        *self.source_digest.write().await = digest;
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.vectors.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert a vector.
    ///
    /// # Errors
    ///
    /// - [`RagError::DimensionMismatch`] if the vector length differs from the collection's.
    /// - [`RagError::DuplicateId`] if `entry.chunk_id` is already stored.
    pub async fn add(&self, entry: IndexedVector) -> Result<()> {
        if entry.vector.len() != self.model.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.model.dims,
                actual: entry.vector.len(),
            });
        }

        let mut entries = self.entries.write().await;
        if entries.positions.contains_key(&entry.chunk_id) {
            return Err(RagError::DuplicateId(entry.chunk_id));
        }
        let position = entries.vectors.len();
        entries.positions.insert(entry.chunk_id.clone(), position);
        entries.vectors.push(entry);
        Ok(())
    }

    /// Return at most `k` entries ordered by descending cosine similarity.
    ///
    /// Ties keep insertion order. A collection with fewer than `k` entries
    /// returns all of them.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        if vector.len() != self.model.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.model.dims,
                actual: vector.len(),
            });
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<(usize, f32)> = entries
            .vectors
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, similarity)| {
                let entry = &entries.vectors[i];
                QueryHit {
                    id: entry.chunk_id.clone(),
                    similarity,
                    metadata: entry.metadata.clone(),
                    text: entry.text.clone(),
                }
            })
            .collect())
    }

    /// Look up a stored entry by id.
    pub async fn get(&self, chunk_id: &str) -> Option<IndexedVector> {
        let entries = self.entries.read().await;
        entries
            .positions
            .get(chunk_id)
            .map(|&i| entries.vectors[i].clone())
    }

    pub async fn stats(&self) -> CollectionStats {
        let entries = self.entries.read().await;
        let mut by_product: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        let mut complaints = HashSet::new();
        for e in &entries.vectors {
            complaints.insert(e.metadata.complaint_id.as_str());
            by_product
                .entry(e.metadata.product.as_str())
                .or_default()
                .insert(e.metadata.complaint_id.as_str());
        }
        CollectionStats {
            vectors: entries.vectors.len(),
            complaints: complaints.len(),
            products: by_product
                .into_iter()
                .map(|(product, ids)| (product.to_string(), ids.len()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(dims: usize) -> EmbeddingModelInfo {
        EmbeddingModelInfo {
            name: "test".to_string(),
            dims,
        }
    }

    fn entry(id: &str, vector: Vec<f32>) -> IndexedVector {
        IndexedVector {
            chunk_id: id.to_string(),
            vector,
            metadata: ChunkMetadata {
                complaint_id: id.split('_').next().unwrap().to_string(),
                product: "Credit card".to_string(),
                chunk_index: 0,
            },
            text: format!("text of {}", id),
        }
    }

    #[tokio::test]
    async fn test_self_similarity_is_highest() {
        let c = Collection::new("c", model(3), 0);
        c.add(entry("1_0", vec![1.0, 0.0, 0.0])).await.unwrap();
        c.add(entry("2_0", vec![0.7, 0.7, 0.0])).await.unwrap();
        c.add(entry("3_0", vec![0.0, 0.0, 1.0])).await.unwrap();

        let hits = c.query(&[0.7, 0.7, 0.0], 3).await.unwrap();
        assert_eq!(hits[0].id, "2_0");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(hits[0].text, "text of 2_0");
    }

    #[tokio::test]
    async fn test_query_bounded_by_k_and_size() {
        let c = Collection::new("c", model(2), 0);
        c.add(entry("1_0", vec![1.0, 0.0])).await.unwrap();
        c.add(entry("2_0", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(c.query(&[1.0, 1.0], 1).await.unwrap().len(), 1);
        assert_eq!(c.query(&[1.0, 1.0], 10).await.unwrap().len(), 2);
        assert!(c.query(&[1.0, 1.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_collection_query() {
        let c = Collection::new("c", model(2), 0);
        assert!(c.query(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let c = Collection::new("c", model(2), 0);
        c.add(entry("1_0", vec![1.0, 0.0])).await.unwrap();
        let err = c.add(entry("1_0", vec![0.0, 1.0])).await.unwrap_err();
        assert!(matches!(err, RagError::DuplicateId(id) if id == "1_0"));
        assert_eq!(c.len().await, 1);
        assert_eq!(c.get("1_0").await.unwrap().vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_dimension_checked() {
        let c = Collection::new("c", model(2), 0);
        assert!(matches!(
            c.add(entry("1_0", vec![1.0, 0.0, 0.0])).await,
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            c.query(&[1.0], 1).await,
            Err(RagError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_adds_with_distinct_ids() {
        let c = std::sync::Arc::new(Collection::new("c", model(2), 0));
        let mut handles = Vec::new();
        for i in 0..32 {
            let c = std::sync::Arc::clone(&c);
            handles.push(tokio::spawn(async move {
                c.add(entry(&format!("{}_0", i), vec![i as f32, 1.0])).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(c.len().await, 32);
    }

    #[tokio::test]
    async fn test_stats_counts_complaints_and_products() {
        let c = Collection::new("c", model(2), 0);
        c.add(entry("1_0", vec![1.0, 0.0])).await.unwrap();
        let mut second = entry("1_1", vec![0.0, 1.0]);
        second.metadata.chunk_index = 1;
        c.add(second).await.unwrap();
        c.add(entry("2_0", vec![1.0, 1.0])).await.unwrap();

        let stats = c.stats().await;
        assert_eq!(stats.vectors, 3);
        assert_eq!(stats.complaints, 2);
        assert_eq!(stats.products.get("Credit card"), Some(&2));
    }

    #[tokio::test]
    async fn test_stats_counts_complaint_without_first_chunk() {
        let c = Collection::new("c", model(2), 0);
        // Chunk 0 of complaint 5 was never inserted
        let mut later = entry("5_1", vec![1.0, 0.0]);
        later.metadata.chunk_index = 1;
        later.metadata.product = "BNPL".to_string();
        c.add(later).await.unwrap();

        let stats = c.stats().await;
        assert_eq!(stats.complaints, 1);
        assert_eq!(stats.products.get("BNPL"), Some(&1));
    }

    #[tokio::test]
    async fn test_debug_names_collection() {
        let c = Collection::new("complaints", model(2), 0);
        assert!(format!("{:?}", c).contains("complaints"));
    }
}
