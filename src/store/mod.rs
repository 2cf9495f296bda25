//! Vector Index: named collections of embedded chunks with on-disk persistence.
//!
//! A [`VectorStore`] owns any number of [`Collection`]s keyed by name. It is
//! constructed explicitly (in memory, or loaded from a directory) and passed
//! by reference to the indexing pipeline and the retriever; there is no
//! process-wide instance.
//!
//! # Persistence
//!
//! A store loaded from a directory persists to `{dir}/index.sqlite`:
//!
//! ```text
//! collections(name, model, dims, created_at, source_digest)
//! vectors(collection, seq, chunk_id, complaint_id, product, chunk_index, text, vector)
//! ```
//!
//! Vectors are written as little-endian `f32` BLOBs (see
//! [`vec_to_blob`](crate::embedding::vec_to_blob)), so a persist/load round
//! trip reproduces every value bit-for-bit. `seq` restores insertion order,
//! which keeps tie-breaking in [`Collection::query`] stable across reloads.

mod collection;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::Row;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{ChunkMetadata, EmbeddingModelInfo, IndexedVector};

pub use collection::{Collection, CollectionStats, QueryHit};

/// File name of the persisted index inside the store directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub struct VectorStore {
    dir: Option<PathBuf>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl VectorStore {
    /// A store that lives only in memory; [`persist`](Self::persist) is a no-op.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Open the store persisted under `dir`.
    ///
    /// A directory without an index file yields an empty store bound to
    /// `dir`; the file is created on the first [`persist`](Self::persist).
    pub async fn load(dir: &Path) -> Result<Self> {
        let store = Self {
            dir: Some(dir.to_path_buf()),
            collections: RwLock::new(HashMap::new()),
        };

        let db_path = dir.join(INDEX_FILE);
        if !db_path.exists() {
            debug!(path = %db_path.display(), "no persisted index, starting empty");
            return Ok(store);
        }

        let pool = db::connect_read_only(&db_path).await?;
        let loaded = read_collections(&pool).await;
        pool.close().await;

        let mut collections = store.collections.write().await;
        for collection in loaded? {
            collections.insert(collection.name().to_string(), Arc::new(collection));
        }
        info!(
            path = %db_path.display(),
            collections = collections.len(),
            "loaded vector index"
        );
        drop(collections);

        Ok(store)
    }

    /// Directory this store persists to, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Create a collection bound to `model`.
    ///
    /// When the name is taken: with `reuse` the existing collection is
    /// returned provided it was built with the same model, otherwise the
    /// call fails with [`RagError::AlreadyExists`].
    pub async fn create_collection(
        &self,
        name: &str,
        model: EmbeddingModelInfo,
        reuse: bool,
    ) -> Result<Arc<Collection>> {
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(name) {
            if !reuse {
                return Err(RagError::AlreadyExists(name.to_string()));
            }
            if existing.model() != &model {
                return Err(RagError::ModelMismatch {
                    collection: name.to_string(),
                    indexed: existing.model().to_string(),
                    query: model.to_string(),
                });
            }
            return Ok(Arc::clone(existing));
        }

        let collection = Arc::new(Collection::new(
            name,
            model,
            chrono::Utc::now().timestamp(),
        ));
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }

    /// Fetch a collection that has already been built.
    pub async fn get_collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RagError::IndexNotFound(name.to_string()))
    }

    /// Drop a collection. Returns whether it existed.
    pub async fn delete_collection(&self, name: &str) -> bool {
        self.collections.write().await.remove(name).is_some()
    }

    /// Collection names in sorted order.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Write every collection to disk, replacing the previous contents.
    pub async fn persist(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let db_path = dir.join(INDEX_FILE);

        let pool = db::connect(&db_path).await?;
        migrate::run_migrations(&pool).await?;
        let written = write_collections(&pool, &self.collections).await;
        pool.close().await;
        let vectors = written?;

        info!(path = %db_path.display(), vectors, "persisted vector index");
        Ok(())
    }
}

async fn write_collections(
    pool: &sqlx::SqlitePool,
    collections: &RwLock<HashMap<String, Arc<Collection>>>,
) -> Result<usize> {
    let collections = collections.read().await;
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM vectors").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM collections")
        .execute(&mut *tx)
        .await?;

    let mut written = 0;
    for collection in collections.values() {
        sqlx::query(
            "INSERT INTO collections (name, model, dims, created_at, source_digest) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection.name())
        .bind(&collection.model().name)
        .bind(collection.model().dims as i64)
        .bind(collection.created_at())
        .bind(collection.source_digest().await)
        .execute(&mut *tx)
        .await?;

        let entries = collection.entries.read().await;
        for (seq, entry) in entries.vectors.iter().enumerate() {
            sqlx::query(
                "INSERT INTO vectors \
                 (collection, seq, chunk_id, complaint_id, product, chunk_index, text, vector) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(collection.name())
            .bind(seq as i64)
            .bind(&entry.chunk_id)
            .bind(&entry.metadata.complaint_id)
            .bind(&entry.metadata.product)
            .bind(entry.metadata.chunk_index as i64)
            .bind(&entry.text)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
    }

    tx.commit().await?;
    Ok(written)
}

async fn read_collections(pool: &sqlx::SqlitePool) -> Result<Vec<Collection>> {
    let rows = sqlx::query(
        "SELECT name, model, dims, created_at, source_digest FROM collections ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    let mut collections = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.get("name");
        let dims: i64 = row.get("dims");
        let model = EmbeddingModelInfo {
            name: row.get("model"),
            dims: dims as usize,
        };
        let collection = Collection::new(&name, model, row.get("created_at"));
        collection
            .set_source_digest(row.get("source_digest"))
            .await;

        let vectors = sqlx::query(
            "SELECT chunk_id, complaint_id, product, chunk_index, text, vector \
             FROM vectors WHERE collection = ? ORDER BY seq",
        )
        .bind(&name)
        .fetch_all(pool)
        .await?;

        for v in vectors {
            let blob: Vec<u8> = v.get("vector");
            if blob.len() != collection.model().dims * 4 {
                return Err(RagError::DimensionMismatch {
                    expected: collection.model().dims,
                    actual: blob.len() / 4,
                });
            }
            let chunk_index: i64 = v.get("chunk_index");
            collection
                .add(IndexedVector {
                    chunk_id: v.get("chunk_id"),
                    vector: blob_to_vec(&blob),
                    metadata: ChunkMetadata {
                        complaint_id: v.get("complaint_id"),
                        product: v.get("product"),
                        chunk_index: chunk_index as usize,
                    },
                    text: v.get("text"),
                })
                .await?;
        }

        collections.push(collection);
    }

    Ok(collections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn model() -> EmbeddingModelInfo {
        EmbeddingModelInfo {
            name: "fnv1a-hash".to_string(),
            dims: 3,
        }
    }

    fn entry(id: &str, product: &str, vector: Vec<f32>) -> IndexedVector {
        IndexedVector {
            chunk_id: format!("{}_0", id),
            vector,
            metadata: ChunkMetadata {
                complaint_id: id.to_string(),
                product: product.to_string(),
                chunk_index: 0,
            },
            text: format!("narrative {}", id),
        }
    }

    #[tokio::test]
    async fn test_create_existing_without_reuse_fails() {
        let store = VectorStore::in_memory();
        store.create_collection("complaints", model(), false).await.unwrap();
        let err = store
            .create_collection("complaints", model(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::AlreadyExists(name) if name == "complaints"));
    }

    #[tokio::test]
    async fn test_reuse_returns_same_collection() {
        let store = VectorStore::in_memory();
        let a = store.create_collection("complaints", model(), false).await.unwrap();
        a.add(entry("1", "Credit card", vec![1.0, 0.0, 0.0])).await.unwrap();

        let b = store.create_collection("complaints", model(), true).await.unwrap();
        assert_eq!(b.len().await, 1);
    }

    #[tokio::test]
    async fn test_reuse_with_other_model_fails() {
        let store = VectorStore::in_memory();
        store.create_collection("complaints", model(), false).await.unwrap();
        let other = EmbeddingModelInfo {
            name: "all-minilm-l6-v2".to_string(),
            dims: 384,
        };
        assert!(matches!(
            store.create_collection("complaints", other, true).await,
            Err(RagError::ModelMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = VectorStore::in_memory();
        assert!(matches!(
            store.get_collection("complaints").await,
            Err(RagError::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = VectorStore::load(&tmp.path().join("vector_store")).await.unwrap();
        assert!(store.collection_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_load_round_trip_is_exact() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vector_store");
        let awkward = vec![0.1f32, -1.0e-38, std::f32::consts::PI];

        {
            let store = VectorStore::load(&dir).await.unwrap();
            let c = store.create_collection("complaints", model(), false).await.unwrap();
            c.add(entry("7", "Savings account", awkward.clone())).await.unwrap();
            c.add(entry("3", "Credit card", vec![0.0, 1.0, 0.0])).await.unwrap();
            c.set_source_digest(Some("abc123".to_string())).await;
            store.persist().await.unwrap();
        }

        let store = VectorStore::load(&dir).await.unwrap();
        assert_eq!(store.collection_names().await, vec!["complaints"]);
        let c = store.get_collection("complaints").await.unwrap();
        assert_eq!(c.model(), &model());
        assert_eq!(c.len().await, 2);
        assert_eq!(c.source_digest().await.as_deref(), Some("abc123"));

        let restored = c.get("7_0").await.unwrap();
        let bits: Vec<u32> = restored.vector.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u32> = awkward.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
        assert_eq!(restored.metadata.product, "Savings account");
        assert_eq!(restored.text, "narrative 7");

        // Insertion order survives the reload
        let entries = c.entries.read().await;
        assert_eq!(entries.vectors[0].chunk_id, "7_0");
        assert_eq!(entries.vectors[1].chunk_id, "3_0");
    }

    #[tokio::test]
    async fn test_persist_after_delete_removes_collection() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vector_store");

        let store = VectorStore::load(&dir).await.unwrap();
        store.create_collection("complaints", model(), false).await.unwrap();
        store.persist().await.unwrap();
        assert!(store.delete_collection("complaints").await);
        store.persist().await.unwrap();

        let reloaded = VectorStore::load(&dir).await.unwrap();
        assert!(reloaded.collection_names().await.is_empty());
    }
}
