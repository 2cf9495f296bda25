use sqlx::SqlitePool;

use crate::error::Result;

/// Create the persisted-index schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per named collection, with the embedding model it was built with
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            source_digest TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vectors are little-endian f32 BLOBs; seq preserves insertion order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            collection TEXT NOT NULL,
            seq INTEGER NOT NULL,
            chunk_id TEXT NOT NULL,
            complaint_id TEXT NOT NULL,
            product TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            vector BLOB NOT NULL,
            PRIMARY KEY (collection, chunk_id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_collection_seq ON vectors(collection, seq)")
        .execute(pool)
        .await?;

    Ok(())
}
