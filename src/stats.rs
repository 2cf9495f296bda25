//! Index statistics.
//!
//! Summarises what the persisted vector index holds: which embedding model
//! each collection was built with, how many vectors and complaints it
//! contains, a per-product breakdown, and the digest of the dataset it was
//! built from. Used by `crag stats` to confirm an index run did what was
//! expected before answering questions against it.

use anyhow::Result;

use crate::config::Config;
use crate::store::{VectorStore, INDEX_FILE};

/// Run the stats command: load the index and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let db_path = config.index.path.join(INDEX_FILE);
    let store = VectorStore::load(&config.index.path).await?;
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Complaint RAG: Index Stats");
    println!("==========================");
    println!();
    println!("  Index:       {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));

    let names = store.collection_names().await;
    if names.is_empty() {
        println!();
        println!("  No collections. Run `crag index` to build one.");
        println!();
        return Ok(());
    }

    for name in names {
        let collection = store.get_collection(&name).await?;
        let stats = collection.stats().await;
        let digest = collection
            .source_digest()
            .await
            .map(|d| d.chars().take(12).collect::<String>())
            .unwrap_or_else(|| "unknown".to_string());

        println!();
        println!("  Collection:  {}", name);
        println!("  Model:       {}", collection.model());
        println!("  Created:     {}", format_ts_iso(collection.created_at()));
        println!("  Dataset:     sha256:{}", digest);
        println!("  Vectors:     {}", stats.vectors);
        println!("  Complaints:  {}", stats.complaints);

        if !stats.products.is_empty() {
            println!();
            println!("  {:<48} {:>10}", "PRODUCT", "COMPLAINTS");
            println!("  {}", "-".repeat(59));
            for (product, count) in &stats.products {
                let label = if product.is_empty() { "(none)" } else { product };
                println!("  {:<48} {:>10}", label, count);
            }
        }
    }

    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
