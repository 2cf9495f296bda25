//! Complaint dataset loader.
//!
//! Reads a delimited text file with a header row, one complaint per row,
//! into [`ComplaintRecord`]s. Column names come from `[dataset]` config;
//! when unset, the loader accepts either the short names (`id`, `product`)
//! or the CFPB export names (`Complaint ID`, `Product`), plus
//! `cleaned_narrative` for the text.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::config::DatasetConfig;
use crate::models::ComplaintRecord;

const ID_COLUMNS: &[&str] = &["id", "Complaint ID"];
const PRODUCT_COLUMNS: &[&str] = &["product", "Product"];
const NARRATIVE_COLUMNS: &[&str] = &["cleaned_narrative"];

/// Load every complaint in `path`.
///
/// Rows with an empty id are skipped with a warning. Empty narratives are
/// kept; the indexing pipeline counts them separately.
pub fn load_complaints(config: &DatasetConfig, path: &Path) -> Result<Vec<ComplaintRecord>> {
    if !config.delimiter.is_ascii() {
        bail!(
            "dataset.delimiter must be a single ASCII character, got '{}'",
            config.delimiter
        );
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter as u8)
        .has_headers(true)
        .flexible(false)
        .from_path(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .clone();

    let id_col = resolve_column(&headers, config.id_column.as_deref(), ID_COLUMNS)?;
    let product_col = resolve_column(&headers, config.product_column.as_deref(), PRODUCT_COLUMNS)?;
    let narrative_col = resolve_column(
        &headers,
        config.narrative_column.as_deref(),
        NARRATIVE_COLUMNS,
    )?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;

        let id = row.get(id_col).unwrap_or("").trim();
        if id.is_empty() {
            warn!(row = line + 2, "skipping complaint with empty id");
            continue;
        }

        records.push(ComplaintRecord {
            id: id.to_string(),
            product: row.get(product_col).unwrap_or("").trim().to_string(),
            narrative: row.get(narrative_col).unwrap_or("").to_string(),
        });
    }

    info!(path = %path.display(), records = records.len(), "loaded complaints");
    Ok(records)
}

fn resolve_column(
    headers: &csv::StringRecord,
    configured: Option<&str>,
    aliases: &[&str],
) -> Result<usize> {
    let find = |name: &str| headers.iter().position(|h| h.trim() == name);

    if let Some(name) = configured {
        return find(name).with_context(|| format!("dataset has no column named '{}'", name));
    }

    match aliases.iter().find_map(|a| find(*a)) {
        Some(i) => Ok(i),
        None => bail!(
            "dataset is missing a required column (expected one of: {})",
            aliases.join(", ")
        ),
    }
}

/// SHA-256 of a file's bytes, hex-encoded. Recorded with the collection it built.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
