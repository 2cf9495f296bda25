//! Core data models used throughout the pipeline.
//!
//! Records flow through indexing as `ComplaintRecord → Chunk → IndexedVector`;
//! a question flows through answering as `RetrievedChunk`s collected into an
//! [`AnswerRecord`].

use serde::{Deserialize, Serialize};

/// A cleaned complaint as loaded from the dataset. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintRecord {
    pub id: String,
    pub product: String,
    pub narrative: String,
}

/// A bounded, overlapping substring of a complaint narrative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `ComplaintRecord::id` of the narrative this chunk came from.
    pub parent_id: String,
    /// Position among sibling chunks, contiguous from 0.
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// Deterministic index key: `{parent_id}_{index}`.
    pub fn id(&self) -> String {
        chunk_id(&self.parent_id, self.index)
    }
}

/// Build the index key for the `index`-th chunk of a complaint.
pub fn chunk_id(parent_id: &str, index: usize) -> String {
    format!("{}_{}", parent_id, index)
}

/// Metadata stored alongside every indexed vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Complaint id the chunk was cut from.
    pub complaint_id: String,
    pub product: String,
    pub chunk_index: usize,
}

/// One entry of the vector index. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub text: String,
}

/// Identity of the embedding model a collection was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    pub name: String,
    pub dims: usize,
}

impl std::fmt::Display for EmbeddingModelInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} dims)", self.name, self.dims)
    }
}

/// A chunk returned by the retriever, most similar first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub similarity: f32,
}

/// The answer to one question together with the evidence it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    /// Supporting chunks in retrieval order.
    pub sources: Vec<RetrievedChunk>,
}

impl AnswerRecord {
    /// Supporting chunk texts in retrieval order.
    pub fn chunks(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.text.as_str()).collect()
    }

    /// Supporting chunk metadata in retrieval order.
    pub fn metadata(&self) -> Vec<&ChunkMetadata> {
        self.sources.iter().map(|s| &s.metadata).collect()
    }

    /// Split into the `(answer, chunks, metadata)` triple.
    pub fn into_parts(self) -> (String, Vec<String>, Vec<ChunkMetadata>) {
        let (chunks, metadata) = self
            .sources
            .into_iter()
            .map(|s| (s.text, s.metadata))
            .unzip();
        (self.answer, chunks, metadata)
    }
}
