//! # Complaint RAG
//!
//! Retrieval-augmented question answering over customer complaint
//! narratives.
//!
//! Complaints are loaded from a delimited dataset, split into overlapping
//! chunks, embedded, and stored in a persisted vector index. A question is
//! embedded with the same model, the most similar chunks are retrieved, and
//! a generator answers from those excerpts alone, saying so when they do not
//! contain the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Dataset  │──▶│  Indexing    │──▶│ Vector Index │
//! │  (CSV)   │   │ Chunk+Embed  │   │  (SQLite)    │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!                ┌──────────┐   ┌──────────▼───┐   ┌───────────┐
//!   question ───▶│ Retriever│◀──│  top-k query │   │ Generator │
//!                └────┬─────┘   └──────────────┘   └─────▲─────┘
//!                     │         ┌──────────────┐         │
//!                     └────────▶│    Prompt    │─────────┘
//!                               └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crag index --dataset data/filtered_complaints.csv
//! crag ask "What are the common issues with credit card complaints?"
//! crag eval --output answers.json
//! crag stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed errors |
//! | [`models`] | Core data types |
//! | [`dataset`] | Complaint dataset loader |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedder abstraction and providers |
//! | [`store`] | Vector index with persistence |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`ingest`] | Indexing pipeline |
//! | [`progress`] | Indexing progress on stderr |
//! | [`retrieve`] | Top-k retrieval |
//! | [`prompt`] | Prompt assembly |
//! | [`generation`] | Generator abstraction and providers |
//! | [`answer`] | RAG orchestrator |
//! | [`stats`] | Index statistics |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
mod http;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod retrieve;
pub mod stats;
pub mod store;
