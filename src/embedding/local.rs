//! Local sentence-transformer embeddings via fastembed.
//!
//! Models are downloaded on first use from Hugging Face and cached; after
//! that, embedding runs entirely offline. The ONNX session is created once
//! per provider and reused for every batch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        // Fail on unknown names before any download is attempted.
        to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or_else(|| default_dims(&model_name));

        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let model_name = self.model_name.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| RagError::embedding("local", "model lock poisoned"))?;

            if guard.is_none() {
                let options = fastembed::InitOptions::new(to_fastembed_model(&model_name)?)
                    .with_show_download_progress(true);
                let loaded = fastembed::TextEmbedding::try_new(options).map_err(|e| {
                    RagError::embedding(
                        "local",
                        format!("failed to initialize model '{}': {}", model_name, e),
                    )
                })?;
                *guard = Some(loaded);
            }

            let Some(session) = guard.as_mut() else {
                return Err(RagError::embedding("local", "model not initialized"));
            };

            session
                .embed(texts, Some(batch_size))
                .map_err(|e| RagError::embedding("local", e.to_string()))
        })
        .await
        .map_err(|e| RagError::embedding("local", format!("embedding task failed: {}", e)))?
    }
}

fn default_dims(name: &str) -> usize {
    match name {
        "bge-base-en-v1.5" | "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "multilingual-e5-base" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    }
}

fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(RagError::Config(format!(
            "unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_minilm() {
        let embedder = LocalEmbedder::new(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "all-minilm-l6-v2");
        assert_eq!(embedder.dims(), 384);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let config = EmbeddingConfig {
            model: Some("word2vec".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            LocalEmbedder::new(&config),
            Err(RagError::Config(_))
        ));
    }
}
