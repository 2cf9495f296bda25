//! Generator abstraction and providers.
//!
//! A [`Generator`] turns a fully assembled prompt into answer text. Output
//! length is bounded by `generation.max_tokens`; the orchestrator applies the
//! wall-clock timeout. Failures surface as [`RagError::Generation`].
//!
//! | Config Value | Provider |
//! |-------------|----------|
//! | `"openai"` | [`OpenAIGenerator`]: `POST /v1/chat/completions` |
//! | `"ollama"` | [`OllamaGenerator`]: `POST {url}/api/generate` |
//! | `"echo"` | [`EchoGenerator`]: returns the prompt unchanged |
//! | `"disabled"` | [`DisabledGenerator`]: always fails |

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::http;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::Config("generation.model required for OpenAI provider".into()))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RagError::Config("OPENAI_API_KEY environment variable not set".into()))?;
        let client = http::client(config.timeout_secs).map_err(RagError::Config)?;

        Ok(Self {
            model,
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let json = http::post_json(
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(RagError::Generation)?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|c| c.trim().to_string())
            .ok_or_else(|| {
                RagError::Generation("invalid OpenAI response: missing message content".into())
            })
    }
}

pub struct OllamaGenerator {
    model: String,
    url: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::Config("generation.model required for Ollama provider".into()))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = http::client(config.timeout_secs).map_err(RagError::Config)?;

        Ok(Self {
            model,
            url,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": self.max_tokens,
                "temperature": self.temperature,
            },
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/api/generate", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await
        .map_err(RagError::Generation)?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(|r| r.trim().to_string())
            .ok_or_else(|| RagError::Generation("invalid Ollama response: missing response".into()))
    }
}

/// Returns the prompt verbatim. Useful for inspecting what a model would see.
#[derive(Debug, Default)]
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}

#[derive(Debug, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::Generation(
            "generation is disabled; set [generation] provider in config".into(),
        ))
    }
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "echo" => Ok(Arc::new(EchoGenerator)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => Err(RagError::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}
