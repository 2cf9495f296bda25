//! RAG Orchestrator: retrieve, assemble the prompt, generate.
//!
//! [`RagOrchestrator::answer_question`] is the one call surface the core
//! exposes to callers (the `ask`/`eval` commands, or any embedding
//! application). Its collaborators are constructed once and injected, so
//! tests substitute stub embedders and generators freely.
//!
//! Generation always runs, even when retrieval finds nothing: the prompt
//! then carries an explicitly empty context and the template's
//! insufficient-information instruction decides the answer. Errors from
//! retrieval or generation propagate unchanged; no partial answer is built.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::generation::{create_generator, Generator};
use crate::models::AnswerRecord;
use crate::prompt::PromptTemplate;
use crate::retrieve::{open_from_config, Retriever};

/// Analyst questions asked by `crag eval` when no question file is given.
pub const DEFAULT_EVAL_QUESTIONS: &[&str] = &[
    "What are the common issues with credit card complaints?",
    "How do customers feel about personal loan customer service?",
    "Are there recurring problems with BNPL services?",
    "What are the main concerns regarding savings accounts?",
    "How efficient are money transfer services according to complaints?",
];

const DEFAULT_TOP_K: usize = 5;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct RagOrchestrator {
    retriever: Retriever,
    template: PromptTemplate,
    generator: Arc<dyn Generator>,
    top_k: usize,
    timeout: Duration,
}

impl RagOrchestrator {
    /// Defaults: built-in template, `k = 5`, 120 s generation timeout.
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            template: PromptTemplate::default(),
            generator,
            top_k: DEFAULT_TOP_K,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wire up every collaborator from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let retriever = open_from_config(config).await?;
        let generator = create_generator(&config.generation)?;
        Ok(Self::new(retriever, generator)
            .with_template(config.prompt.template()?)
            .with_top_k(config.retrieval.top_k)
            .with_timeout(Duration::from_secs(config.generation.timeout_secs)))
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer `question` from the indexed complaints.
    ///
    /// # Errors
    ///
    /// Retrieval errors ([`RagError::EmptyInput`], embedding failures) and
    /// [`RagError::Generation`] on generator failure or timeout.
    pub async fn answer_question(&self, question: &str) -> Result<AnswerRecord> {
        let sources = self.retriever.retrieve(question, self.top_k).await?;
        let texts: Vec<&str> = sources.iter().map(|s| s.text.as_str()).collect();
        let prompt = self.template.render(question, &texts);

        let answer = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| {
                RagError::Generation(format!(
                    "{} did not respond within {:?}",
                    self.generator.model_name(),
                    self.timeout
                ))
            })??;

        info!(
            sources = sources.len(),
            generator = self.generator.model_name(),
            "answered question"
        );
        Ok(AnswerRecord {
            question: question.to_string(),
            answer,
            sources,
        })
    }
}

/// Run `crag ask`.
fn require_generation(config: &Config) -> AnyResult<()> {
    if !config.generation.is_enabled() {
        anyhow::bail!("generation is disabled; set [generation] provider in config");
    }
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, k: Option<usize>, json: bool) -> AnyResult<()> {
    require_generation(config)?;
    let mut orchestrator = RagOrchestrator::from_config(config).await?;
    if let Some(k) = k {
        orchestrator = orchestrator.with_top_k(k);
    }

    let record = orchestrator.answer_question(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Answer: {}", record.answer.trim());
    if !record.sources.is_empty() {
        println!();
        for (i, source) in record.sources.iter().enumerate() {
            println!(
                "Source {}: {} [{} / complaint {}]",
                i + 1,
                source.text.replace('\n', " ").trim(),
                source.metadata.product,
                source.metadata.complaint_id
            );
        }
    }
    Ok(())
}

/// Run `crag eval`: answer a batch of questions and print the top two
/// sources for each. One failing question does not stop the batch.
pub async fn run_eval(
    config: &Config,
    questions_file: Option<&Path>,
    output: Option<&Path>,
) -> AnyResult<()> {
    require_generation(config)?;
    let questions: Vec<String> = match questions_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read questions file: {}", path.display()))?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(String::from)
            .collect(),
        None => DEFAULT_EVAL_QUESTIONS.iter().map(|q| q.to_string()).collect(),
    };

    let orchestrator = RagOrchestrator::from_config(config).await?;
    let mut records = Vec::with_capacity(questions.len());
    let mut failures = 0;

    for question in &questions {
        println!("Question: {}", question);
        match orchestrator.answer_question(question).await {
            Ok(record) => {
                println!("Answer: {}", record.answer.trim());
                for (i, source) in record.sources.iter().take(2).enumerate() {
                    println!("Source {}: {}", i + 1, source.text.replace('\n', " ").trim());
                }
                records.push(record);
            }
            Err(e) => {
                warn!(question = %question, error = %e, "question failed");
                println!("Error: {}", e);
                failures += 1;
            }
        }
        println!();
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&records)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("wrote {} answers to {}", records.len(), path.display());
    }

    println!(
        "eval: {} answered, {} failed",
        records.len(),
        failures
    );
    Ok(())
}
