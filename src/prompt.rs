//! Prompt Assembler.
//!
//! Joins retrieved chunk texts (most similar first, newline-separated) into a
//! context block and substitutes it together with the question into an
//! instruction template. Every prompt tells the model to say it lacks enough
//! information when the context does not support an answer: a custom template
//! without that instruction gets [`REFUSAL_INSTRUCTION`] prepended.
//! [`EMPTY_CONTEXT`] makes the no-results case explicit rather than a blank
//! line.

use tracing::warn;

use crate::error::{RagError, Result};

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

/// Context block used when retrieval returned no chunks.
pub const EMPTY_CONTEXT: &str = "(no relevant complaint excerpts were found)";

/// Prepended to custom templates that do not already carry it.
pub const REFUSAL_INSTRUCTION: &str = "If the context doesn't contain the answer, \
state that you don't have enough information. Do not make up an answer.";

const REFUSAL_MARKER: &str = "don't have enough information";

const DEFAULT_TEMPLATE: &str = "\
You are a financial analyst assistant for CrediTrust. Your task is to answer \
questions about customer complaints. Use only the following retrieved complaint \
excerpts to formulate your answer. If the context doesn't contain the answer, \
state that you don't have enough information. Do not make up an answer.

Context: {context}

Question: {question}

Answer:
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// A custom template. Both `{context}` and `{question}` must appear.
    ///
    /// A template that never tells the model to admit missing information
    /// is prefixed with [`REFUSAL_INSTRUCTION`].
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let mut template = template.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !template.contains(slot) {
                return Err(RagError::Config(format!(
                    "prompt template is missing the {} placeholder",
                    slot
                )));
            }
        }
        if !template.to_lowercase().contains(REFUSAL_MARKER) {
            warn!("prompt template has no refusal instruction; prepending it");
            template = format!("{}\n\n{}", REFUSAL_INSTRUCTION, template);
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Build the prompt for `question` over `chunks` in retrieved order.
    ///
    /// Substitution is single-pass: placeholder text appearing inside a
    /// chunk or the question is copied through unchanged.
    pub fn render<S: AsRef<str>>(&self, question: &str, chunks: &[S]) -> String {
        let context = if chunks.is_empty() {
            EMPTY_CONTEXT.to_string()
        } else {
            chunks
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                out.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_SLOT) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}
