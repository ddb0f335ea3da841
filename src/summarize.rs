//! Summarize and rewrite - the in-process text commands
//!
//! Short text goes to the model in one pass. Longer text is split into
//! overlapping chunks, each chunk summarized, and the partial summaries
//! combined in a final pass.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::llm::{LlmBackend, LlmError, Message};

const CHUNK_OVERLAP: usize = 100;
/// Tokens kept free for the prompt and the answer
const PROMPT_RESERVE: usize = 300;

const SUMMARIZE_SYSTEM: &str = "You summarize web page text concisely. Focus on the key points. Answer with the summary only.";

const CHUNK_SYSTEM: &str = "You are an expert summarizer.";
const CHUNK_PROMPT: &str = "Provide a concise but comprehensive summary of the following text chunk. Keep every key point and named entity.\n\n";

const COMBINE_SYSTEM: &str = "You are an expert at synthesizing summaries.";
const COMBINE_PROMPT: &str = "The following are consecutive summaries of one document. Combine them into a single coherent summary that keeps the important details.\n\n";

const REWRITE_SYSTEM: &str = "You rewrite text in a requested style. Keep the meaning and the language of the original. Answer with the rewritten text only, no preamble or quotes.";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("text service unavailable: {0}")]
    Unavailable(String),

    #[error("text service failed: {0}")]
    Failed(String),
}

impl From<LlmError> for ServiceError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Unavailable(m) => ServiceError::Unavailable(m),
            LlmError::Failed(m) => ServiceError::Failed(m),
        }
    }
}

#[async_trait]
pub trait TextService: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, ServiceError>;
    async fn rewrite(&self, text: &str, style: &str) -> Result<String, ServiceError>;
}

pub struct LlmTextService {
    backend: Arc<dyn LlmBackend>,
    ctx_size: usize,
}

impl LlmTextService {
    pub fn new(backend: Arc<dyn LlmBackend>, ctx_size: usize) -> Self {
        Self { backend, ctx_size }
    }

    async fn ask(&self, system: &str, prompt: String) -> Result<String, ServiceError> {
        let messages = [Message::system(system), Message::user(prompt)];
        let answer = self.backend.complete(&messages).await?;
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl TextService for LlmTextService {
    async fn summarize(&self, text: &str) -> Result<String, ServiceError> {
        let total_tokens = rough_token_count(text);
        let budget = self.ctx_size.saturating_sub(PROMPT_RESERVE).max(1);

        if total_tokens < budget {
            debug!(total_tokens, "single-pass summary");
            return self
                .ask(SUMMARIZE_SYSTEM, format!("Summarize this text:\n\n{text}"))
                .await;
        }

        let chunks = chunk_text(text, budget, CHUNK_OVERLAP.min(budget / 4));
        info!(total_tokens, chunks = chunks.len(), "chunked summary");

        let mut partials = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            debug!(chunk = i + 1, of = chunks.len(), "summarizing chunk");
            partials.push(self.ask(CHUNK_SYSTEM, format!("{CHUNK_PROMPT}{chunk}")).await?);
        }

        let combined = partials.join("\n---\n");
        self.ask(COMBINE_SYSTEM, format!("{COMBINE_PROMPT}{combined}"))
            .await
    }

    async fn rewrite(&self, text: &str, style: &str) -> Result<String, ServiceError> {
        let rewritten = self
            .ask(
                REWRITE_SYSTEM,
                format!("Rewrite the following text to be {style}:\n\n{text}"),
            )
            .await?;
        if rewritten.is_empty() {
            return Err(ServiceError::Failed("empty rewrite".into()));
        }
        Ok(rewritten)
    }
}

/// Rough token count estimation (~0.35 tokens per char)
fn rough_token_count(s: &str) -> usize {
    (s.chars().count() as f64 * 0.35).ceil() as usize
}

/// Chunk text with overlap, breaking at sentence/word boundaries
fn chunk_text(text: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    if text.is_empty() || chunk_size_tokens == 0 {
        return vec![];
    }

    let chars_per_token = 1.0 / 0.35;
    let chunk_size_chars = (chunk_size_tokens as f64 * chars_per_token).ceil() as usize;
    let overlap_chars = (overlap_tokens as f64 * chars_per_token).ceil() as usize;

    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();

    if total_chars <= chunk_size_chars {
        return vec![text.to_string()];
    }

    let byte_at = |char_idx: usize| -> usize { chars[..char_idx].iter().map(|c| c.len_utf8()).sum() };

    let mut chunks = Vec::new();
    let mut start_char = 0;
    let step = chunk_size_chars.saturating_sub(overlap_chars).max(1);

    while start_char < total_chars {
        let end_char = (start_char + chunk_size_chars).min(total_chars);
        let start_byte = byte_at(start_char);
        let mut end_byte = byte_at(end_char);

        // Break at sentence or word boundary
        if end_char < total_chars {
            let slice = &text[start_byte..end_byte];
            if let Some(pos) = slice.rfind(". ") {
                end_byte = start_byte + pos + 2;
            } else if let Some(pos) = slice.rfind(' ') {
                end_byte = start_byte + pos + 1;
            }
        }

        chunks.push(text[start_byte..end_byte].to_string());

        if end_char >= total_chars {
            break;
        }
        start_char += step;
    }

    chunks
}
