//! Natural-language command interpreter
//!
//! Sends one utterance plus a fixed schema description to a language model and
//! returns whatever text comes back. The output is untrusted; `envelope::validate`
//! makes sense of it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::llm::{LlmBackend, LlmError, Message};

const SCHEMA_PROMPT: &str = r#"You turn spoken browser commands into JSON. Reply with a single JSON object and nothing else:
{"command": <name>, "args": {<string keys>: <string values>}, "confirmation": "none" | "required"}

Allowed commands and their args:
- open_tab: {"url": absolute URL to open}
- scroll: {"direction": "up" | "down" | "top" | "bottom", "amount": optional number of screens}
- search_web: {"query": search terms}
- click_ui: {"text": visible label of the element to click}
- summarize: {"text": optional text to summarize; omit to use the selection or page}
- rewrite_selection: {"style": optional style such as "formal", "shorter", "clearer"}

Use "confirmation": "required" only for actions that submit, buy, send or delete.
If the request matches none of these, reply {"command": "noop", "args": {}}."#;

#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    #[error("interpreter unavailable: {0}")]
    Unavailable(String),

    #[error("interpreter failed: {0}")]
    Failed(String),
}

impl From<LlmError> for InterpreterError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Unavailable(m) => InterpreterError::Unavailable(m),
            LlmError::Failed(m) => InterpreterError::Failed(m),
        }
    }
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Raw interpreter output for one utterance
    async fn interpret(&self, utterance: &str) -> Result<String, InterpreterError>;
}

/// Interpreter backed by an OpenAI-compatible chat model
pub struct LlmInterpreter {
    backend: Arc<dyn LlmBackend>,
}

impl LlmInterpreter {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    fn messages(utterance: &str) -> [Message; 2] {
        [Message::system(SCHEMA_PROMPT), Message::user(utterance.trim())]
    }
}

#[async_trait]
impl Interpreter for LlmInterpreter {
    async fn interpret(&self, utterance: &str) -> Result<String, InterpreterError> {
        let raw = self.backend.complete(&Self::messages(utterance)).await?;
        debug!(utterance, raw = %raw, "interpreter_output");
        Ok(raw)
    }
}
