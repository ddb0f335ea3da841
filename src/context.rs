//! The invoking context: what the user has selected and what page they're on

use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("no editable selection to replace")]
    NoFocusedField,

    #[error("context rejected the replacement: {0}")]
    Rejected(String),
}

impl ContextError {
    /// Short machine-readable reason for dispatch results
    pub fn reason(&self) -> &'static str {
        match self {
            ContextError::NoFocusedField => "no_focused_field",
            ContextError::Rejected(_) => "replace_rejected",
        }
    }
}

#[async_trait]
pub trait TextContext: Send + Sync {
    async fn selection(&self) -> Option<String>;
    async fn page_text(&self) -> Option<String>;
    async fn replace_selection(&self, text: &str) -> Result<(), ContextError>;
}

/// Fixed page text and an in-memory selection
#[derive(Debug, Default)]
pub struct StaticContext {
    selection: Mutex<Option<String>>,
    page_text: Option<String>,
}

impl StaticContext {
    pub fn new(selection: Option<String>, page_text: Option<String>) -> Self {
        Self {
            selection: Mutex::new(selection),
            page_text,
        }
    }
}

#[async_trait]
impl TextContext for StaticContext {
    async fn selection(&self) -> Option<String> {
        self.selection.lock().await.clone()
    }

    async fn page_text(&self) -> Option<String> {
        self.page_text.clone()
    }

    async fn replace_selection(&self, text: &str) -> Result<(), ContextError> {
        let mut selection = self.selection.lock().await;
        match selection.as_mut() {
            Some(current) => {
                *current = text.to_string();
                Ok(())
            }
            None => Err(ContextError::NoFocusedField),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_selection() {
        let context = StaticContext::new(Some("old".into()), Some("page".into()));
        context.replace_selection("new").await.unwrap();
        assert_eq!(context.selection().await.as_deref(), Some("new"));
        assert_eq!(context.page_text().await.as_deref(), Some("page"));
    }

    #[tokio::test]
    async fn test_replace_without_selection() {
        let context = StaticContext::default();
        let err = context.replace_selection("new").await.unwrap_err();
        assert_eq!(err, ContextError::NoFocusedField);
        assert_eq!(err.reason(), "no_focused_field");
    }
}
