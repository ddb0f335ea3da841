//! Validation of interpreter output into a dispatchable command envelope
//!
//! The interpreter is a language model asked for JSON. It usually complies,
//! sometimes wraps the JSON in a markdown fence or a sentence, and sometimes
//! answers in prose. Whatever comes back, `validate` returns an envelope:
//! either the parsed command or the `noop` sentinel with the reason attached.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Name of the sentinel envelope produced for unusable interpreter output
pub const NOOP_COMMAND: &str = "noop";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    #[default]
    None,
    Required,
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confirmation::None => write!(f, "none"),
            Confirmation::Required => write!(f, "required"),
        }
    }
}

/// A structurally valid command, ready for routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEnvelope {
    pub name: String,
    pub args: BTreeMap<String, String>,
    pub confirmation: Confirmation,
    /// Why this is a `noop` sentinel, when it is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CommandEnvelope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
            confirmation: Confirmation::None,
            note: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// The sentinel for output that could not be parsed
    pub fn noop(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Self::new(NOOP_COMMAND)
        }
    }

    pub fn is_noop(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case(NOOP_COMMAND)
    }

    /// Argument value, `None` when absent or blank
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("interpreter output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("interpreter output has an empty command name")]
    EmptyCommand,

    #[error("unsupported confirmation value: {0}")]
    Confirmation(String),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(alias = "name")]
    command: String,
    #[serde(default)]
    args: Option<Map<String, Value>>,
    #[serde(default)]
    confirmation: Value,
}

/// Turn raw interpreter output into an envelope. Never fails.
#[must_use]
pub fn validate(raw: &str) -> CommandEnvelope {
    let body = extract_json_block(raw);

    match parse_envelope(body) {
        Ok(envelope) => {
            debug!(command = %envelope.name, args = envelope.args.len(), "envelope_parsed");
            envelope
        }
        Err(e) => {
            warn!(error = %e, "interpreter output rejected");
            CommandEnvelope::noop(e.to_string())
        }
    }
}

fn parse_envelope(body: &str) -> Result<CommandEnvelope, EnvelopeError> {
    let raw: RawEnvelope = serde_json::from_str(body)?;

    let name = raw.command.trim();
    if name.is_empty() {
        return Err(EnvelopeError::EmptyCommand);
    }

    let args = raw
        .args
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| stringify_arg(value).map(|v| (key, v)))
        .collect();

    Ok(CommandEnvelope {
        name: name.to_string(),
        args,
        confirmation: parse_confirmation(&raw.confirmation)?,
        note: None,
    })
}

fn stringify_arg(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

fn parse_confirmation(value: &Value) -> Result<Confirmation, EnvelopeError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(Confirmation::None),
        Value::Bool(true) => Ok(Confirmation::Required),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" | "none" | "no" => Ok(Confirmation::None),
            "required" | "yes" => Ok(Confirmation::Required),
            other => Err(EnvelopeError::Confirmation(other.to_string())),
        },
        other => Err(EnvelopeError::Confirmation(other.to_string())),
    }
}

/// Extract the JSON body from a possibly fenced or chatty response.
fn extract_json_block(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = &after_fence[..end];
            // drop the info string, whatever language tag it names
            let body = match block.split_once('\n') {
                Some((info, rest)) if !info.trim_start().starts_with('{') => rest,
                _ => block,
            };
            return body.trim();
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
