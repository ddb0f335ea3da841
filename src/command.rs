//! Command routing - turns a validated envelope into exactly one executor call
//!
//! Routing is a fixed table keyed by command name:
//! 1. Page commands (`open_tab`, `scroll`, `search_web`, `click_ui`) go to the
//!    out-of-process page executor
//! 2. Text commands (`summarize`, `rewrite_selection`) run in-process, since
//!    they need the invoking context's selection
//! 3. Anything else is a `Noop`, never an error

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::TextContext;
use crate::envelope::{CommandEnvelope, Confirmation};
use crate::executor::{ExecutorRequest, PageExecutor};
use crate::summarize::{ServiceError, TextService};

/// Style used by `rewrite_selection` when the interpreter gives none
pub const DEFAULT_REWRITE_STYLE: &str = "clearer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Ok,
    Noop,
    Error,
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStatus::Ok => write!(f, "ok"),
            DispatchStatus::Noop => write!(f, "noop"),
            DispatchStatus::Error => write!(f, "error"),
        }
    }
}

/// Uniform result of a dispatch, whichever executor handled it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub detail: BTreeMap<String, String>,
}

impl DispatchResult {
    pub fn ok() -> Self {
        Self {
            status: DispatchStatus::Ok,
            detail: BTreeMap::new(),
        }
    }

    pub fn noop(reason: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Noop,
            detail: BTreeMap::new(),
        }
        .with("reason", reason.into())
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Error,
            detail: BTreeMap::new(),
        }
        .with("reason", reason.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.detail.insert(key.into(), value.to_string());
        self
    }

    pub fn reason(&self) -> Option<&str> {
        self.detail.get("reason").map(String::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.status == DispatchStatus::Ok
    }
}

/// What to do with envelopes the interpreter marked as needing confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationPolicy {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Handled in-process against the invoking context
    Local,
    /// Forwarded to the page executor
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    OpenTab,
    Scroll,
    SearchWeb,
    ClickUi,
    Summarize,
    RewriteSelection,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::OpenTab,
        CommandKind::Scroll,
        CommandKind::SearchWeb,
        CommandKind::ClickUi,
        CommandKind::Summarize,
        CommandKind::RewriteSelection,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::OpenTab => "open_tab",
            CommandKind::Scroll => "scroll",
            CommandKind::SearchWeb => "search_web",
            CommandKind::ClickUi => "click_ui",
            CommandKind::Summarize => "summarize",
            CommandKind::RewriteSelection => "rewrite_selection",
        }
    }

    /// Case-insensitive lookup in the routing table
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn route(self) -> Route {
        match self {
            CommandKind::Summarize | CommandKind::RewriteSelection => Route::Local,
            CommandKind::OpenTab
            | CommandKind::Scroll
            | CommandKind::SearchWeb
            | CommandKind::ClickUi => Route::Page,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl ScrollDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Top => "top",
            ScrollDirection::Bottom => "bottom",
        }
    }
}

impl FromStr for ScrollDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "top" | "start" => Ok(ScrollDirection::Top),
            "bottom" | "end" => Ok(ScrollDirection::Bottom),
            _ => Err(()),
        }
    }
}

/// A recognized command with its required fields present
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenTab { url: String },
    Scroll { direction: ScrollDirection, amount: Option<u32> },
    SearchWeb { query: String },
    ClickUi { text: String },
    Summarize { text: Option<String> },
    RewriteSelection { style: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("unrecognized command '{0}'")]
    Unrecognized(String),

    #[error("{command}: {reason}")]
    Invalid {
        command: &'static str,
        reason: &'static str,
    },
}

impl Command {
    pub fn from_envelope(envelope: &CommandEnvelope) -> Result<Self, CommandParseError> {
        let kind = CommandKind::from_name(&envelope.name)
            .ok_or_else(|| CommandParseError::Unrecognized(envelope.name.clone()))?;
        let invalid = |reason| CommandParseError::Invalid {
            command: kind.name(),
            reason,
        };
        let required = |key, reason| {
            envelope
                .arg(key)
                .map(str::to_string)
                .ok_or_else(|| invalid(reason))
        };

        Ok(match kind {
            CommandKind::OpenTab => Command::OpenTab {
                url: required("url", "missing_url")?,
            },
            CommandKind::Scroll => {
                let direction = required("direction", "missing_direction")?
                    .parse()
                    .map_err(|_| invalid("invalid_direction"))?;
                let amount = envelope
                    .arg("amount")
                    .map(|a| a.parse::<u32>().map_err(|_| invalid("invalid_amount")))
                    .transpose()?;
                Command::Scroll { direction, amount }
            }
            CommandKind::SearchWeb => Command::SearchWeb {
                query: required("query", "missing_query")?,
            },
            CommandKind::ClickUi => Command::ClickUi {
                text: required("text", "missing_text")?,
            },
            CommandKind::Summarize => Command::Summarize {
                text: envelope.arg("text").map(str::to_string),
            },
            CommandKind::RewriteSelection => Command::RewriteSelection {
                style: envelope
                    .arg("style")
                    .unwrap_or(DEFAULT_REWRITE_STYLE)
                    .to_string(),
            },
        })
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::OpenTab { .. } => CommandKind::OpenTab,
            Command::Scroll { .. } => CommandKind::Scroll,
            Command::SearchWeb { .. } => CommandKind::SearchWeb,
            Command::ClickUi { .. } => CommandKind::ClickUi,
            Command::Summarize { .. } => CommandKind::Summarize,
            Command::RewriteSelection { .. } => CommandKind::RewriteSelection,
        }
    }

    /// Wire request carrying only this command's own fields
    pub fn to_request(&self) -> ExecutorRequest {
        let mut args = BTreeMap::new();
        match self {
            Command::OpenTab { url } => {
                args.insert("url".to_string(), url.clone());
            }
            Command::Scroll { direction, amount } => {
                args.insert("direction".to_string(), direction.as_str().to_string());
                if let Some(amount) = amount {
                    args.insert("amount".to_string(), amount.to_string());
                }
            }
            Command::SearchWeb { query } => {
                args.insert("query".to_string(), query.clone());
            }
            Command::ClickUi { text } => {
                args.insert("text".to_string(), text.clone());
            }
            Command::Summarize { text } => {
                if let Some(text) = text {
                    args.insert("text".to_string(), text.clone());
                }
            }
            Command::RewriteSelection { style } => {
                args.insert("style".to_string(), style.clone());
            }
        }
        ExecutorRequest {
            command: self.kind().name().to_string(),
            args,
        }
    }
}

/// Routes envelopes to the page executor or the in-process text handlers
pub struct Dispatcher {
    page: Arc<dyn PageExecutor>,
    text: Arc<dyn TextService>,
    context: Arc<dyn TextContext>,
    confirmation: ConfirmationPolicy,
}

impl Dispatcher {
    pub fn new(
        page: Arc<dyn PageExecutor>,
        text: Arc<dyn TextService>,
        context: Arc<dyn TextContext>,
    ) -> Self {
        Self {
            page,
            text,
            context,
            confirmation: ConfirmationPolicy::default(),
        }
    }

    pub fn with_confirmation_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.confirmation = policy;
        self
    }

    /// Dispatch one envelope. Makes at most one executor call and never fails.
    pub async fn dispatch(&self, envelope: &CommandEnvelope) -> DispatchResult {
        if envelope.is_noop() {
            let reason = envelope.note.as_deref().unwrap_or("interpreter_noop");
            return DispatchResult::noop(reason);
        }

        let command = match Command::from_envelope(envelope) {
            Ok(command) => command,
            Err(CommandParseError::Unrecognized(name)) => {
                info!(command = %name, "unrecognized command");
                return DispatchResult::noop("unrecognized_command").with("command", name);
            }
            Err(CommandParseError::Invalid { command, reason }) => {
                warn!(command, reason, "command rejected");
                return DispatchResult::error(reason).with("command", command);
            }
        };

        if envelope.confirmation == Confirmation::Required
            && self.confirmation == ConfirmationPolicy::Deny
        {
            info!(command = command.kind().name(), "confirmation declined by policy");
            return DispatchResult::noop("confirmation_declined")
                .with("command", command.kind().name());
        }

        let name = command.kind().name();
        let result = match command.kind().route() {
            Route::Page => self.run_page(&command).await,
            Route::Local => self.run_local(command).await,
        };
        info!(command = name, status = %result.status, reason = ?result.reason(), "dispatched");

        if result.detail.contains_key("command") {
            result
        } else {
            result.with("command", name)
        }
    }

    async fn run_page(&self, command: &Command) -> DispatchResult {
        match self.page.execute(command.to_request()).await {
            Ok(reply) => reply.into_result(),
            Err(e) => {
                warn!(error = %e, "page executor failed");
                DispatchResult::error("executor_unavailable").with("message", e)
            }
        }
    }

    async fn run_local(&self, command: Command) -> DispatchResult {
        match command {
            Command::Summarize { text } => self.summarize(text).await,
            Command::RewriteSelection { style } => self.rewrite_selection(&style).await,
            other => DispatchResult::error("not_a_local_command").with("command", other.kind().name()),
        }
    }

    async fn summarize(&self, text: Option<String>) -> DispatchResult {
        let (source, text) = if let Some(text) = text {
            ("argument", text)
        } else if let Some(selection) = non_blank(self.context.selection().await) {
            ("selection", selection)
        } else if let Some(page) = non_blank(self.context.page_text().await) {
            ("page", page)
        } else {
            return DispatchResult::error("no_text");
        };

        match self.text.summarize(&text).await {
            Ok(summary) => DispatchResult::ok()
                .with("source", source)
                .with("chars", text.chars().count())
                .with("summary", summary),
            Err(ServiceError::Unavailable(message)) => {
                DispatchResult::error("summarizer_unavailable").with("message", message)
            }
            Err(e) => DispatchResult::error("summarizer_failed").with("message", e),
        }
    }

    async fn rewrite_selection(&self, style: &str) -> DispatchResult {
        let Some(selection) = non_blank(self.context.selection().await) else {
            return DispatchResult::error("no_selection");
        };

        let rewritten = match self.text.rewrite(&selection, style).await {
            Ok(rewritten) => rewritten,
            Err(ServiceError::Unavailable(message)) => {
                return DispatchResult::error("rewriter_unavailable").with("message", message);
            }
            Err(e) => return DispatchResult::error("rewriter_failed").with("message", e),
        };

        match self.context.replace_selection(&rewritten).await {
            Ok(()) => DispatchResult::ok()
                .with("style", style)
                .with("original_chars", selection.chars().count())
                .with("rewritten_chars", rewritten.chars().count()),
            Err(e) => DispatchResult::error(e.reason()).with("message", e),
        }
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
