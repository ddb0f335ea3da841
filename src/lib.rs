//! Voice command front-end: wake phrase detection over noisy transcripts,
//! command interpretation and routing to executors.

pub mod command;
pub mod config;
pub mod context;
pub mod envelope;
pub mod executor;
pub mod fuzzy;
pub mod hypothesis;
pub mod interpreter;
pub mod llm;
pub mod repl;
pub mod session;
pub mod state;
pub mod summarize;
pub mod ui;
pub mod wake;
