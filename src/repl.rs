//! REPL input handling - recognizer results typed or piped on stdin
//!
//! One line per result. Alternatives are separated by ` | `, best first. A
//! leading `~` marks an interim result.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::session::TranscriptEvent;

const ALTERNATIVE_SEPARATOR: &str = " | ";

/// Parse one input line. Blank lines yield nothing.
pub fn parse_line(line: &str) -> Option<TranscriptEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(interim) = line.strip_prefix('~') {
        let text = interim
            .split(ALTERNATIVE_SEPARATOR)
            .next()
            .unwrap_or_default()
            .trim();
        return Some(TranscriptEvent::interim(text));
    }

    Some(TranscriptEvent::final_result(
        line.split(ALTERNATIVE_SEPARATOR).map(str::trim),
    ))
}

/// Forward stdin lines to the session until EOF or the session goes away
pub async fn read_stdin(transcript_tx: flume::Sender<TranscriptEvent>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(event) = parse_line(&line) else {
            continue;
        };
        debug!(?event, "transcript from stdin");
        if transcript_tx.send_async(event).await.is_err() {
            break;
        }
    }

    Ok(())
}
