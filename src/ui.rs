use std::io::Write;

use crate::command::{DispatchResult, DispatchStatus};
use crate::envelope::CommandEnvelope;
use crate::session::SessionEvent;

pub fn clear_line() {
    print!("\r\x1b[K");
    std::io::stdout().flush().ok();
}

pub fn show_preview(text: &str) {
    print!("\r\x1b[K\x1b[90m{}\x1b[0m", text);
    std::io::stdout().flush().ok();
}

/// Print one session event
pub fn render(event: &SessionEvent) {
    match event {
        SessionEvent::Preview(text) => show_preview(text),
        other => {
            clear_line();
            println!("{}", describe(other));
        }
    }
}

/// One-line, colored description of a session event
pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Preview(text) => format!("\x1b[90m{text}\x1b[0m"),
        SessionEvent::Armed { timeout } => {
            format!("\x1b[33m● listening ({}s)\x1b[0m", timeout.as_secs())
        }
        SessionEvent::Ignored => "\x1b[90m· no wake phrase\x1b[0m".to_string(),
        SessionEvent::TimedOut => "\x1b[90m○ wake timed out\x1b[0m".to_string(),
        SessionEvent::Dispatching(utterance) => format!("\x1b[36m→ {utterance}\x1b[0m"),
        SessionEvent::Interpreted(envelope) => format!("  {}", envelope_line(envelope)),
        SessionEvent::Result(result) => result_line(result),
        SessionEvent::InterpreterUnavailable(message) => {
            format!("\x1b[31m! interpreter unavailable: {message}\x1b[0m")
        }
        SessionEvent::InterpreterFailed(message) => {
            format!("\x1b[31m! interpreter failed: {message}\x1b[0m")
        }
    }
}

pub fn envelope_line(envelope: &CommandEnvelope) -> String {
    let args: Vec<String> = envelope
        .args
        .iter()
        .map(|(k, v)| format!("{k}={v:?}"))
        .collect();
    let mut line = format!("{}({})", envelope.name, args.join(", "));
    if let Some(note) = &envelope.note {
        line.push_str(&format!(" [{note}]"));
    }
    line
}

pub fn result_line(result: &DispatchResult) -> String {
    let color = match result.status {
        DispatchStatus::Ok => "32",
        DispatchStatus::Noop => "90",
        DispatchStatus::Error => "31",
    };
    let detail: Vec<String> = result
        .detail
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect();
    format!("\x1b[{color}m{}\x1b[0m {}", result.status, detail.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_envelope_line() {
        let envelope = CommandEnvelope::new("open_tab").with_arg("url", "https://example.com");
        assert_eq!(envelope_line(&envelope), "open_tab(url=\"https://example.com\")");
        assert_eq!(envelope_line(&CommandEnvelope::noop("bad")), "noop() [bad]");
    }

    #[test]
    fn test_describe() {
        let line = describe(&SessionEvent::Armed {
            timeout: Duration::from_secs(5),
        });
        assert!(line.contains("listening (5s)"));
        assert!(describe(&SessionEvent::Ignored).contains("no wake phrase"));

        let line = describe(&SessionEvent::Result(
            DispatchResult::error("missing_text").with("command", "click_ui"),
        ));
        assert!(line.contains("error"));
        assert!(line.contains("command: click_ui, reason: missing_text"));
    }
}
