//! End-to-end session tests on a paused tokio clock

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use catcall::command::{DispatchStatus, Dispatcher};
use catcall::context::StaticContext;
use catcall::executor::{ExecutorError, ExecutorReply, ExecutorRequest, PageExecutor};
use catcall::interpreter::{Interpreter, InterpreterError};
use catcall::session::{SessionEvent, TranscriptEvent, VoiceSession};
use catcall::state::{WakeSession, WakeState};
use catcall::summarize::{ServiceError, TextService};
use catcall::wake::{Sensitivity, WakePhraseSet};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Maps utterances to canned interpreter output; anything else is prose
struct ScriptedInterpreter {
    replies: HashMap<&'static str, &'static str>,
    available: bool,
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn interpret(&self, utterance: &str) -> Result<String, InterpreterError> {
        if !self.available {
            return Err(InterpreterError::Unavailable("model not loaded".into()));
        }
        Ok(self
            .replies
            .get(utterance)
            .copied()
            .unwrap_or("Sorry, I can't do that.")
            .to_string())
    }
}

#[derive(Default)]
struct RecordingExecutor {
    requests: Mutex<Vec<ExecutorRequest>>,
}

#[async_trait]
impl PageExecutor for RecordingExecutor {
    async fn execute(&self, request: ExecutorRequest) -> Result<ExecutorReply, ExecutorError> {
        self.requests.lock().unwrap().push(request);
        Ok(serde_json::from_str(r#"{"status":"ok"}"#).unwrap())
    }
}

struct NoText;

#[async_trait]
impl TextService for NoText {
    async fn summarize(&self, _text: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("no model".into()))
    }

    async fn rewrite(&self, _text: &str, _style: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable("no model".into()))
    }
}

struct Harness {
    transcript_tx: flume::Sender<TranscriptEvent>,
    event_rx: flume::Receiver<SessionEvent>,
    executor: Arc<RecordingExecutor>,
    handle: JoinHandle<WakeState>,
}

impl Harness {
    fn start(available: bool) -> Self {
        let interpreter = ScriptedInterpreter {
            replies: HashMap::from([
                (
                    "open the site",
                    "```json\n{\"command\":\"open_tab\",\"args\":{\"url\":\"https://example.com\"},\"confirmation\":\"none\"}\n```",
                ),
                (
                    "scroll down please",
                    r#"{"command": "scroll", "args": {"direction": "down"}}"#,
                ),
                ("click it", r#"{"command": "click_ui", "args": {}}"#),
            ]),
            available,
        };
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = Dispatcher::new(
            executor.clone(),
            Arc::new(NoText),
            Arc::new(StaticContext::default()),
        );

        let (transcript_tx, transcript_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        let session = VoiceSession::new(
            WakeSession::new(WakePhraseSet::english(), Sensitivity::Default),
            Arc::new(interpreter),
            dispatcher,
            event_tx,
        );
        let handle = tokio::spawn(session.run(transcript_rx));

        Self {
            transcript_tx,
            event_rx,
            executor,
            handle,
        }
    }

    fn say(&self, line: &str) {
        let alternatives: Vec<&str> = line.split(" | ").collect();
        self.transcript_tx
            .send(TranscriptEvent::final_result(alternatives))
            .unwrap();
    }

    async fn next(&self) -> SessionEvent {
        self.event_rx.recv_async().await.unwrap()
    }

    /// Close input and collect whatever the session still emits
    async fn finish(self) -> (WakeState, Vec<SessionEvent>, Vec<ExecutorRequest>) {
        drop(self.transcript_tx);
        let state = self.handle.await.unwrap();
        let rest = self.event_rx.drain().collect();
        let requests = self.executor.requests.lock().unwrap().clone();
        (state, rest, requests)
    }
}

#[tokio::test(start_paused = true)]
async fn bare_wake_times_out_after_five_seconds() {
    let harness = Harness::start(true);
    let start = Instant::now();

    harness.say("lazy cut");
    assert_eq!(
        harness.next().await,
        SessionEvent::Armed {
            timeout: Duration::from_secs(5)
        }
    );
    assert_eq!(harness.next().await, SessionEvent::TimedOut);
    assert!(start.elapsed() >= Duration::from_secs(5));

    // back to idle: a command without the wake phrase is ignored
    harness.say("scroll down please");
    let (state, rest, requests) = harness.finish().await;
    assert_eq!(state, WakeState::Idle);
    assert_eq!(rest, vec![SessionEvent::Ignored]);
    assert!(requests.is_empty());
}

#[tokio::test(start_paused = true)]
async fn command_within_window_dispatches_and_cancels_timer() {
    let harness = Harness::start(true);

    harness.say("hey cat");
    assert!(matches!(harness.next().await, SessionEvent::Armed { .. }));

    tokio::time::sleep(Duration::from_secs(3)).await;
    harness.say("scroll down please");

    assert_eq!(
        harness.next().await,
        SessionEvent::Dispatching("scroll down please".into())
    );
    assert!(matches!(harness.next().await, SessionEvent::Interpreted(e) if e.name == "scroll"));
    let SessionEvent::Result(result) = harness.next().await else {
        panic!("expected a dispatch result");
    };
    assert_eq!(result.status, DispatchStatus::Ok);

    // well past the original deadline
    tokio::time::sleep(Duration::from_secs(10)).await;

    let (state, rest, requests) = harness.finish().await;
    assert_eq!(state, WakeState::Idle);
    assert!(!rest.contains(&SessionEvent::TimedOut), "{rest:?}");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].args["direction"], "down");
}

#[tokio::test(start_paused = true)]
async fn rearm_pushes_deadline_out() {
    let harness = Harness::start(true);
    let start = Instant::now();

    harness.say("hey cat");
    assert!(matches!(harness.next().await, SessionEvent::Armed { .. }));
    tokio::time::sleep(Duration::from_secs(4)).await;

    harness.say("hey kat");
    assert!(matches!(harness.next().await, SessionEvent::Armed { .. }));
    assert_eq!(harness.next().await, SessionEvent::TimedOut);
    assert!(start.elapsed() >= Duration::from_secs(9));

    harness.finish().await;
}

#[tokio::test(start_paused = true)]
async fn wake_with_command_uses_best_alternative() {
    let harness = Harness::start(true);

    harness.say("hey cat open the site | hey cut open the site");
    assert_eq!(
        harness.next().await,
        SessionEvent::Dispatching("open the site".into())
    );
    let SessionEvent::Interpreted(envelope) = harness.next().await else {
        panic!("expected an envelope");
    };
    assert_eq!(envelope.name, "open_tab");
    assert_eq!(envelope.arg("url"), Some("https://example.com"));

    let (state, _, requests) = harness.finish().await;
    assert_eq!(state, WakeState::Idle);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].command, "open_tab");
}

#[tokio::test(start_paused = true)]
async fn prose_from_interpreter_is_noop() {
    let harness = Harness::start(true);

    harness.say("hey cat order me a pizza");
    assert!(matches!(harness.next().await, SessionEvent::Dispatching(_)));
    let SessionEvent::Interpreted(envelope) = harness.next().await else {
        panic!("expected an envelope");
    };
    assert!(envelope.is_noop());
    let SessionEvent::Result(result) = harness.next().await else {
        panic!("expected a dispatch result");
    };
    assert_eq!(result.status, DispatchStatus::Noop);

    let (_, _, requests) = harness.finish().await;
    assert!(requests.is_empty());
}

#[tokio::test(start_paused = true)]
async fn click_without_text_reports_missing_text() {
    let harness = Harness::start(true);

    harness.say("hey cat click it");
    harness.next().await;
    harness.next().await;
    let SessionEvent::Result(result) = harness.next().await else {
        panic!("expected a dispatch result");
    };
    assert_eq!(result.status, DispatchStatus::Error);
    assert_eq!(result.reason(), Some("missing_text"));

    let (_, _, requests) = harness.finish().await;
    assert!(requests.is_empty());
}

#[tokio::test(start_paused = true)]
async fn interpreter_unavailable_returns_to_idle() {
    let harness = Harness::start(false);

    harness.say("hey cat");
    harness.next().await;
    harness.say("open the site");

    assert!(matches!(harness.next().await, SessionEvent::Dispatching(_)));
    assert!(matches!(
        harness.next().await,
        SessionEvent::InterpreterUnavailable(_)
    ));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let (state, rest, requests) = harness.finish().await;
    assert_eq!(state, WakeState::Idle);
    assert!(rest.is_empty(), "{rest:?}");
    assert!(requests.is_empty());
}

#[tokio::test(start_paused = true)]
async fn interim_results_only_preview() {
    let harness = Harness::start(true);

    harness
        .transcript_tx
        .send(TranscriptEvent::interim("hey cat open"))
        .unwrap();
    assert_eq!(
        harness.next().await,
        SessionEvent::Preview("hey cat open".into())
    );

    let (state, rest, requests) = harness.finish().await;
    assert_eq!(state, WakeState::Idle);
    assert!(rest.is_empty());
    assert!(requests.is_empty());
}
