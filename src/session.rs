//! Voice session - the async shell around the wake state machine
//!
//! One task owns the `WakeSession` and selects over incoming transcripts and
//! the arm deadline. Dispatch is awaited inline, so transcripts that arrive
//! while a command is in flight wait in the channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::command::{DispatchResult, Dispatcher};
use crate::envelope::{CommandEnvelope, validate};
use crate::interpreter::{Interpreter, InterpreterError};
use crate::state::{Effect, WakeSession, WakeState};

/// One recognizer alternative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypothesis {
    pub text: String,
    pub is_final: bool,
}

/// One recognizer result: alternatives for the same stretch of audio, best
/// first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub hypotheses: Vec<Hypothesis>,
}

impl TranscriptEvent {
    pub fn final_result<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hypotheses: alternatives
                .into_iter()
                .map(|text| Hypothesis {
                    text: text.into(),
                    is_final: true,
                })
                .collect(),
        }
    }

    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            hypotheses: vec![Hypothesis {
                text: text.into(),
                is_final: false,
            }],
        }
    }

    /// Final when the top-ranked alternative is
    pub fn is_final(&self) -> bool {
        self.hypotheses.first().is_some_and(|h| h.is_final)
    }

    pub fn texts(&self) -> Vec<&str> {
        self.hypotheses.iter().map(|h| h.text.as_str()).collect()
    }
}

/// What the session reports upward
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Interim transcript, display only
    Preview(String),
    Armed { timeout: Duration },
    /// Final result that neither armed nor dispatched
    Ignored,
    TimedOut,
    /// Utterance sent to the interpreter
    Dispatching(String),
    Interpreted(CommandEnvelope),
    Result(DispatchResult),
    InterpreterUnavailable(String),
    InterpreterFailed(String),
}

pub struct VoiceSession {
    wake: WakeSession,
    interpreter: Arc<dyn Interpreter>,
    dispatcher: Dispatcher,
    event_tx: flume::Sender<SessionEvent>,
}

impl VoiceSession {
    pub fn new(
        wake: WakeSession,
        interpreter: Arc<dyn Interpreter>,
        dispatcher: Dispatcher,
        event_tx: flume::Sender<SessionEvent>,
    ) -> Self {
        Self {
            wake,
            interpreter,
            dispatcher,
            event_tx,
        }
    }

    pub fn state(&self) -> WakeState {
        self.wake.state()
    }

    /// Run until the transcript channel closes. Returns the final wake state.
    pub async fn run(mut self, transcript_rx: flume::Receiver<TranscriptEvent>) -> WakeState {
        info!(timeout_secs = self.wake.arm_timeout().as_secs(), "voice session started");

        loop {
            let deadline = self.wake.deadline();
            let timeout_fut = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                received = transcript_rx.recv_async() => {
                    let Ok(event) = received else {
                        break;
                    };
                    self.on_transcript(event).await;
                }

                _ = timeout_fut, if deadline.is_some() => {
                    if self.wake.on_timeout(Instant::now()) == Effect::TimedOut {
                        self.emit(SessionEvent::TimedOut);
                    }
                }
            }
        }

        info!(state = %self.wake.state(), "voice session ended");
        self.wake.state()
    }

    async fn on_transcript(&mut self, event: TranscriptEvent) {
        if !event.is_final() {
            if let Some(top) = event.hypotheses.first() {
                self.emit(SessionEvent::Preview(top.text.clone()));
            }
            return;
        }

        let effect = self.wake.on_final(event.texts().as_slice(), Instant::now());
        match effect {
            Effect::Arm => self.emit(SessionEvent::Armed {
                timeout: self.wake.arm_timeout(),
            }),
            Effect::Dispatch(utterance) => self.handle_utterance(utterance).await,
            Effect::Ignore => {
                debug!("no wake phrase, ignored");
                self.emit(SessionEvent::Ignored);
            }
            Effect::TimedOut => self.emit(SessionEvent::TimedOut),
        }
    }

    async fn handle_utterance(&mut self, utterance: String) {
        info!(utterance = %utterance, "dispatching utterance");
        self.emit(SessionEvent::Dispatching(utterance.clone()));

        let raw = match self.interpreter.interpret(&utterance).await {
            Ok(raw) => raw,
            Err(InterpreterError::Unavailable(message)) => {
                warn!(error = %message, "interpreter unavailable");
                self.emit(SessionEvent::InterpreterUnavailable(message));
                return;
            }
            Err(e) => {
                warn!(error = %e, "interpreter failed");
                self.emit(SessionEvent::InterpreterFailed(e.to_string()));
                return;
            }
        };

        let envelope = validate(&raw);
        self.emit(SessionEvent::Interpreted(envelope.clone()));

        let result = self.dispatcher.dispatch(&envelope).await;
        self.emit(SessionEvent::Result(result));
    }

    fn emit(&self, event: SessionEvent) {
        // nobody listening is fine
        let _ = self.event_tx.send(event);
    }
}
