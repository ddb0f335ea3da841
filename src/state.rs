//! Wake state machine
//!
//! `step` is the whole transition table as a pure function. `WakeSession`
//! owns the only mutable state in the pipeline (the current state plus the
//! arm deadline) and applies `step` to it; the async shell in `session.rs`
//! just feeds it events and acts on the returned `Effect`.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::hypothesis::select_hypothesis;
use crate::wake::{Sensitivity, WakePhraseSet, strip_after_wake};

/// How long a bare wake word keeps the session armed
pub const DEFAULT_ARM_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakeState {
    #[default]
    Idle,
    /// Wake phrase heard with nothing after it; the next final transcript is
    /// the command.
    Armed,
}

impl fmt::Display for WakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WakeState::Idle => write!(f, "Idle"),
            WakeState::Armed => write!(f, "Armed"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum WakeInput<'a> {
    /// Alternatives of one final transcript, engine rank order
    Final(&'a [&'a str]),
    TimeoutElapsed,
}

/// What the caller should do after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// (Re)start the arm timer
    Arm,
    /// Send this utterance to the interpreter
    Dispatch(String),
    Ignore,
    TimedOut,
}

/// Transition function. No clocks, no I/O.
pub fn step(
    state: WakeState,
    input: WakeInput<'_>,
    phrases: &WakePhraseSet,
    sensitivity: Sensitivity,
) -> (WakeState, Effect) {
    match input {
        WakeInput::TimeoutElapsed => match state {
            WakeState::Armed => (WakeState::Idle, Effect::TimedOut),
            WakeState::Idle => (WakeState::Idle, Effect::Ignore),
        },
        WakeInput::Final(alternatives) => {
            let Some(chosen) = select_hypothesis(alternatives, phrases, sensitivity) else {
                return (state, Effect::Ignore);
            };

            match strip_after_wake(&chosen, phrases, sensitivity) {
                Some(rest) if !rest.is_empty() => (WakeState::Idle, Effect::Dispatch(rest)),
                Some(_) => (WakeState::Armed, Effect::Arm),
                None => match state {
                    WakeState::Armed => {
                        (WakeState::Idle, Effect::Dispatch(chosen.trim().to_string()))
                    }
                    WakeState::Idle => (WakeState::Idle, Effect::Ignore),
                },
            }
        }
    }
}

/// Owned wake session: current state plus the pending arm deadline.
///
/// After every call the deadline is set if and only if the state is `Armed`.
#[derive(Debug, Clone)]
pub struct WakeSession {
    state: WakeState,
    deadline: Option<Instant>,
    phrases: WakePhraseSet,
    sensitivity: Sensitivity,
    arm_timeout: Duration,
}

impl WakeSession {
    pub fn new(phrases: WakePhraseSet, sensitivity: Sensitivity) -> Self {
        Self {
            state: WakeState::Idle,
            deadline: None,
            phrases,
            sensitivity,
            arm_timeout: DEFAULT_ARM_TIMEOUT,
        }
    }

    pub fn with_arm_timeout(mut self, arm_timeout: Duration) -> Self {
        self.arm_timeout = arm_timeout;
        self
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == WakeState::Armed
    }

    /// When the pending arm timer fires, if one is pending
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn phrases(&self) -> &WakePhraseSet {
        &self.phrases
    }

    pub fn sensitivity(&self) -> Sensitivity {
        self.sensitivity
    }

    pub fn arm_timeout(&self) -> Duration {
        self.arm_timeout
    }

    /// Apply one final transcript
    pub fn on_final<S: AsRef<str>>(&mut self, alternatives: &[S], now: Instant) -> Effect {
        let alternatives: Vec<&str> = alternatives.iter().map(AsRef::as_ref).collect();
        let (next, effect) = step(
            self.state,
            WakeInput::Final(&alternatives),
            &self.phrases,
            self.sensitivity,
        );

        match (&effect, next) {
            (Effect::Arm, _) => self.deadline = Some(now + self.arm_timeout),
            (_, WakeState::Idle) => self.deadline = None,
            // blank event while armed: nothing changes
            (_, WakeState::Armed) => {}
        }
        self.transition(next, &effect);
        effect
    }

    /// Apply the arm timer firing at `now`.
    ///
    /// Ignored unless a deadline is pending and has passed, so a timer that
    /// lost the race against a transcript does nothing.
    pub fn on_timeout(&mut self, now: Instant) -> Effect {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return Effect::Ignore,
        }

        let (next, effect) = step(
            self.state,
            WakeInput::TimeoutElapsed,
            &self.phrases,
            self.sensitivity,
        );
        self.deadline = None;
        self.transition(next, &effect);
        effect
    }

    fn transition(&mut self, next: WakeState, effect: &Effect) {
        if next != self.state {
            info!(from = %self.state, to = %next, ?effect, "wake_transition");
        } else {
            debug!(state = %next, ?effect, "wake_step");
        }
        self.state = next;
    }
}
