//! The four-phase step model and the persisted position of a framework.

use std::fmt;

/// One of the four phases every state passes through.
///
/// The discriminant order is the execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    /// Non-blocking business logic.
    Processing,
    /// Preparation for the wait, typically starting presentation.
    CommittedPreWait,
    /// Blocking wait for an external condition. Never transactional.
    CommittedWait,
    /// Bookkeeping after the wait completed.
    CommittedPostWait,
}

impl Step {
    /// All steps in execution order.
    pub const ALL: [Step; 4] = [
        Step::Processing,
        Step::CommittedPreWait,
        Step::CommittedWait,
        Step::CommittedPostWait,
    ];

    /// Stable name used in transaction labels and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::CommittedPreWait => "CommittedPreWait",
            Self::CommittedWait => "CommittedWait",
            Self::CommittedPostWait => "CommittedPostWait",
        }
    }

    /// Returns `true` for the three phases of the Committed super-phase.
    pub fn is_committed(self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Wire tag used by the critical-data codec.
    pub fn tag(self) -> u8 {
        match self {
            Self::Processing => 0,
            Self::CommittedPreWait => 1,
            Self::CommittedWait => 2,
            Self::CommittedPostWait => 3,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.tag() == tag)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value a phase body returns to steer the driver.
///
/// Not every control is legal from every phase; see
/// [`resolve`](StepControl::resolve).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StepControl {
    /// Advance to the following phase.
    GoNext,
    /// Leave the state; the driver transitions to the pending next state.
    ExitState,
    /// From Processing, jump straight to CommittedWait.
    SkipToWait,
    /// Run CommittedPreWait again.
    RepeatPreWait,
    /// Return to CommittedPreWait.
    BackToPreWait,
    /// Run CommittedWait again.
    RepeatWait,
    /// Return to CommittedWait.
    BackToWait,
}

/// Result of resolving a [`StepControl`] against the phase that returned it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepTransition {
    /// Stay in the state and continue at this step.
    Advance(Step),
    /// Leave the state.
    Exit,
}

impl StepControl {
    /// Resolve the control returned by `from`.
    ///
    /// Returns `None` when the control is not valid for that phase.
    pub fn resolve(self, from: Step) -> Option<StepTransition> {
        use Step::*;
        use StepTransition::{Advance, Exit};

        match (from, self) {
            (_, StepControl::ExitState) => Some(Exit),
            (Processing, StepControl::GoNext) => Some(Advance(CommittedPreWait)),
            (Processing, StepControl::SkipToWait) => Some(Advance(CommittedWait)),
            (CommittedPreWait, StepControl::GoNext) => Some(Advance(CommittedWait)),
            (CommittedPreWait, StepControl::RepeatPreWait) => Some(Advance(CommittedPreWait)),
            (CommittedWait, StepControl::GoNext) => Some(Advance(CommittedPostWait)),
            (CommittedWait, StepControl::BackToPreWait) => Some(Advance(CommittedPreWait)),
            (CommittedWait, StepControl::RepeatWait) => Some(Advance(CommittedWait)),
            (CommittedPostWait, StepControl::BackToPreWait) => Some(Advance(CommittedPreWait)),
            (CommittedPostWait, StepControl::BackToWait) => Some(Advance(CommittedWait)),
            _ => None,
        }
    }
}

/// Host transaction tier a phase runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TransactionWeight {
    /// No transaction is opened for the phase.
    #[default]
    None,
    /// Lightweight host transaction.
    Light,
    /// Heavyweight host transaction.
    Heavy,
}

impl TransactionWeight {
    /// Returns `true` for `Light` and `Heavy`.
    pub fn is_transactional(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Which state-machine variant the host asked a runner to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameMode {
    /// Live game play.
    Play,
    /// Playback of recorded history.
    History,
    /// Operator utility screens.
    Utility,
}

impl GameMode {
    /// Name used in critical-data keys, e.g. `"Play"` in `PlayMode`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Play => "Play",
            Self::History => "History",
            Self::Utility => "Utility",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted position of a state-machine framework.
///
/// Written to critical data at every durable boundary so that a restart
/// resumes at the recorded step of the recorded state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateInfo {
    /// State currently executing.
    pub current_state: String,
    /// State requested via `set_next_state`, consumed on exit.
    pub pending_state: Option<String>,
    /// Phase that runs on the next tick.
    pub current_step: Step,
}

impl StateInfo {
    /// Position at `step` of `state` with no pending transition.
    pub fn new(state: impl Into<String>, step: Step) -> Self {
        Self {
            current_state: state.into(),
            pending_state: None,
            current_step: step,
        }
    }
}
