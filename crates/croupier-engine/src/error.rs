//! Fatal engine errors.
//!
//! Every variant terminates the owning runner thread; the thread's join
//! result carries it to whoever supervises the runner. Transaction
//! contention is not an error and never appears here.

use croupier_core::{CoplayerId, GameMode, ResourceError, Step, StepControl};
use croupier_history::{CodecError, HistoryError};

use crate::config::ConfigError;

/// Errors raised by the framework driver, runners and coplayer pool.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    // ── Configuration ──────────────────────────────────────────────
    /// Invalid runner or shell configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The state machine declares no initial state, or names one it lacks.
    #[error("state machine '{machine}' has no initial state")]
    NoInitialState {
        /// State machine name.
        machine: String,
    },
    /// Two states share a name.
    #[error("state '{state}' is registered twice in '{machine}'")]
    DuplicateState {
        /// State machine name.
        machine: String,
        /// Duplicated state name.
        state: String,
    },
    /// No service-request data is registered for a theme.
    #[error("no service request data registered for theme '{theme}'")]
    MissingServiceRequestData {
        /// Theme name.
        theme: String,
    },
    /// No configurator can build a state machine for the target.
    #[error("no game configurator registered for '{target}'")]
    NoGameConfigurator {
        /// Theme name, or `"shell"`.
        target: String,
    },

    // ── Protocol violations ────────────────────────────────────────
    /// A state exited without calling `set_next_state`.
    #[error("state '{state}' exited without setting a next state")]
    NoNextState {
        /// State that exited.
        state: String,
    },
    /// A state name is not part of the running state machine.
    #[error("state '{state}' is not part of the state machine")]
    UnknownState {
        /// Unknown state name.
        state: String,
    },
    /// A phase returned a control that is not legal for that phase.
    #[error("state '{state}' returned {control:?} from {step}")]
    InvalidStepControl {
        /// State that returned the control.
        state: String,
        /// Phase that returned it.
        step: Step,
        /// Offending control.
        control: StepControl,
    },
    /// An execution-only API was called from CommittedWait.
    #[error("state '{state}' called execution-only '{api}' from CommittedWait")]
    ExecutionOnlyApi {
        /// Offending state.
        state: String,
        /// API name.
        api: &'static str,
    },
    /// A wait-only API was called outside CommittedWait.
    #[error("state '{state}' called wait-only '{api}' outside CommittedWait")]
    WaitOnlyApi {
        /// Offending state.
        state: String,
        /// API name.
        api: &'static str,
    },
    /// An API that must run inside a heavy transaction was called outside one.
    #[error("state '{state}' called '{api}' outside a heavy transaction")]
    HeavyTransactionRequired {
        /// Offending state.
        state: String,
        /// API name.
        api: &'static str,
    },
    /// The host activated a mode this runtime cannot run.
    #[error("game mode {mode} is not supported")]
    UnsupportedGameMode {
        /// Requested mode.
        mode: GameMode,
    },

    // ── Coplayer pool ──────────────────────────────────────────────
    /// No coplayer runs in the given slot.
    #[error("coplayer {id} is not running")]
    UnknownCoplayer {
        /// Slot id.
        id: CoplayerId,
    },
    /// The pool is full.
    #[error("coplayer limit of {max} reached")]
    CoplayerLimit {
        /// Configured maximum.
        max: usize,
    },

    // ── Threads ────────────────────────────────────────────────────
    /// A runner thread could not be spawned.
    #[error("failed to spawn runner thread '{name}': {reason}")]
    ThreadSpawnFailed {
        /// Runner name.
        name: String,
        /// OS error description.
        reason: String,
    },
    /// A runner thread panicked.
    #[error("runner thread '{name}' panicked")]
    RunnerPanicked {
        /// Runner name.
        name: String,
    },

    // ── Wrapped ────────────────────────────────────────────────────
    /// Host resource failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// History subsystem failure.
    #[error(transparent)]
    History(#[from] HistoryError),
    /// Persisted framework state could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
