//! Pluggable game states and the state machine that holds them.
//!
//! Every state runs the same four phases in order:
//!
//! | phase | default weight | legal controls |
//! |---|---|---|
//! | Processing | Heavy | `GoNext`, `ExitState`, `SkipToWait` |
//! | CommittedPreWait | Heavy | `GoNext`, `ExitState`, `RepeatPreWait` |
//! | CommittedWait | never transactional | `GoNext`, `ExitState`, `BackToPreWait`, `RepeatWait` |
//! | CommittedPostWait | Heavy | `ExitState`, `BackToPreWait`, `BackToWait` |
//!
//! States are generic over `C`, the phase-execution context the runner
//! supplies (shell or coplayer services).

use indexmap::IndexMap;

use croupier_core::{Step, StepControl, TransactionWeight};

use crate::context::{PhaseContext, PhaseServices};
use crate::error::FrameworkError;

/// One state of a game state machine.
pub trait GameState<C: PhaseServices> {
    /// Unique state name.
    fn name(&self) -> &str;

    /// Step the state starts at after a transition into it.
    fn initial_step(&self) -> Step {
        Step::Processing
    }

    /// Transaction the framework opens around `step`.
    ///
    /// Ignored for [`Step::CommittedWait`], which never runs inside a
    /// framework-opened transaction.
    fn transaction_weight(&self, step: Step) -> TransactionWeight {
        match step {
            Step::CommittedWait => TransactionWeight::None,
            _ => TransactionWeight::Heavy,
        }
    }

    /// Non-blocking business logic.
    fn processing(&mut self, _ctx: &mut PhaseContext<'_, C>) -> Result<StepControl, FrameworkError> {
        Ok(StepControl::GoNext)
    }

    /// Prepare to wait, typically by starting presentation.
    fn committed_pre_wait(
        &mut self,
        _ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        Ok(StepControl::GoNext)
    }

    /// Block for an external condition.
    fn committed_wait(
        &mut self,
        _ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        Ok(StepControl::GoNext)
    }

    /// Post-wait bookkeeping.
    fn committed_post_wait(
        &mut self,
        _ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        Ok(StepControl::ExitState)
    }
}

/// Dispatch `step` to the matching phase method of `state`.
pub(crate) fn run_phase<C: PhaseServices, S: GameState<C> + ?Sized>(
    state: &mut S,
    step: Step,
    ctx: &mut PhaseContext<'_, C>,
) -> Result<StepControl, FrameworkError> {
    match step {
        Step::Processing => state.processing(ctx),
        Step::CommittedPreWait => state.committed_pre_wait(ctx),
        Step::CommittedWait => state.committed_wait(ctx),
        Step::CommittedPostWait => state.committed_post_wait(ctx),
    }
}

/// A validated set of states with a designated initial state.
pub struct StateMachine<C: PhaseServices> {
    name: String,
    initial: String,
    states: IndexMap<String, Box<dyn GameState<C>>>,
}

impl<C: PhaseServices> StateMachine<C> {
    /// Start building a machine called `name`.
    pub fn builder(name: impl Into<String>) -> StateMachineBuilder<C> {
        StateMachineBuilder {
            name: name.into(),
            initial: None,
            states: Vec::new(),
        }
    }

    /// Machine name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the state entered on cold boot.
    pub fn initial_state(&self) -> &str {
        &self.initial
    }

    /// Returns `true` if the machine has a state called `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// State names in registration order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always `false`; a built machine holds at least its initial state.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Initial step of state `name`.
    pub fn initial_step_of(&self, name: &str) -> Option<Step> {
        self.states.get(name).map(|state| state.initial_step())
    }

    pub(crate) fn state_mut(&mut self, name: &str) -> Option<&mut (dyn GameState<C> + 'static)> {
        self.states.get_mut(name).map(|state| state.as_mut())
    }
}

impl<C: PhaseServices> std::fmt::Debug for StateMachine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`StateMachine`].
pub struct StateMachineBuilder<C: PhaseServices> {
    name: String,
    initial: Option<String>,
    states: Vec<Box<dyn GameState<C>>>,
}

impl<C: PhaseServices> StateMachineBuilder<C> {
    /// Add a state.
    pub fn state(mut self, state: impl GameState<C> + 'static) -> Self {
        self.states.push(Box::new(state));
        self
    }

    /// Add an already boxed state.
    pub fn boxed_state(mut self, state: Box<dyn GameState<C>>) -> Self {
        self.states.push(state);
        self
    }

    /// Name the state entered on cold boot.
    pub fn initial_state(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    /// Validate and build.
    ///
    /// Fails with [`FrameworkError::DuplicateState`] if two states share a
    /// name, and [`FrameworkError::NoInitialState`] if no initial state is
    /// named or the named state is missing.
    pub fn build(self) -> Result<StateMachine<C>, FrameworkError> {
        let mut states = IndexMap::with_capacity(self.states.len());
        for state in self.states {
            let name = state.name().to_string();
            if states.contains_key(&name) {
                return Err(FrameworkError::DuplicateState {
                    machine: self.name,
                    state: name,
                });
            }
            states.insert(name, state);
        }

        let initial = match self.initial {
            Some(initial) if states.contains_key(&initial) => initial,
            _ => return Err(FrameworkError::NoInitialState { machine: self.name }),
        };

        Ok(StateMachine {
            name: self.name,
            initial,
            states,
        })
    }
}
