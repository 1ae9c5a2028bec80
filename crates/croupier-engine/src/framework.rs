//! Transaction-stepped driver for a [`StateMachine`].
//!
//! One call to [`StateMachineFramework::execute_tick`] runs exactly one
//! phase of the current state:
//!
//! 1. On the first tick, recover [`StateInfo`] from critical data inside a
//!    light transaction, or cold-boot into the initial state and persist.
//! 2. Open a transaction of the state's declared weight for the current
//!    step (never for CommittedWait) and run the phase body inside it.
//! 3. Apply the returned [`StepControl`] inside the same transaction:
//!    advance the step, or transition to the pending state.
//!
//! `StateInfo` is persisted when a state leaves Processing and on every
//! state transition. Steps inside the committed range are not persisted,
//! so recovery re-enters a state at CommittedPreWait at the latest.
//!
//! A transaction the host refuses to open is not an error: the tick
//! reports [`TickOutcome::NotOpened`] and the same step runs again on the
//! next tick.

use tracing::{debug, info, trace};

use croupier_core::keys;
use croupier_core::{
    CriticalDataBlock, GameMode, StateInfo, Step, StepTransition, TransactionWeight,
    TransactionalResource,
};
use croupier_history::codec::{decode_state_info, encode_state_info};

use crate::context::{FrameworkHost, PhaseContext, PhaseServices};
use crate::error::FrameworkError;
use crate::metrics::FrameworkMetrics;
use crate::state::{run_phase, StateMachine};

/// Transaction name used when recovering the persisted position.
pub const RECOVER_STATE_INFO: &str = "RecoverStateInfo";

/// What one tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The phase ran; the state continues at `step`.
    Stepped {
        /// Next step to run.
        step: Step,
    },
    /// The phase ran and the machine moved to `state`.
    StateChanged {
        /// New current state.
        state: String,
    },
    /// The host refused the transaction; `step` runs again next tick.
    NotOpened {
        /// Step that will be repeated.
        step: Step,
    },
    /// The host refused the recovery transaction.
    RecoveryNotOpened,
}

/// Drives one state machine for one framework lifetime.
pub struct StateMachineFramework<C: PhaseServices> {
    name: String,
    machine: StateMachine<C>,
    services: C,
    host: FrameworkHost,
    info: Option<StateInfo>,
    metrics: FrameworkMetrics,
}

impl<C: PhaseServices> StateMachineFramework<C> {
    /// Create a framework. `name` prefixes the critical-data key of the
    /// persisted position (`"{name}/{mode}Mode/StateInfo"`).
    pub fn new(
        name: impl Into<String>,
        machine: StateMachine<C>,
        services: C,
        host: FrameworkHost,
    ) -> Self {
        Self {
            name: name.into(),
            machine,
            services,
            host,
            info: None,
            metrics: FrameworkMetrics::default(),
        }
    }

    /// Framework name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mode the framework runs in.
    pub fn mode(&self) -> GameMode {
        self.host.mode
    }

    /// Current position, once recovered.
    pub fn state_info(&self) -> Option<&StateInfo> {
        self.info.as_ref()
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &FrameworkMetrics {
        &self.metrics
    }

    /// Runner services.
    pub fn services_mut(&mut self) -> &mut C {
        &mut self.services
    }

    /// Host collaborators.
    pub fn host(&self) -> &FrameworkHost {
        &self.host
    }

    /// Critical-data key of the persisted position.
    pub fn state_info_key(&self) -> String {
        keys::state_info(&self.name, self.host.mode)
    }

    /// Run one phase of the current state.
    pub fn execute_tick(&mut self) -> Result<TickOutcome, FrameworkError> {
        self.metrics.ticks += 1;
        if !self.recover()? {
            return Ok(TickOutcome::RecoveryNotOpened);
        }

        let key = self.state_info_key();
        let Self {
            machine,
            services,
            host,
            info,
            metrics,
            ..
        } = self;
        let host = &*host;
        let Some(info) = info.as_mut() else {
            return Ok(TickOutcome::RecoveryNotOpened);
        };

        let step = info.current_step;
        let state_name = info.current_state.clone();
        let weight = match step {
            Step::CommittedWait => TransactionWeight::None,
            _ => machine
                .state_mut(&state_name)
                .ok_or_else(|| FrameworkError::UnknownState {
                    state: state_name.clone(),
                })?
                .transaction_weight(step),
        };
        let label = format!("{state_name}.{step}");

        let mut outcome = None;
        let opened = host.resource.open_transaction(weight, &label, &mut || {
            let in_transaction = weight.is_transactional().then_some(weight);
            outcome = Some(run_step(
                StepRun {
                    key: &key,
                    machine: &mut *machine,
                    services: &mut *services,
                    host,
                    info: &mut *info,
                    metrics: &mut *metrics,
                },
                step,
                in_transaction,
            ));
        })?;

        if weight.is_transactional() {
            if opened {
                metrics.transactions_opened += 1;
            } else {
                metrics.transactions_not_opened += 1;
            }
        }
        match outcome {
            Some(result) => result,
            None => {
                trace!(state = %state_name, %step, "phase transaction not opened");
                Ok(TickOutcome::NotOpened { step })
            }
        }
    }

    /// Load the persisted position on first use. Returns `false` if the
    /// host refused the recovery transaction.
    fn recover(&mut self) -> Result<bool, FrameworkError> {
        if self.info.is_some() {
            return Ok(true);
        }
        let key = self.state_info_key();
        let initial = self.machine.initial_state().to_string();
        let initial_step = self
            .machine
            .initial_step_of(&initial)
            .unwrap_or(Step::Processing);
        let resource = self.host.resource.as_ref();

        let mut loaded = None;
        let opened = resource.open_light_transaction(RECOVER_STATE_INFO, &mut || {
            loaded = Some(load_or_cold_boot(resource, &key, &initial, initial_step));
        })?;
        let Some(loaded) = loaded else {
            self.metrics.transactions_not_opened += 1;
            trace!(framework = %self.name, "recovery transaction not opened");
            return Ok(false);
        };
        debug_assert!(opened);
        self.metrics.transactions_opened += 1;

        let (info, recovered) = loaded?;
        if !self.machine.contains(&info.current_state) {
            return Err(FrameworkError::UnknownState {
                state: info.current_state,
            });
        }
        if recovered {
            self.metrics.recoveries += 1;
            info!(
                framework = %self.name,
                mode = %self.host.mode,
                state = %info.current_state,
                step = %info.current_step,
                "resuming from persisted position"
            );
        } else {
            self.metrics.cold_boots += 1;
            info!(
                framework = %self.name,
                mode = %self.host.mode,
                state = %info.current_state,
                "cold boot"
            );
        }
        self.info = Some(info);
        Ok(true)
    }
}

impl<C: PhaseServices> std::fmt::Debug for StateMachineFramework<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachineFramework")
            .field("name", &self.name)
            .field("machine", &self.machine)
            .field("info", &self.info)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

// ── Step execution ─────────────────────────────────────────────────

/// Disjoint borrows of a framework needed to run one step.
struct StepRun<'a, C: PhaseServices> {
    key: &'a str,
    machine: &'a mut StateMachine<C>,
    services: &'a mut C,
    host: &'a FrameworkHost,
    info: &'a mut StateInfo,
    metrics: &'a mut FrameworkMetrics,
}

fn load_or_cold_boot(
    resource: &dyn TransactionalResource,
    key: &str,
    initial: &str,
    initial_step: Step,
) -> Result<(StateInfo, bool), FrameworkError> {
    let block = resource.read_critical_data(&[key])?;
    if let Some(bytes) = block.get(key) {
        return Ok((decode_state_info(bytes)?, true));
    }
    let info = StateInfo::new(initial, initial_step);
    persist(resource, key, &info)?;
    Ok((info, false))
}

fn persist(
    resource: &dyn TransactionalResource,
    key: &str,
    info: &StateInfo,
) -> Result<(), FrameworkError> {
    resource.write_critical_data(&CriticalDataBlock::new().with(key, encode_state_info(info)))?;
    Ok(())
}

/// Run `op` in the open transaction, or in a new light one named `name`.
/// Returns `None` if the light transaction was refused.
fn in_light_transaction<T>(
    resource: &dyn TransactionalResource,
    in_transaction: Option<TransactionWeight>,
    name: &str,
    metrics: &mut FrameworkMetrics,
    op: impl FnOnce() -> T,
) -> Result<Option<T>, FrameworkError> {
    if in_transaction.is_some() {
        return Ok(Some(op()));
    }
    let mut op = Some(op);
    let mut out = None;
    let opened = resource.open_light_transaction(name, &mut || {
        if let Some(op) = op.take() {
            out = Some(op());
        }
    })?;
    if opened {
        metrics.transactions_opened += 1;
    } else {
        metrics.transactions_not_opened += 1;
    }
    Ok(out)
}

fn run_step<C: PhaseServices>(
    run: StepRun<'_, C>,
    step: Step,
    in_transaction: Option<TransactionWeight>,
) -> Result<TickOutcome, FrameworkError> {
    let StepRun {
        key,
        machine,
        services,
        host,
        info,
        metrics,
    } = run;
    let state_name = info.current_state.clone();

    let control = {
        let state = machine
            .state_mut(&state_name)
            .ok_or_else(|| FrameworkError::UnknownState {
                state: state_name.clone(),
            })?;
        let mut ctx = PhaseContext::new(host, services, info, step, in_transaction, metrics);
        run_phase(state, step, &mut ctx)?
    };
    metrics.phases_executed += 1;

    let transition =
        control
            .resolve(step)
            .ok_or_else(|| FrameworkError::InvalidStepControl {
                state: state_name.clone(),
                step,
                control,
            })?;

    match transition {
        StepTransition::Advance(next) => {
            let mut advanced = info.clone();
            advanced.current_step = next;
            if step == Step::Processing {
                let resource = host.resource.as_ref();
                let label = format!("{state_name}.PersistStateInfo");
                let persisted = in_light_transaction(resource, in_transaction, &label, metrics, || {
                    persist(resource, key, &advanced)
                })?;
                match persisted {
                    Some(result) => result?,
                    None => return Ok(TickOutcome::NotOpened { step }),
                }
            }
            trace!(state = %state_name, from = %step, to = %next, "step advanced");
            *info = advanced;
            Ok(TickOutcome::Stepped { step: next })
        }
        StepTransition::Exit => goto_state(
            StepRun {
                key,
                machine,
                services,
                host,
                info,
                metrics,
            },
            step,
            in_transaction,
        ),
    }
}

/// Leave the current state for its pending next state.
fn goto_state<C: PhaseServices>(
    run: StepRun<'_, C>,
    step: Step,
    in_transaction: Option<TransactionWeight>,
) -> Result<TickOutcome, FrameworkError> {
    let StepRun {
        key,
        machine,
        services,
        host,
        info,
        metrics,
    } = run;
    let from = info.current_state.clone();
    let next = info
        .pending_state
        .clone()
        .ok_or_else(|| FrameworkError::NoNextState {
            state: from.clone(),
        })?;
    let initial_step = machine
        .initial_step_of(&next)
        .ok_or_else(|| FrameworkError::UnknownState {
            state: next.clone(),
        })?;
    let entered = StateInfo::new(next.clone(), initial_step);

    let resource = host.resource.as_ref();
    let label = format!("{from}.GotoState");
    let mode = host.mode;
    let done = in_light_transaction(resource, in_transaction, &label, metrics, || {
        if mode == GameMode::Play {
            services.on_state_transition(&from, &next, resource)?;
        }
        persist(resource, key, &entered)
    })?;
    match done {
        Some(result) => result?,
        None => return Ok(TickOutcome::NotOpened { step }),
    }

    debug!(from = %from, to = %next, step = %initial_step, "state transition");
    *info = entered;
    metrics.state_transitions += 1;
    Ok(TickOutcome::StateChanged { state: next })
}
