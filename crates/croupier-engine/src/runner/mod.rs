//! Runner threads: host lifecycle bridged onto framework instances.
//!
//! A runner owns one OS thread, one [`EventQueueCoordinator`] and at most
//! one [`StateMachineFramework`] at a time. Its loop moves between three
//! states:
//!
//! - **NoFramework**: wait for an `ActivateContext` lifecycle event.
//! - **FrameworkRunning**: tear the framework down if exit was requested;
//!   otherwise fire queued transactional operations if signalled;
//!   otherwise run one framework tick.
//! - **Exiting**: the stop signal was raised; the thread returns.
//!
//! What differs between the shell and a coplayer is supplied through
//! [`RunnerCapabilities`].

pub mod coplayer;
pub mod shell;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{debug, error, info, warn};

use croupier_core::{GameMode, LifecycleEvent, PresentationChannel, TransactionalResource};

use crate::accumulator::AsyncUpdateAccumulator;
use crate::config::RunnerConfig;
use crate::context::{FrameworkHost, PhaseServices};
use crate::error::FrameworkError;
use crate::event_queue::{EventQueueCoordinator, RunnerControl, RunnerQueues};
use crate::framework::StateMachineFramework;
use crate::history_replay::history_replay_machine;
use crate::operations::TransactionalOperationManager;
use crate::services::ServiceController;
use crate::state::StateMachine;

// ── RunnerCapabilities ─────────────────────────────────────────────

/// Everything runner-specific about a runner thread.
pub trait RunnerCapabilities: Send + 'static {
    /// Services passed to every phase of this runner's states.
    type Context: PhaseServices + 'static;

    /// Framework name; prefixes the persisted position key.
    fn framework_name(&self) -> &str;

    /// The runner's host resource.
    fn resource(&self) -> Arc<dyn TransactionalResource>;

    /// The runner's presentation channel.
    fn presentation(&self) -> Arc<dyn PresentationChannel>;

    /// Build the game state machine. Only called for play mode.
    fn create_state_machine(
        &mut self,
        mode: GameMode,
    ) -> Result<StateMachine<Self::Context>, FrameworkError>;

    /// Build the phase services for a new framework.
    fn create_context(&mut self, mode: GameMode) -> Result<Self::Context, FrameworkError>;

    /// Service controller for a new framework, pushing async updates into
    /// `sink`.
    fn service_controller(
        &mut self,
        _mode: GameMode,
        _sink: AsyncUpdateAccumulator,
    ) -> Result<Option<Arc<ServiceController>>, FrameworkError> {
        Ok(None)
    }

    /// Operations other threads queue for this runner's transactions.
    fn operations(&self) -> Option<Arc<TransactionalOperationManager>> {
        None
    }

    /// The runner thread is about to return.
    fn on_shutdown(&mut self) {}
}

// ── RunnerCore ─────────────────────────────────────────────────────

/// Observable state of a runner loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    /// Waiting for the host to activate a context.
    NoFramework,
    /// A framework is running.
    FrameworkRunning,
    /// The runner is stopping.
    Exiting,
}

/// Summary returned by a runner thread that exited cleanly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunnerReport {
    /// Framework ticks executed across every framework instance.
    pub ticks: u64,
    /// Framework instances constructed.
    pub frameworks_built: u64,
}

enum Phase<C: PhaseServices> {
    NoFramework,
    Running(Box<StateMachineFramework<C>>),
    Exiting,
}

/// The runner loop, driven one iteration at a time.
pub struct RunnerCore<R: RunnerCapabilities> {
    caps: R,
    name: String,
    coordinator: EventQueueCoordinator,
    operations: Option<Arc<TransactionalOperationManager>>,
    phase: Phase<R::Context>,
    report: RunnerReport,
}

impl<R: RunnerCapabilities> RunnerCore<R> {
    /// Create a runner over `queues`, controlled through `control`.
    pub fn new(
        caps: R,
        config: &RunnerConfig,
        queues: RunnerQueues,
        control: Arc<RunnerControl>,
    ) -> Self {
        let operations = caps.operations();
        let mut coordinator =
            EventQueueCoordinator::new(queues, control).with_idle_wait(config.idle_wait);
        if let Some(ops) = &operations {
            coordinator = coordinator.with_operations(ops.signal().clone());
        }
        Self {
            caps,
            name: config.name.clone(),
            coordinator,
            operations,
            phase: Phase::NoFramework,
            report: RunnerReport::default(),
        }
    }

    /// Current loop state.
    pub fn state(&self) -> RunnerState {
        match self.phase {
            Phase::NoFramework => RunnerState::NoFramework,
            Phase::Running(_) => RunnerState::FrameworkRunning,
            Phase::Exiting => RunnerState::Exiting,
        }
    }

    /// The running framework, if any.
    pub fn framework(&self) -> Option<&StateMachineFramework<R::Context>> {
        match &self.phase {
            Phase::Running(framework) => Some(framework),
            _ => None,
        }
    }

    /// Counters so far.
    pub fn report(&self) -> &RunnerReport {
        &self.report
    }

    /// The runner's capabilities.
    pub fn capabilities(&self) -> &R {
        &self.caps
    }

    /// Run one loop iteration and return the resulting state.
    ///
    /// In `NoFramework` this blocks until a lifecycle event arrives; while
    /// a framework runs, one iteration is at most one tick.
    pub fn step(&mut self) -> Result<RunnerState, FrameworkError> {
        let control = Arc::clone(self.coordinator.control());
        if control.stop.is_set() && self.state() != RunnerState::Exiting {
            self.teardown();
            self.phase = Phase::Exiting;
        }

        match self.state() {
            RunnerState::Exiting => {}
            RunnerState::NoFramework => self.await_activation(&control)?,
            RunnerState::FrameworkRunning if control.exit_framework.is_set() => self.teardown(),
            RunnerState::FrameworkRunning => self.drive_framework(&control)?,
        }
        Ok(self.state())
    }

    fn await_activation(&mut self, control: &RunnerControl) -> Result<(), FrameworkError> {
        let event = match control.take_deferred() {
            Some(event) => Some(event),
            None => self.coordinator.wait_lifecycle(),
        };
        match event {
            Some(LifecycleEvent::ActivateContext { mode }) => {
                let framework = self.build_framework(mode)?;
                self.phase = Phase::Running(Box::new(framework));
            }
            Some(other) => {
                debug!(runner = %self.name, event = ?other, "lifecycle event ignored without a framework");
            }
            None => {}
        }
        Ok(())
    }

    fn drive_framework(&mut self, control: &RunnerControl) -> Result<(), FrameworkError> {
        let Phase::Running(framework) = &mut self.phase else {
            return Ok(());
        };
        if let Some(lifecycle) = self.coordinator.poll_lifecycle() {
            control.request_exit(lifecycle);
        } else if let Some(ops) = self
            .operations
            .as_ref()
            .filter(|ops| ops.signal().is_set())
        {
            ops.execute_queued_operations(framework.host().resource.as_ref())?;
        } else {
            framework.execute_tick()?;
            self.report.ticks += 1;
        }
        Ok(())
    }

    /// Drive the loop until the runner is stopped.
    pub fn run(mut self) -> Result<RunnerReport, FrameworkError> {
        info!(runner = %self.name, "runner started");
        let result = loop {
            match self.step() {
                Ok(RunnerState::Exiting) => break Ok(self.report.clone()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        self.teardown();
        if let Some(ops) = &self.operations {
            ops.cancel_queued_operations();
        }
        self.caps.on_shutdown();
        match &result {
            Ok(report) => info!(
                runner = %self.name,
                ticks = report.ticks,
                frameworks = report.frameworks_built,
                "runner exited"
            ),
            Err(e) => error!(runner = %self.name, error = %e, "runner terminated by fatal error"),
        }
        result
    }

    fn build_framework(
        &mut self,
        mode: GameMode,
    ) -> Result<StateMachineFramework<R::Context>, FrameworkError> {
        let machine = match mode {
            GameMode::Play => self.caps.create_state_machine(mode)?,
            GameMode::History => history_replay_machine()?,
            GameMode::Utility => return Err(FrameworkError::UnsupportedGameMode { mode }),
        };
        let services = self.caps.create_context(mode)?;
        let mut host = FrameworkHost::new(
            mode,
            self.caps.resource(),
            self.caps.presentation(),
            self.coordinator.clone(),
        );
        if let Some(controller) = self.caps.service_controller(mode, host.accumulator.clone())? {
            host = host.with_service_controller(controller);
        }
        self.report.frameworks_built += 1;
        info!(
            runner = %self.name,
            framework = self.caps.framework_name(),
            %mode,
            machine = machine.name(),
            "framework constructed"
        );
        Ok(StateMachineFramework::new(
            self.caps.framework_name(),
            machine,
            services,
            host,
        ))
    }

    /// Drop the running framework and settle deferred lifecycle events.
    fn teardown(&mut self) {
        let control = self.coordinator.control();
        control.exit_framework.reset();
        if !matches!(self.phase, Phase::Running(_)) {
            return;
        }
        let Phase::Running(mut framework) = std::mem::replace(&mut self.phase, Phase::NoFramework)
        else {
            return;
        };
        let mode = framework.mode();
        let mut inactivated = false;
        control.retain_deferred(|event| match event {
            LifecycleEvent::InactivateContext => {
                inactivated = true;
                false
            }
            LifecycleEvent::NewContext => false,
            LifecycleEvent::ActivateContext { .. } => true,
        });
        if inactivated {
            framework.services_mut().on_context_exit(mode);
            framework.host().presentation.context_exited(mode);
        }
        info!(
            runner = %self.name,
            %mode,
            ticks = framework.metrics().ticks,
            "framework torn down"
        );
    }
}

// ── RunnerHandle ───────────────────────────────────────────────────

/// Owner's handle to a spawned runner thread. Dropping it stops and
/// joins the thread.
pub struct RunnerHandle {
    name: String,
    queues: RunnerQueues,
    control: Arc<RunnerControl>,
    exited: Receiver<()>,
    thread: Option<JoinHandle<Result<RunnerReport, FrameworkError>>>,
}

impl RunnerHandle {
    /// Spawn a named runner thread for `caps`.
    pub fn spawn<R: RunnerCapabilities>(
        caps: R,
        config: RunnerConfig,
        queues: RunnerQueues,
    ) -> Result<Self, FrameworkError> {
        config.validate()?;
        let control = Arc::new(RunnerControl::new());
        let (exit_tx, exited) = bounded(0);

        let thread = {
            let queues = queues.clone();
            let control = Arc::clone(&control);
            let thread_config = config.clone();
            thread::Builder::new()
                .name(config.name.clone())
                .spawn(move || {
                    // Dropped when the thread ends, however it ends.
                    let _exit: Sender<()> = exit_tx;
                    RunnerCore::new(caps, &thread_config, queues, control).run()
                })
                .map_err(|e| FrameworkError::ThreadSpawnFailed {
                    name: config.name.clone(),
                    reason: e.to_string(),
                })?
        };

        Ok(Self {
            name: config.name,
            queues,
            control,
            exited,
            thread: Some(thread),
        })
    }

    /// Runner name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The runner's input queues.
    pub fn queues(&self) -> &RunnerQueues {
        &self.queues
    }

    /// The runner's control block.
    pub fn control(&self) -> &Arc<RunnerControl> {
        &self.control
    }

    /// Ask the thread to exit after its current iteration.
    pub fn request_stop(&self) {
        self.control.stop.set();
    }

    /// Returns `true` once the thread has returned or panicked.
    pub fn is_finished(&self) -> bool {
        matches!(self.exited.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// A receiver that disconnects once the thread has returned or
    /// panicked. Nothing is ever sent on it.
    pub fn exit_notice(&self) -> Receiver<()> {
        self.exited.clone()
    }

    /// Stop the thread and wait for it.
    pub fn join(mut self) -> Result<RunnerReport, FrameworkError> {
        self.request_stop();
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<RunnerReport, FrameworkError> {
        let Some(thread) = self.thread.take() else {
            return Ok(RunnerReport::default());
        };
        match thread.join() {
            Ok(result) => result,
            Err(_) => Err(FrameworkError::RunnerPanicked {
                name: self.name.clone(),
            }),
        }
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.request_stop();
            if let Err(e) = self.join_inner() {
                warn!(runner = %self.name, error = %e, "runner ended with an error");
            }
        }
    }
}

impl std::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
