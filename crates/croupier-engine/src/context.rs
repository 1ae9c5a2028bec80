//! The view of the runtime a phase body receives.
//!
//! [`PhaseContext`] gates APIs by phase:
//!
//! - execution-only (critical data, starting presentation) fail from
//!   CommittedWait unless the wait opened its own transaction;
//! - wait-only (event waits, opening a transaction) fail outside
//!   CommittedWait.
//!
//! Misuse is a logic error in the calling state and is reported as a
//! fatal [`FrameworkError`] naming that state.

use std::sync::Arc;

use tracing::trace;

use croupier_core::{
    CriticalDataBlock, DataItems, Event, GameMode, PresentationChannel, StateInfo, Step,
    TransactionWeight, TransactionalResource,
};

use crate::accumulator::AsyncUpdateAccumulator;
use crate::error::FrameworkError;
use crate::event_queue::{DispatchedEvent, EventQueueCoordinator, EventSource, WaitOutcome};
use crate::metrics::FrameworkMetrics;
use crate::services::ServiceController;

// ── PhaseServices ──────────────────────────────────────────────────

/// Runner-specific services handed to every phase, with hooks the
/// framework calls at well-defined points.
///
/// Hooks fire only in play mode; history playback must not record
/// history.
pub trait PhaseServices {
    /// Presentation of `state` started with `data`. Runs inside the
    /// caller's transaction.
    fn on_presentation_started(
        &mut self,
        _state: &str,
        _data: &DataItems,
        _resource: &dyn TransactionalResource,
    ) -> Result<(), FrameworkError> {
        Ok(())
    }

    /// The machine is leaving `from` for `to`. Runs inside the
    /// transition's transaction, before the new position is persisted.
    fn on_state_transition(
        &mut self,
        _from: &str,
        _to: &str,
        _resource: &dyn TransactionalResource,
    ) -> Result<(), FrameworkError> {
        Ok(())
    }

    /// The context running in `mode` was deactivated.
    fn on_context_exit(&mut self, _mode: GameMode) {}
}

impl PhaseServices for () {}

// ── FrameworkHost ──────────────────────────────────────────────────

/// Host-facing collaborators of one framework instance.
pub struct FrameworkHost {
    /// Mode the framework runs in.
    pub mode: GameMode,
    /// Transaction and critical-data primitives.
    pub resource: Arc<dyn TransactionalResource>,
    /// Presentation pushes.
    pub presentation: Arc<dyn PresentationChannel>,
    /// Event multiplexer used by wait phases.
    pub coordinator: EventQueueCoordinator,
    /// Async update batch, flushed once per drain cycle.
    pub accumulator: AsyncUpdateAccumulator,
    /// Service controller, if the runner provides services.
    pub services: Option<Arc<ServiceController>>,
}

impl FrameworkHost {
    /// Assemble a host. The coordinator is wired to wake for async
    /// updates.
    pub fn new(
        mode: GameMode,
        resource: Arc<dyn TransactionalResource>,
        presentation: Arc<dyn PresentationChannel>,
        coordinator: EventQueueCoordinator,
    ) -> Self {
        let accumulator = AsyncUpdateAccumulator::new();
        let coordinator = coordinator.with_async_signal(accumulator.signal().clone());
        Self {
            mode,
            resource,
            presentation,
            coordinator,
            accumulator,
            services: None,
        }
    }

    /// Attach a service controller.
    pub fn with_service_controller(mut self, controller: Arc<ServiceController>) -> Self {
        self.services = Some(controller);
        self
    }
}

impl std::fmt::Debug for FrameworkHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkHost")
            .field("mode", &self.mode)
            .field("coordinator", &self.coordinator)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

// ── PhaseContext ───────────────────────────────────────────────────

/// Everything a phase body may touch while it runs.
pub struct PhaseContext<'a, C> {
    host: &'a FrameworkHost,
    services: &'a mut C,
    info: &'a mut StateInfo,
    step: Step,
    transaction: Option<TransactionWeight>,
    metrics: &'a mut FrameworkMetrics,
}

impl<'a, C: PhaseServices> PhaseContext<'a, C> {
    pub(crate) fn new(
        host: &'a FrameworkHost,
        services: &'a mut C,
        info: &'a mut StateInfo,
        step: Step,
        transaction: Option<TransactionWeight>,
        metrics: &'a mut FrameworkMetrics,
    ) -> Self {
        Self {
            host,
            services,
            info,
            step,
            transaction,
            metrics,
        }
    }

    // ── General ────────────────────────────────────────────────────

    /// Name of the running state.
    pub fn state_name(&self) -> &str {
        &self.info.current_state
    }

    /// Phase being executed.
    pub fn step(&self) -> Step {
        self.step
    }

    /// Mode the framework runs in.
    pub fn mode(&self) -> GameMode {
        self.host.mode
    }

    /// Transaction the phase body currently runs inside, if any.
    pub fn transaction(&self) -> Option<TransactionWeight> {
        self.transaction
    }

    /// Choose the state entered when this state returns
    /// [`ExitState`](croupier_core::StepControl::ExitState).
    pub fn set_next_state(&mut self, name: impl Into<String>) {
        self.info.pending_state = Some(name.into());
    }

    /// The pending next state.
    pub fn next_state(&self) -> Option<&str> {
        self.info.pending_state.as_deref()
    }

    /// Runner services.
    pub fn services(&mut self) -> &mut C {
        self.services
    }

    /// The host resource.
    pub fn resource(&self) -> &dyn TransactionalResource {
        self.host.resource.as_ref()
    }

    /// The framework's service controller.
    pub fn service_controller(&self) -> Option<&ServiceController> {
        self.host.services.as_deref()
    }

    /// Queue async data for the running state's presentation. Flushed at
    /// the next event-queue drain cycle.
    pub fn push_async_data(&self, data: &DataItems) {
        self.host.accumulator.push(&self.info.current_state, data);
    }

    // ── Execution-only ─────────────────────────────────────────────

    fn require_execution(&self, api: &'static str) -> Result<(), FrameworkError> {
        if self.step == Step::CommittedWait && self.transaction.is_none() {
            return Err(FrameworkError::ExecutionOnlyApi {
                state: self.info.current_state.clone(),
                api,
            });
        }
        Ok(())
    }

    /// Read critical data.
    pub fn read_critical_data(&self, keys: &[&str]) -> Result<CriticalDataBlock, FrameworkError> {
        self.require_execution("read_critical_data")?;
        Ok(self.host.resource.read_critical_data(keys)?)
    }

    /// Write critical data.
    pub fn write_critical_data(&self, block: &CriticalDataBlock) -> Result<(), FrameworkError> {
        self.require_execution("write_critical_data")?;
        Ok(self.host.resource.write_critical_data(block)?)
    }

    /// Remove critical data.
    pub fn remove_critical_data(&self, keys: &[&str]) -> Result<(), FrameworkError> {
        self.require_execution("remove_critical_data")?;
        Ok(self.host.resource.remove_critical_data(keys)?)
    }

    /// Start presenting the running state.
    ///
    /// Sync service values are filled first and `data` is merged over
    /// them. In play mode the runner's
    /// [`on_presentation_started`](PhaseServices::on_presentation_started)
    /// hook sees the final data.
    pub fn start_presentation(&mut self, data: &DataItems) -> Result<(), FrameworkError> {
        self.require_execution("start_presentation")?;
        let state = self.info.current_state.clone();

        let mut presented = match &self.host.services {
            Some(services) => services.fill_sync(&state),
            None => DataItems::new(),
        };
        presented.merge(data);

        self.host.presentation.start_state(&state, &presented);
        if let Some(services) = &self.host.services {
            self.host.accumulator.push(&state, &services.fill_async(&state));
        }
        if self.host.mode == GameMode::Play {
            self.services
                .on_presentation_started(&state, &presented, self.host.resource.as_ref())?;
        }
        Ok(())
    }

    // ── Wait-only ──────────────────────────────────────────────────

    fn require_wait(&self, api: &'static str) -> Result<(), FrameworkError> {
        if self.step != Step::CommittedWait {
            return Err(FrameworkError::WaitOnlyApi {
                state: self.info.current_state.clone(),
                api,
            });
        }
        Ok(())
    }

    /// Block until an event satisfying `accept` arrives or the wait is
    /// interrupted. Pending async updates are flushed to presentation
    /// once per drain cycle.
    pub fn next_event(
        &mut self,
        mut accept: impl FnMut(EventSource, &Event) -> bool,
    ) -> Result<WaitOutcome, FrameworkError> {
        self.require_wait("next_event")?;
        let host = self.host;
        let mut flushes = 0;
        let outcome = host.coordinator.next_event(&mut accept, &mut || {
            if host.accumulator.flush_to(host.presentation.as_ref()) {
                flushes += 1;
            }
        });
        self.metrics.async_flushes += flushes;
        Ok(outcome)
    }

    /// [`next_event`](Self::next_event), collapsing interrupts to `None`.
    pub fn wait_for(
        &mut self,
        accept: impl FnMut(EventSource, &Event) -> bool,
    ) -> Result<Option<DispatchedEvent>, FrameworkError> {
        Ok(self.next_event(accept)?.into_event())
    }

    /// Run `body` inside a transaction of `weight` from a wait phase.
    ///
    /// Returns `Ok(None)` if the host did not open the transaction; the
    /// state should repeat its wait step.
    pub fn open_transaction<T>(
        &mut self,
        weight: TransactionWeight,
        name: &str,
        body: impl FnOnce(&mut PhaseContext<'_, C>) -> T,
    ) -> Result<Option<T>, FrameworkError> {
        self.require_wait("open_transaction")?;
        let host = self.host;
        let mut body = Some(body);
        let mut out = None;
        let previous = self.transaction;
        let opened = host.resource.open_transaction(weight, name, &mut || {
            if let Some(body) = body.take() {
                self.transaction = weight.is_transactional().then_some(weight);
                out = Some(body(&mut *self));
                self.transaction = previous;
            }
        })?;

        if weight.is_transactional() {
            if opened {
                self.metrics.transactions_opened += 1;
            } else {
                self.metrics.transactions_not_opened += 1;
                trace!(state = %self.info.current_state, name, "wait transaction not opened");
            }
        }
        Ok(out)
    }

    // ── Runner support ─────────────────────────────────────────────

    pub(crate) fn require_heavy(&self, api: &'static str) -> Result<(), FrameworkError> {
        if self.transaction != Some(TransactionWeight::Heavy) {
            return Err(FrameworkError::HeavyTransactionRequired {
                state: self.info.current_state.clone(),
                api,
            });
        }
        Ok(())
    }

    pub(crate) fn host(&self) -> &FrameworkHost {
        self.host
    }
}
