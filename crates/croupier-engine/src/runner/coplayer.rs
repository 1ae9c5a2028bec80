//! Coplayer runner: one per-player game context under the shell.
//!
//! A coplayer runs its theme's state machine on its own thread. Its
//! phase services record history: presentation starts stage the presented
//! data and open a history step, state transitions close it. Anything the
//! coplayer needs done inside the shell's transaction goes through the
//! shell's [`TransactionalOperationManager`].

use std::sync::Arc;

use croupier_core::{
    CoplayerId, DataItems, Event, GameMode, Peer, PeerMessage, PresentationChannel, ThemeInfo,
    TransactionalResource,
};
use croupier_history::{ConcurrentHistoryRecorder, HistoryConfig, HistoryManager};

use crate::accumulator::AsyncUpdateAccumulator;
use crate::context::PhaseServices;
use crate::error::FrameworkError;
use crate::event_queue::EventQueue;
use crate::operations::{OperationTicket, TransactionalOperationManager};
use crate::runner::shell::CoplayerSession;
use crate::runner::RunnerCapabilities;
use crate::services::{ServiceController, ServiceRegistry, ServiceRequestDataMaps};
use crate::state::StateMachine;

/// Framework name of coplayer runners.
pub const COPLAYER_FRAMEWORK: &str = "CoplayerFramework";

/// Builds the play-mode state machine of a theme.
pub trait CoplayerConfigurator: Send + Sync {
    /// State machine for a coplayer running `theme`.
    fn configure(&self, theme: &ThemeInfo) -> Result<StateMachine<CoplayerServices>, FrameworkError>;
}

impl<F> CoplayerConfigurator for F
where
    F: Fn(&ThemeInfo) -> Result<StateMachine<CoplayerServices>, FrameworkError> + Send + Sync,
{
    fn configure(&self, theme: &ThemeInfo) -> Result<StateMachine<CoplayerServices>, FrameworkError> {
        self(theme)
    }
}

// ── CoplayerServices ───────────────────────────────────────────────

/// Phase services of a coplayer framework.
pub struct CoplayerServices {
    id: CoplayerId,
    history: HistoryManager,
    shell_operations: Arc<TransactionalOperationManager>,
    shell_queue: EventQueue,
}

impl CoplayerServices {
    /// Services for coplayer `id`, pairing its history with the shell's
    /// recorder and reaching the shell through `shell_operations` and
    /// `shell_queue`.
    pub fn new(
        id: CoplayerId,
        history: HistoryManager,
        shell_operations: Arc<TransactionalOperationManager>,
        shell_queue: EventQueue,
    ) -> Self {
        Self {
            id,
            history,
            shell_operations,
            shell_queue,
        }
    }

    /// Slot id.
    pub fn id(&self) -> CoplayerId {
        self.id
    }

    /// The coplayer's history manager.
    pub fn history(&mut self) -> &mut HistoryManager {
        &mut self.history
    }

    /// Run `op` inside the shell's next transaction.
    ///
    /// Do not block on the ticket from inside a phase that holds a
    /// transaction the shell may be waiting on; the shell fires queued
    /// operations before any blocking post, so waiting from
    /// `CommittedWait` is always safe.
    pub fn submit_to_shell<T, F>(&self, name: impl Into<String>, op: F) -> OperationTicket<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TransactionalResource) -> T + Send + 'static,
    {
        self.shell_operations.submit_from(self.id, name, op)
    }

    /// Send a peer message to the shell.
    pub fn post_to_shell(&self, name: impl Into<String>, data: DataItems) {
        self.shell_queue.post(Event::Peer(PeerMessage {
            from: Peer::Coplayer(self.id),
            name: name.into(),
            data,
        }));
    }
}

impl PhaseServices for CoplayerServices {
    fn on_presentation_started(
        &mut self,
        state: &str,
        data: &DataItems,
        resource: &dyn TransactionalResource,
    ) -> Result<(), FrameworkError> {
        self.history.stage_update(data, resource)?;
        self.history.begin_history_step(state, resource)?;
        Ok(())
    }

    fn on_state_transition(
        &mut self,
        _from: &str,
        _to: &str,
        resource: &dyn TransactionalResource,
    ) -> Result<(), FrameworkError> {
        self.history.end_history_step(resource)?;
        Ok(())
    }
}

impl std::fmt::Debug for CoplayerServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoplayerServices")
            .field("id", &self.id)
            .field("history_steps", &self.history.step_count())
            .finish_non_exhaustive()
    }
}

// ── Capabilities ───────────────────────────────────────────────────

/// What the shell hands a coplayer runner.
pub(crate) struct CoplayerCapabilities {
    pub(crate) id: CoplayerId,
    pub(crate) theme: ThemeInfo,
    pub(crate) session: CoplayerSession,
    pub(crate) configurator: Arc<dyn CoplayerConfigurator>,
    pub(crate) requests: Arc<ServiceRequestDataMaps>,
    pub(crate) registry: Arc<ServiceRegistry>,
    pub(crate) shell_history: Arc<ConcurrentHistoryRecorder>,
    pub(crate) shell_operations: Arc<TransactionalOperationManager>,
    pub(crate) shell_queue: EventQueue,
    pub(crate) history: HistoryConfig,
}

impl RunnerCapabilities for CoplayerCapabilities {
    type Context = CoplayerServices;

    fn framework_name(&self) -> &str {
        COPLAYER_FRAMEWORK
    }

    fn resource(&self) -> Arc<dyn TransactionalResource> {
        Arc::clone(&self.session.resource)
    }

    fn presentation(&self) -> Arc<dyn PresentationChannel> {
        Arc::clone(&self.session.presentation)
    }

    fn create_state_machine(
        &mut self,
        _mode: GameMode,
    ) -> Result<StateMachine<CoplayerServices>, FrameworkError> {
        self.configurator.configure(&self.theme)
    }

    fn create_context(&mut self, _mode: GameMode) -> Result<CoplayerServices, FrameworkError> {
        Ok(CoplayerServices::new(
            self.id,
            HistoryManager::new(Arc::clone(&self.shell_history), self.history.clone()),
            Arc::clone(&self.shell_operations),
            self.shell_queue.clone(),
        ))
    }

    fn service_controller(
        &mut self,
        mode: GameMode,
        sink: AsyncUpdateAccumulator,
    ) -> Result<Option<Arc<ServiceController>>, FrameworkError> {
        Ok(Some(ServiceController::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.requests),
            mode,
            sink,
        )))
    }
}
