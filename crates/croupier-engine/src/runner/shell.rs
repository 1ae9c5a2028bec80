//! Shell runner and its coplayer pool.
//!
//! The shell is the top-level context: it runs its own state machine
//! (money, doors, cross-cutting flow), owns the shell history recorder and
//! the operation manager coplayers submit to, and manages coplayer
//! threads through [`CoplayerPool`].
//!
//! # Posting to coplayers
//!
//! A blocking post waits until every target has dispatched the event or
//! passed over it at its next wait. Shell states make it from inside a
//! heavy transaction, where a coplayer may in turn be blocked submitting
//! an operation that needs the shell's transaction. The shell therefore
//! fires queued operations before posting and keeps firing them while it
//! waits for acknowledgements.
//!
//! # Shutting coplayers down
//!
//! A coplayer blocked on a shell operation never sees its stop signal if
//! the shell is the thread joining it. Retiring a coplayer therefore
//! cancels the operations it queued, repeatedly, until its thread ends.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{select, Receiver, RecvTimeoutError};
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use croupier_core::{
    CoplayerId, CoplayerSet, Event, GameMode, PresentationChannel, ResourceError, SessionId,
    ThemeInfo, TransactionalResource,
};
use croupier_history::ConcurrentHistoryRecorder;

use crate::accumulator::AsyncUpdateAccumulator;
use crate::config::ShellConfig;
use crate::context::{PhaseContext, PhaseServices};
use crate::error::FrameworkError;
use crate::event_queue::{EventQueue, RunnerControl, RunnerQueues};
use crate::operations::TransactionalOperationManager;
use crate::runner::coplayer::{CoplayerCapabilities, CoplayerConfigurator};
use crate::runner::{RunnerCapabilities, RunnerHandle, RunnerReport};
use crate::services::{
    ServiceController, ServiceRegistry, ServiceRequestCatalog, ServiceRequestDataMaps,
};
use crate::state::StateMachine;

/// Framework name of the shell runner.
pub const SHELL_FRAMEWORK: &str = "ShellFramework";

// ── Host sessions ──────────────────────────────────────────────────

/// Host-side resources of one launched coplayer.
#[derive(Clone)]
pub struct CoplayerSession {
    /// Host session handle.
    pub id: SessionId,
    /// The session's transactional resource.
    pub resource: Arc<dyn TransactionalResource>,
    /// The session's presentation channel.
    pub presentation: Arc<dyn PresentationChannel>,
    /// Queues the host posts the session's events to.
    pub queues: RunnerQueues,
}

impl std::fmt::Debug for CoplayerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoplayerSession")
            .field("id", &self.id)
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

/// Host platform session management.
///
/// All calls block until the host finished the corresponding transition.
pub trait HostSessions: Send + Sync {
    /// Create the host session for coplayer `id` running `theme`.
    fn create_session(
        &self,
        id: CoplayerId,
        theme: &ThemeInfo,
    ) -> Result<CoplayerSession, ResourceError>;

    /// Start the session. The host then drives it with lifecycle events
    /// on the session's queues.
    fn launch_session(&self, session: &CoplayerSession) -> Result<(), ResourceError>;

    /// Tear the session down.
    fn destroy_session(&self, id: SessionId) -> Result<(), ResourceError>;
}

// ── Themes ─────────────────────────────────────────────────────────

/// Coplayer configurators and service requests by theme name.
#[derive(Default)]
pub struct ThemeRegistry {
    configurators: IndexMap<String, Arc<dyn CoplayerConfigurator>>,
    requests: ServiceRequestCatalog,
}

impl ThemeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a theme's configurator and service requests.
    pub fn register(
        &mut self,
        theme: impl Into<String>,
        configurator: impl CoplayerConfigurator + 'static,
        requests: ServiceRequestDataMaps,
    ) {
        let theme = theme.into();
        self.requests.insert(theme.clone(), requests);
        self.configurators.insert(theme, Arc::new(configurator));
    }

    /// Returns `true` if `theme` is registered.
    pub fn contains(&self, theme: &str) -> bool {
        self.configurators.contains_key(theme)
    }

    fn resolve(
        &self,
        theme: &ThemeInfo,
    ) -> Result<(Arc<dyn CoplayerConfigurator>, Arc<ServiceRequestDataMaps>), FrameworkError> {
        let configurator = self.configurators.get(&theme.name).cloned().ok_or_else(|| {
            FrameworkError::NoGameConfigurator {
                target: theme.name.clone(),
            }
        })?;
        Ok((configurator, self.requests.for_theme(theme)?))
    }
}

impl std::fmt::Debug for ThemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeRegistry")
            .field("themes", &self.configurators.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── Targets ────────────────────────────────────────────────────────

/// Coplayers an event is routed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoplayerTargets {
    /// A single coplayer.
    One(CoplayerId),
    /// Several coplayers.
    Many(CoplayerSet),
    /// Every running coplayer.
    All,
}

struct Recipient {
    id: CoplayerId,
    queues: RunnerQueues,
    exited: Receiver<()>,
}

// ── CoplayerPool ───────────────────────────────────────────────────

struct CoplayerBinder {
    session: CoplayerSession,
    theme: ThemeInfo,
    runner: RunnerHandle,
}

/// Slot accounting. Ids of shut-down coplayers are reused lowest first.
#[derive(Default)]
struct Slots {
    vacant: Vec<CoplayerId>,
    next: u32,
    in_use: usize,
}

impl Slots {
    fn acquire(&mut self, max: usize) -> Result<CoplayerId, FrameworkError> {
        if self.in_use >= max {
            return Err(FrameworkError::CoplayerLimit { max });
        }
        self.in_use += 1;
        if let Some((pos, _)) = self.vacant.iter().enumerate().min_by_key(|(_, id)| **id) {
            return Ok(self.vacant.swap_remove(pos));
        }
        let id = CoplayerId(self.next);
        self.next += 1;
        Ok(id)
    }

    fn release(&mut self, id: CoplayerId) {
        self.in_use = self.in_use.saturating_sub(1);
        self.vacant.push(id);
    }
}

/// Running coplayers of one shell.
pub struct CoplayerPool {
    binders: Mutex<IndexMap<CoplayerId, CoplayerBinder>>,
    slots: Mutex<Slots>,
    sessions: Arc<dyn HostSessions>,
    themes: ThemeRegistry,
    registry: Arc<ServiceRegistry>,
    shell_history: Arc<ConcurrentHistoryRecorder>,
    shell_operations: Arc<TransactionalOperationManager>,
    shell_queue: EventQueue,
    config: ShellConfig,
}

impl CoplayerPool {
    fn binders(&self) -> MutexGuard<'_, IndexMap<CoplayerId, CoplayerBinder>> {
        self.binders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a coplayer running `theme` and return its slot id.
    pub fn start_coplayer(&self, theme: ThemeInfo) -> Result<CoplayerId, FrameworkError> {
        let resolved = self.themes.resolve(&theme)?;
        let id = self.slots().acquire(self.config.max_coplayers)?;
        match self.launch(id, theme, resolved) {
            Ok(binder) => {
                self.binders().insert(id, binder);
                Ok(id)
            }
            Err(e) => {
                self.slots().release(id);
                Err(e)
            }
        }
    }

    /// Replace the coplayer in slot `id` with one running `theme`. The
    /// slot id is kept.
    pub fn switch_coplayer(&self, id: CoplayerId, theme: ThemeInfo) -> Result<(), FrameworkError> {
        let resolved = self.themes.resolve(&theme)?;
        let binder = self
            .binders()
            .shift_remove(&id)
            .ok_or(FrameworkError::UnknownCoplayer { id })?;
        info!(coplayer = %id, from = %binder.theme, to = %theme, "switching coplayer theme");
        if let Err(e) = self.retire(id, binder) {
            warn!(coplayer = %id, error = %e, "previous coplayer ended with an error");
        }
        match self.launch(id, theme, resolved) {
            Ok(binder) => {
                self.binders().insert(id, binder);
                Ok(())
            }
            Err(e) => {
                self.slots().release(id);
                Err(e)
            }
        }
    }

    /// Stop the coplayer in slot `id`, destroy its session and free the
    /// slot. Returns the coplayer runner's report.
    pub fn shutdown_coplayer(&self, id: CoplayerId) -> Result<RunnerReport, FrameworkError> {
        let binder = self
            .binders()
            .shift_remove(&id)
            .ok_or(FrameworkError::UnknownCoplayer { id })?;
        let result = self.retire(id, binder);
        self.slots().release(id);
        info!(coplayer = %id, "coplayer shut down");
        result
    }

    /// Shut every coplayer down.
    pub fn shutdown_all(&self) {
        for id in self.running() {
            if let Err(e) = self.shutdown_coplayer(id) {
                warn!(coplayer = %id, error = %e, "coplayer ended with an error");
            }
        }
    }

    /// Slot ids of running coplayers, in start order.
    pub fn running(&self) -> Vec<CoplayerId> {
        self.binders().keys().copied().collect()
    }

    /// Number of running coplayers.
    pub fn len(&self) -> usize {
        self.binders().len()
    }

    /// Returns `true` if no coplayer runs.
    pub fn is_empty(&self) -> bool {
        self.binders().is_empty()
    }

    /// Theme of the coplayer in slot `id`.
    pub fn theme_of(&self, id: CoplayerId) -> Option<ThemeInfo> {
        self.binders().get(&id).map(|b| b.theme.clone())
    }

    /// Host session of the coplayer in slot `id`.
    pub fn session_of(&self, id: CoplayerId) -> Option<SessionId> {
        self.binders().get(&id).map(|b| b.session.id)
    }

    /// Returns `true` once the runner thread of slot `id` has ended.
    pub fn is_finished(&self, id: CoplayerId) -> Option<bool> {
        self.binders().get(&id).map(|b| b.runner.is_finished())
    }

    /// Enqueue `event` for `targets` without waiting. Returns the number
    /// of coplayers it was posted to.
    pub fn post_event(
        &self,
        targets: &CoplayerTargets,
        event: Event,
    ) -> Result<usize, FrameworkError> {
        let recipients = self.recipients(targets)?;
        for recipient in &recipients {
            recipient.queues.host_non_transactional.post(event.clone());
        }
        Ok(recipients.len())
    }

    /// Enqueue `event` for `targets` and wait until each has dispatched
    /// it or passed over it.
    ///
    /// Queued shell operations are fired before posting and whenever new
    /// ones arrive during the wait. A target whose thread ended stops
    /// being waited on.
    pub fn post_event_blocking(
        &self,
        targets: &CoplayerTargets,
        event: Event,
        resource: &dyn TransactionalResource,
    ) -> Result<usize, FrameworkError> {
        let fired = self.shell_operations.fire_queued_operations(resource);
        if fired > 0 {
            debug!(fired, "fired coplayer operations before blocking post");
        }

        let recipients = self.recipients(targets)?;
        let pending: Vec<_> = recipients
            .iter()
            .map(|r| (r, r.queues.host_transactional.post_with_ack(event.clone())))
            .collect();
        let ops_wake = self.shell_operations.signal().waker();
        for (recipient, ack) in pending {
            self.await_ack(recipient, &ack, ops_wake, resource);
        }
        Ok(recipients.len())
    }

    fn await_ack(
        &self,
        recipient: &Recipient,
        ack: &Receiver<()>,
        ops_wake: &Receiver<()>,
        resource: &dyn TransactionalResource,
    ) {
        loop {
            select! {
                recv(ack) -> delivered => {
                    if delivered.is_err() {
                        warn!(coplayer = %recipient.id, "event dropped before dispatch");
                    }
                    return;
                }
                recv(ops_wake) -> _ => {
                    let fired = self.shell_operations.fire_queued_operations(resource);
                    debug!(coplayer = %recipient.id, fired, "fired coplayer operations during blocking post");
                }
                recv(recipient.exited) -> _ => {
                    // The ack may have raced the thread's exit.
                    if ack.try_recv().is_err() {
                        warn!(coplayer = %recipient.id, "coplayer ended before acknowledging event");
                    }
                    return;
                }
            }
        }
    }

    fn recipients(&self, targets: &CoplayerTargets) -> Result<Vec<Recipient>, FrameworkError> {
        let binders = self.binders();
        let recipient = |id: CoplayerId| -> Result<Recipient, FrameworkError> {
            let binder = binders.get(&id).ok_or(FrameworkError::UnknownCoplayer { id })?;
            Ok(Recipient {
                id,
                queues: binder.session.queues.clone(),
                exited: binder.runner.exit_notice(),
            })
        };
        match targets {
            CoplayerTargets::One(id) => Ok(vec![recipient(*id)?]),
            CoplayerTargets::Many(ids) => ids.iter().map(|&id| recipient(id)).collect(),
            CoplayerTargets::All => binders.keys().map(|&id| recipient(id)).collect(),
        }
    }

    fn launch(
        &self,
        id: CoplayerId,
        theme: ThemeInfo,
        (configurator, requests): (Arc<dyn CoplayerConfigurator>, Arc<ServiceRequestDataMaps>),
    ) -> Result<CoplayerBinder, FrameworkError> {
        let session = self.sessions.create_session(id, &theme)?;
        let caps = CoplayerCapabilities {
            id,
            theme: theme.clone(),
            session: session.clone(),
            configurator,
            requests,
            registry: Arc::clone(&self.registry),
            shell_history: Arc::clone(&self.shell_history),
            shell_operations: Arc::clone(&self.shell_operations),
            shell_queue: self.shell_queue.clone(),
            history: self.config.history.clone(),
        };
        let spawned = RunnerHandle::spawn(
            caps,
            self.config.coplayer_runner(id),
            session.queues.clone(),
        );
        let runner = match spawned {
            Ok(runner) => runner,
            Err(e) => {
                self.destroy_session(id, session.id);
                return Err(e);
            }
        };
        if let Err(e) = self.sessions.launch_session(&session) {
            drop(runner);
            self.destroy_session(id, session.id);
            return Err(e.into());
        }
        info!(coplayer = %id, theme = %theme, session = %session.id, "coplayer started");
        Ok(CoplayerBinder {
            session,
            theme,
            runner,
        })
    }

    /// Stop and join the binder's runner, then destroy its session.
    ///
    /// Operations the coplayer queued for the shell are cancelled until
    /// its thread has ended, so this is safe to call from the shell thread.
    fn retire(&self, id: CoplayerId, binder: CoplayerBinder) -> Result<RunnerReport, FrameworkError> {
        let CoplayerBinder {
            session, runner, ..
        } = binder;
        runner.request_stop();
        let exited = runner.exit_notice();
        loop {
            self.shell_operations.cancel_operations_from(id);
            match exited.recv_timeout(self.config.retire_poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let result = runner.join();
        self.destroy_session(id, session.id);
        result
    }

    fn destroy_session(&self, id: CoplayerId, session: SessionId) {
        if let Err(e) = self.sessions.destroy_session(session) {
            warn!(coplayer = %id, %session, error = %e, "failed to destroy host session");
        }
    }
}

impl Drop for CoplayerPool {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

impl std::fmt::Debug for CoplayerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoplayerPool")
            .field("running", &self.running())
            .field("themes", &self.themes)
            .finish_non_exhaustive()
    }
}

// ── ShellServices ──────────────────────────────────────────────────

/// Phase services of the shell framework.
pub struct ShellServices {
    pool: Arc<CoplayerPool>,
    history: Arc<ConcurrentHistoryRecorder>,
    operations: Arc<TransactionalOperationManager>,
}

impl ShellServices {
    /// The coplayer pool.
    pub fn pool(&self) -> &Arc<CoplayerPool> {
        &self.pool
    }

    /// The shell history recorder coplayers pair their records with.
    pub fn history(&self) -> &Arc<ConcurrentHistoryRecorder> {
        &self.history
    }

    /// Operations coplayers queued for the shell's transactions.
    pub fn operations(&self) -> &Arc<TransactionalOperationManager> {
        &self.operations
    }
}

impl PhaseServices for ShellServices {
    fn on_presentation_started(
        &mut self,
        state: &str,
        data: &croupier_core::DataItems,
        _resource: &dyn TransactionalResource,
    ) -> Result<(), FrameworkError> {
        self.history.start_presentation_state(state, data);
        Ok(())
    }
}

impl std::fmt::Debug for ShellServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellServices")
            .field("pool", &self.pool)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

impl PhaseContext<'_, ShellServices> {
    /// Post `event` to `targets` and wait until each has dequeued it.
    ///
    /// Only legal inside a heavy transaction. Coplayer operations queued
    /// for the shell are fired before and during the wait.
    pub fn post_event_to_coplayers_blocking(
        &mut self,
        targets: &CoplayerTargets,
        event: Event,
    ) -> Result<usize, FrameworkError> {
        self.require_heavy("post_event_to_coplayers_blocking")?;
        let resource = Arc::clone(&self.host().resource);
        self.services()
            .pool
            .post_event_blocking(targets, event, resource.as_ref())
    }

    /// Enqueue `event` for `targets` without waiting.
    pub fn post_event_to_coplayers(
        &mut self,
        targets: &CoplayerTargets,
        event: Event,
    ) -> Result<usize, FrameworkError> {
        self.services().pool.post_event(targets, event)
    }
}

// ── Shell runner ───────────────────────────────────────────────────

/// Builds the shell's play-mode state machine.
pub trait ShellConfigurator: Send + Sync {
    /// State machine for the shell in `mode`.
    fn configure(&self, mode: GameMode) -> Result<StateMachine<ShellServices>, FrameworkError>;
}

impl<F> ShellConfigurator for F
where
    F: Fn(GameMode) -> Result<StateMachine<ShellServices>, FrameworkError> + Send + Sync,
{
    fn configure(&self, mode: GameMode) -> Result<StateMachine<ShellServices>, FrameworkError> {
        self(mode)
    }
}

struct ShellCapabilities {
    resource: Arc<dyn TransactionalResource>,
    presentation: Arc<dyn PresentationChannel>,
    configurator: Arc<dyn ShellConfigurator>,
    pool: Arc<CoplayerPool>,
    history: Arc<ConcurrentHistoryRecorder>,
    operations: Arc<TransactionalOperationManager>,
    registry: Arc<ServiceRegistry>,
    requests: Option<Arc<ServiceRequestDataMaps>>,
}

impl RunnerCapabilities for ShellCapabilities {
    type Context = ShellServices;

    fn framework_name(&self) -> &str {
        SHELL_FRAMEWORK
    }

    fn resource(&self) -> Arc<dyn TransactionalResource> {
        Arc::clone(&self.resource)
    }

    fn presentation(&self) -> Arc<dyn PresentationChannel> {
        Arc::clone(&self.presentation)
    }

    fn create_state_machine(
        &mut self,
        mode: GameMode,
    ) -> Result<StateMachine<ShellServices>, FrameworkError> {
        self.configurator.configure(mode)
    }

    fn create_context(&mut self, _mode: GameMode) -> Result<ShellServices, FrameworkError> {
        Ok(ShellServices {
            pool: Arc::clone(&self.pool),
            history: Arc::clone(&self.history),
            operations: Arc::clone(&self.operations),
        })
    }

    fn service_controller(
        &mut self,
        mode: GameMode,
        sink: AsyncUpdateAccumulator,
    ) -> Result<Option<Arc<ServiceController>>, FrameworkError> {
        Ok(self.requests.as_ref().map(|requests| {
            ServiceController::new(Arc::clone(&self.registry), Arc::clone(requests), mode, sink)
        }))
    }

    fn operations(&self) -> Option<Arc<TransactionalOperationManager>> {
        Some(Arc::clone(&self.operations))
    }

    fn on_shutdown(&mut self) {
        self.pool.shutdown_all();
    }
}

/// Everything needed to start a shell.
pub struct ShellSetup {
    config: ShellConfig,
    resource: Arc<dyn TransactionalResource>,
    presentation: Arc<dyn PresentationChannel>,
    sessions: Arc<dyn HostSessions>,
    configurator: Option<Arc<dyn ShellConfigurator>>,
    themes: ThemeRegistry,
    registry: Arc<ServiceRegistry>,
    requests: Option<ServiceRequestDataMaps>,
}

impl ShellSetup {
    /// Setup over the shell's host resource, presentation and session
    /// manager, with default config and no themes.
    pub fn new(
        resource: Arc<dyn TransactionalResource>,
        presentation: Arc<dyn PresentationChannel>,
        sessions: Arc<dyn HostSessions>,
    ) -> Self {
        Self {
            config: ShellConfig::default(),
            resource,
            presentation,
            sessions,
            configurator: None,
            themes: ThemeRegistry::new(),
            registry: Arc::new(ServiceRegistry::new()),
            requests: None,
        }
    }

    /// Replace the config.
    pub fn config(mut self, config: ShellConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the shell's state machine configurator.
    pub fn configurator(mut self, configurator: impl ShellConfigurator + 'static) -> Self {
        self.configurator = Some(Arc::new(configurator));
        self
    }

    /// Register a coplayer theme.
    pub fn theme(
        mut self,
        theme: impl Into<String>,
        configurator: impl CoplayerConfigurator + 'static,
        requests: ServiceRequestDataMaps,
    ) -> Self {
        self.themes.register(theme, configurator, requests);
        self
    }

    /// Share `registry` between the shell and its coplayers.
    pub fn service_registry(mut self, registry: Arc<ServiceRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Service requests of the shell's own states.
    pub fn service_requests(mut self, requests: ServiceRequestDataMaps) -> Self {
        self.requests = Some(requests);
        self
    }

    /// Validate and start the shell runner thread.
    pub fn spawn(self) -> Result<ShellRuntime, FrameworkError> {
        self.config.validate()?;
        let configurator = self
            .configurator
            .ok_or_else(|| FrameworkError::NoGameConfigurator {
                target: "shell".to_string(),
            })?;

        let queues = RunnerQueues::new();
        let history = Arc::new(ConcurrentHistoryRecorder::new());
        let operations = Arc::new(TransactionalOperationManager::new());
        let pool = Arc::new(CoplayerPool {
            binders: Mutex::new(IndexMap::new()),
            slots: Mutex::new(Slots::default()),
            sessions: self.sessions,
            themes: self.themes,
            registry: Arc::clone(&self.registry),
            shell_history: Arc::clone(&history),
            shell_operations: Arc::clone(&operations),
            shell_queue: queues.peer.clone(),
            config: self.config.clone(),
        });

        let caps = ShellCapabilities {
            resource: self.resource,
            presentation: self.presentation,
            configurator,
            pool: Arc::clone(&pool),
            history: Arc::clone(&history),
            operations: Arc::clone(&operations),
            registry: self.registry,
            requests: self.requests.map(Arc::new),
        };
        let runner = RunnerHandle::spawn(caps, self.config.runner.clone(), queues)?;
        Ok(ShellRuntime {
            runner,
            pool,
            history,
            operations,
        })
    }
}

/// A running shell.
pub struct ShellRuntime {
    runner: RunnerHandle,
    pool: Arc<CoplayerPool>,
    history: Arc<ConcurrentHistoryRecorder>,
    operations: Arc<TransactionalOperationManager>,
}

impl ShellRuntime {
    /// The shell's input queues.
    pub fn queues(&self) -> &RunnerQueues {
        self.runner.queues()
    }

    /// The shell runner's control block.
    pub fn control(&self) -> &Arc<RunnerControl> {
        self.runner.control()
    }

    /// The coplayer pool.
    pub fn pool(&self) -> &Arc<CoplayerPool> {
        &self.pool
    }

    /// The shell history recorder.
    pub fn history(&self) -> &Arc<ConcurrentHistoryRecorder> {
        &self.history
    }

    /// Operations coplayers queued for the shell.
    pub fn operations(&self) -> &Arc<TransactionalOperationManager> {
        &self.operations
    }

    /// Returns `true` once the shell thread has ended.
    pub fn is_finished(&self) -> bool {
        self.runner.is_finished()
    }

    /// Stop the shell, shut every coplayer down and join the shell thread.
    pub fn shutdown(self) -> Result<RunnerReport, FrameworkError> {
        let result = self.runner.join();
        self.pool.shutdown_all();
        result
    }
}

impl std::fmt::Debug for ShellRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellRuntime")
            .field("runner", &self.runner)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_reuse_lowest_vacant_id() {
        let mut slots = Slots::default();
        let a = slots.acquire(3).unwrap();
        let b = slots.acquire(3).unwrap();
        let c = slots.acquire(3).unwrap();
        assert_eq!((a, b, c), (CoplayerId(0), CoplayerId(1), CoplayerId(2)));
        assert!(matches!(
            slots.acquire(3),
            Err(FrameworkError::CoplayerLimit { max: 3 })
        ));

        slots.release(c);
        slots.release(a);
        assert_eq!(slots.acquire(3).unwrap(), CoplayerId(0));
        assert_eq!(slots.acquire(3).unwrap(), CoplayerId(2));
    }

    #[test]
    fn unknown_theme_needs_a_configurator() {
        let registry = ThemeRegistry::new();
        let err = registry.resolve(&ThemeInfo::new("Dragons")).err().unwrap();
        assert!(matches!(err, FrameworkError::NoGameConfigurator { target } if target == "Dragons"));
    }
}
