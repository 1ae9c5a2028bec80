//! Integration tests: runner threads, host lifecycle bridging, the
//! coplayer pool and the deadlock-free blocking post.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use croupier_core::keys;
use croupier_core::{
    CoplayerId, CriticalDataBlock, Event, GameMode, LifecycleEvent, PlatformEvent,
    PresentationChannel, ResourceError, SessionId, StepControl, ThemeInfo, TransactionalResource,
};
use croupier_engine::operations::EXECUTE_QUEUED_OPERATIONS;
use croupier_engine::{
    CoplayerServices, CoplayerSession, CoplayerTargets, FrameworkError, GameState, HostSessions,
    PhaseContext, PhaseServices, RunnerCapabilities, RunnerConfig, RunnerHandle, RunnerQueues,
    ServiceRequestDataMaps, ShellConfig, ShellServices, ShellSetup, StateMachine,
    TransactionalOperationManager,
};
use croupier_test_utils::fixtures::items;
use croupier_test_utils::{InMemoryResource, PresentationCall, RecordingPresentation};

type Log = Arc<Mutex<Vec<String>>>;

// ── Helpers ─────────────────────────────────────────────────────

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn platform(name: &str) -> Event {
    Event::Platform(PlatformEvent::named(name))
}

fn is_platform(event: &Event, name: &str) -> bool {
    matches!(event, Event::Platform(p) if p.name == name)
}

/// Presents itself, then waits for a `"Leave"` platform event.
struct Lobby;

impl<C: PhaseServices> GameState<C> for Lobby {
    fn name(&self) -> &str {
        "Lobby"
    }

    fn committed_pre_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        ctx.start_presentation(&items(&[("Lobby", "Seats", 4)]))?;
        Ok(StepControl::GoNext)
    }

    fn committed_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        let left = ctx.wait_for(|_, event| is_platform(event, "Leave"))?;
        Ok(if left.is_some() {
            StepControl::GoNext
        } else {
            StepControl::RepeatWait
        })
    }

    fn committed_post_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        ctx.set_next_state("Lobby");
        Ok(StepControl::ExitState)
    }
}

fn lobby<C: PhaseServices + 'static>() -> Result<StateMachine<C>, FrameworkError> {
    StateMachine::builder("Lobby")
        .state(Lobby)
        .initial_state("Lobby")
        .build()
}

struct TestCaps {
    resource: Arc<InMemoryResource>,
    presentation: Arc<RecordingPresentation>,
    operations: Option<Arc<TransactionalOperationManager>>,
}

impl TestCaps {
    fn new() -> Self {
        Self {
            resource: Arc::new(InMemoryResource::new()),
            presentation: Arc::new(RecordingPresentation::new()),
            operations: None,
        }
    }
}

impl RunnerCapabilities for TestCaps {
    type Context = ();

    fn framework_name(&self) -> &str {
        "TestRunner"
    }

    fn resource(&self) -> Arc<dyn TransactionalResource> {
        Arc::clone(&self.resource) as Arc<dyn TransactionalResource>
    }

    fn presentation(&self) -> Arc<dyn PresentationChannel> {
        Arc::clone(&self.presentation) as Arc<dyn PresentationChannel>
    }

    fn create_state_machine(&mut self, _mode: GameMode) -> Result<StateMachine<()>, FrameworkError> {
        lobby()
    }

    fn create_context(&mut self, _mode: GameMode) -> Result<(), FrameworkError> {
        Ok(())
    }

    fn operations(&self) -> Option<Arc<TransactionalOperationManager>> {
        self.operations.clone()
    }
}

fn spawn(caps: TestCaps) -> RunnerHandle {
    RunnerHandle::spawn(caps, RunnerConfig::named("test-runner"), RunnerQueues::new()).unwrap()
}

// ── Runner lifecycle ────────────────────────────────────────────

#[test]
fn activate_then_inactivate_tears_down_and_notifies() {
    let caps = TestCaps::new();
    let presentation = Arc::clone(&caps.presentation);
    let runner = spawn(caps);

    runner
        .queues()
        .post_lifecycle(LifecycleEvent::ActivateContext { mode: GameMode::Play });
    assert!(eventually(|| presentation.started_states() == vec!["Lobby"]));

    runner.queues().post_lifecycle(LifecycleEvent::InactivateContext);
    assert!(eventually(|| presentation
        .calls()
        .contains(&PresentationCall::ContextExited(GameMode::Play))));

    let report = runner.join().unwrap();
    assert_eq!(report.frameworks_built, 1);
    assert!(report.ticks >= 2);
}

#[test]
fn new_context_rebuilds_the_framework() {
    let caps = TestCaps::new();
    let presentation = Arc::clone(&caps.presentation);
    let runner = spawn(caps);
    let queues = runner.queues().clone();

    queues.post_lifecycle(LifecycleEvent::ActivateContext { mode: GameMode::Play });
    assert!(eventually(|| presentation.started_states().len() == 1));

    queues.post_lifecycle(LifecycleEvent::NewContext);
    queues.post_lifecycle(LifecycleEvent::ActivateContext { mode: GameMode::Play });
    assert!(eventually(|| presentation.started_states().len() == 2));
    assert!(!presentation
        .calls()
        .iter()
        .any(|c| matches!(c, PresentationCall::ContextExited(_))));

    assert_eq!(runner.join().unwrap().frameworks_built, 2);
}

#[test]
fn history_mode_runs_the_replay_machine() {
    let caps = TestCaps::new();
    let presentation = Arc::clone(&caps.presentation);
    let runner = spawn(caps);

    runner
        .queues()
        .post_lifecycle(LifecycleEvent::ActivateContext {
            mode: GameMode::History,
        });
    assert!(eventually(|| presentation.started_states() == vec!["HistoryReplay"]));
    runner.join().unwrap();
}

#[test]
fn utility_mode_is_fatal() {
    let runner = spawn(TestCaps::new());
    runner
        .queues()
        .post_lifecycle(LifecycleEvent::ActivateContext {
            mode: GameMode::Utility,
        });
    assert!(eventually(|| runner.is_finished()));
    assert!(matches!(
        runner.join(),
        Err(FrameworkError::UnsupportedGameMode {
            mode: GameMode::Utility
        })
    ));
}

#[test]
fn queued_operations_interrupt_the_wait_and_run_in_their_own_transaction() {
    let mut caps = TestCaps::new();
    let ops = Arc::new(TransactionalOperationManager::new());
    caps.operations = Some(Arc::clone(&ops));
    let resource = Arc::clone(&caps.resource);
    let presentation = Arc::clone(&caps.presentation);
    let runner = spawn(caps);

    runner
        .queues()
        .post_lifecycle(LifecycleEvent::ActivateContext { mode: GameMode::Play });
    assert!(eventually(|| presentation.started_states().len() == 1));

    let ticket = ops.submit("Credit", |res: &dyn TransactionalResource| {
        res.write_critical_data(&CriticalDataBlock::new().with("Credited", vec![1]))
            .is_ok()
    });
    assert_eq!(ticket.wait_timeout(Duration::from_secs(5)), Some(Ok(true)));
    assert!(resource.contains("Credited"));
    assert!(resource
        .opened_transaction_names()
        .contains(&EXECUTE_QUEUED_OPERATIONS.to_string()));

    runner.join().unwrap();
}

#[test]
fn dropping_the_handle_stops_an_idle_runner() {
    let runner = spawn(TestCaps::new());
    let control = Arc::clone(runner.control());
    drop(runner);
    assert!(control.stop.is_set());
}

// ── Shell and coplayers ─────────────────────────────────────────

struct SessionRecord {
    coplayer: CoplayerId,
    session: SessionId,
    resource: Arc<InMemoryResource>,
}

#[derive(Default)]
struct FakeSessions {
    next: AtomicU64,
    created: Mutex<Vec<SessionRecord>>,
    destroyed: Mutex<Vec<SessionId>>,
}

impl FakeSessions {
    fn session_of(&self, coplayer: CoplayerId) -> Option<SessionId> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.coplayer == coplayer)
            .map(|r| r.session)
    }

    fn resource_of(&self, coplayer: CoplayerId) -> Option<Arc<InMemoryResource>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.coplayer == coplayer)
            .map(|r| Arc::clone(&r.resource))
    }

    fn destroyed(&self) -> Vec<SessionId> {
        self.destroyed.lock().unwrap().clone()
    }
}

impl HostSessions for FakeSessions {
    fn create_session(
        &self,
        id: CoplayerId,
        _theme: &ThemeInfo,
    ) -> Result<CoplayerSession, ResourceError> {
        let session = SessionId(self.next.fetch_add(1, Ordering::SeqCst));
        let resource = Arc::new(InMemoryResource::new());
        self.created.lock().unwrap().push(SessionRecord {
            coplayer: id,
            session,
            resource: Arc::clone(&resource),
        });
        Ok(CoplayerSession {
            id: session,
            resource,
            presentation: Arc::new(RecordingPresentation::new()),
            queues: RunnerQueues::new(),
        })
    }

    fn launch_session(&self, session: &CoplayerSession) -> Result<(), ResourceError> {
        session
            .queues
            .post_lifecycle(LifecycleEvent::ActivateContext { mode: GameMode::Play });
        Ok(())
    }

    fn destroy_session(&self, id: SessionId) -> Result<(), ResourceError> {
        self.destroyed.lock().unwrap().push(id);
        Ok(())
    }
}

fn shell_machine(_mode: GameMode) -> Result<StateMachine<ShellServices>, FrameworkError> {
    lobby()
}

fn coplayer_lobby(_theme: &ThemeInfo) -> Result<StateMachine<CoplayerServices>, FrameworkError> {
    lobby()
}

fn shell_setup(sessions: &Arc<FakeSessions>) -> ShellSetup {
    ShellSetup::new(
        Arc::new(InMemoryResource::new()),
        Arc::new(RecordingPresentation::new()),
        Arc::clone(sessions) as Arc<dyn HostSessions>,
    )
    .configurator(shell_machine)
    .theme("Dragons", coplayer_lobby, ServiceRequestDataMaps::default())
    .theme("Wolves", coplayer_lobby, ServiceRequestDataMaps::default())
}

#[test]
fn shell_without_configurator_is_rejected() {
    let result = ShellSetup::new(
        Arc::new(InMemoryResource::new()),
        Arc::new(RecordingPresentation::new()),
        Arc::new(FakeSessions::default()),
    )
    .spawn();
    assert!(matches!(
        result,
        Err(FrameworkError::NoGameConfigurator { target }) if target == "shell"
    ));
}

#[test]
fn pool_starts_switches_and_recycles_ids() {
    let sessions = Arc::new(FakeSessions::default());
    let config = ShellConfig {
        max_coplayers: 2,
        ..ShellConfig::default()
    };
    let shell = shell_setup(&sessions).config(config).spawn().unwrap();
    let pool = Arc::clone(shell.pool());

    let first = pool.start_coplayer(ThemeInfo::new("Dragons")).unwrap();
    let second = pool.start_coplayer(ThemeInfo::new("Dragons")).unwrap();
    assert_eq!((first, second), (CoplayerId(0), CoplayerId(1)));
    assert!(matches!(
        pool.start_coplayer(ThemeInfo::new("Dragons")),
        Err(FrameworkError::CoplayerLimit { max: 2 })
    ));
    assert!(matches!(
        pool.start_coplayer(ThemeInfo::new("Goblins")),
        Err(FrameworkError::NoGameConfigurator { target }) if target == "Goblins"
    ));

    let old_session = sessions.session_of(second).unwrap();
    pool.switch_coplayer(second, ThemeInfo::new("Wolves")).unwrap();
    assert_eq!(pool.theme_of(second), Some(ThemeInfo::new("Wolves")));
    assert!(sessions.destroyed().contains(&old_session));
    assert_ne!(pool.session_of(second), Some(old_session));

    let first_session = sessions.session_of(first).unwrap();
    pool.shutdown_coplayer(first).unwrap();
    assert!(sessions.destroyed().contains(&first_session));
    assert_eq!(pool.running(), vec![second]);
    assert!(matches!(
        pool.shutdown_coplayer(first),
        Err(FrameworkError::UnknownCoplayer { id }) if id == first
    ));

    assert_eq!(pool.start_coplayer(ThemeInfo::new("Dragons")).unwrap(), CoplayerId(0));

    shell.shutdown().unwrap();
    assert!(pool.is_empty());
}

#[test]
fn non_blocking_post_reaches_every_coplayer() {
    let sessions = Arc::new(FakeSessions::default());
    let shell = shell_setup(&sessions).spawn().unwrap();
    let pool = Arc::clone(shell.pool());
    let a = pool.start_coplayer(ThemeInfo::new("Dragons")).unwrap();
    let b = pool.start_coplayer(ThemeInfo::new("Wolves")).unwrap();

    assert_eq!(pool.post_event(&CoplayerTargets::All, platform("Leave")).unwrap(), 2);
    assert!(matches!(
        pool.post_event(&CoplayerTargets::One(CoplayerId(9)), platform("Leave")),
        Err(FrameworkError::UnknownCoplayer { .. })
    ));

    for id in [a, b] {
        let resource = sessions.resource_of(id).unwrap();
        assert!(eventually(|| resource
            .opened_transaction_names()
            .contains(&"Lobby.CommittedPostWait".to_string())));
    }
    shell.shutdown().unwrap();
}

/// Coplayer state that needs the shell's transaction before it can wait.
/// With a gate, it submits only once the gate opens.
struct Creditor {
    log: Log,
    gate: Option<Arc<AtomicBool>>,
}

impl GameState<CoplayerServices> for Creditor {
    fn name(&self) -> &str {
        "Credit"
    }

    fn processing(
        &mut self,
        ctx: &mut PhaseContext<'_, CoplayerServices>,
    ) -> Result<StepControl, FrameworkError> {
        if let Some(gate) = &self.gate {
            assert!(eventually(|| gate.load(Ordering::SeqCst)));
        }
        let ticket = ctx
            .services()
            .submit_to_shell("CreditBank", |res: &dyn TransactionalResource| {
                res.write_critical_data(&CriticalDataBlock::new().with("Credited", vec![1]))
                    .map(|_| 42)
            });
        let credited = ticket.wait();
        self.log.lock().unwrap().push(format!("credited {credited:?}"));
        Ok(StepControl::GoNext)
    }

    fn committed_pre_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, CoplayerServices>,
    ) -> Result<StepControl, FrameworkError> {
        ctx.start_presentation(&items(&[("Bank", "Credited", 42)]))?;
        Ok(StepControl::GoNext)
    }

    fn committed_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, CoplayerServices>,
    ) -> Result<StepControl, FrameworkError> {
        match ctx.wait_for(|_, event| is_platform(event, "Broadcast"))? {
            Some(_) => {
                self.log.lock().unwrap().push("broadcast".into());
                Ok(StepControl::GoNext)
            }
            None => Ok(StepControl::RepeatWait),
        }
    }

    fn committed_post_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, CoplayerServices>,
    ) -> Result<StepControl, FrameworkError> {
        ctx.set_next_state("Credit");
        Ok(StepControl::ExitState)
    }
}

#[test]
fn blocking_post_fires_queued_operations_first() {
    let sessions = Arc::new(FakeSessions::default());
    let log = Log::default();
    let coplayer_log = Arc::clone(&log);
    let shell_resource = Arc::new(InMemoryResource::new());
    let shell = ShellSetup::new(
        Arc::clone(&shell_resource) as Arc<dyn TransactionalResource>,
        Arc::new(RecordingPresentation::new()),
        Arc::clone(&sessions) as Arc<dyn HostSessions>,
    )
    .configurator(shell_machine)
    .theme(
        "Dragons",
        move |_: &ThemeInfo| {
            StateMachine::builder("Dragons")
                .state(Creditor {
                    log: Arc::clone(&coplayer_log),
                    gate: None,
                })
                .initial_state("Credit")
                .build()
        },
        ServiceRequestDataMaps::default(),
    )
    .spawn()
    .unwrap();
    shell
        .history()
        .start_presentation_state("ShellIdle", &items(&[("Bank", "Credits", 100)]));

    let id = shell.pool().start_coplayer(ThemeInfo::new("Dragons")).unwrap();
    // The coplayer is now blocked inside its Processing transaction.
    assert!(eventually(|| shell.operations().pending_count() == 1));

    let posted = shell_resource.in_transaction(|| {
        shell.pool().post_event_blocking(
            &CoplayerTargets::One(id),
            platform("Broadcast"),
            shell_resource.as_ref(),
        )
    });
    assert_eq!(posted.unwrap(), 1);
    assert!(shell_resource.contains("Credited"));

    assert!(eventually(|| log.lock().unwrap().len() == 2));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["credited Ok(Ok(42))".to_string(), "broadcast".to_string()]
    );

    // The coplayer's next transition closes history step 1.
    let coplayer_resource = sessions.resource_of(id).unwrap();
    assert!(eventually(|| coplayer_resource.contains(&keys::coplayer_step(1))));
    assert!(coplayer_resource.contains(&keys::shell_step(1)));

    shell.shutdown().unwrap();
}

#[test]
fn blocking_post_returns_once_the_coplayer_passes_over_the_event() {
    let sessions = Arc::new(FakeSessions::default());
    let shell_resource = Arc::new(InMemoryResource::new());
    let shell = ShellSetup::new(
        Arc::clone(&shell_resource) as Arc<dyn TransactionalResource>,
        Arc::new(RecordingPresentation::new()),
        Arc::clone(&sessions) as Arc<dyn HostSessions>,
    )
    .configurator(shell_machine)
    .theme("Dragons", coplayer_lobby, ServiceRequestDataMaps::default())
    .spawn()
    .unwrap();
    let id = shell.pool().start_coplayer(ThemeInfo::new("Dragons")).unwrap();

    // The lobby only accepts "Leave"; "Tilt" is never dispatched.
    let (tx, rx) = crossbeam_channel::bounded(1);
    let poster = {
        let pool = Arc::clone(shell.pool());
        let resource = Arc::clone(&shell_resource);
        thread::spawn(move || {
            let posted = resource.in_transaction(|| {
                pool.post_event_blocking(
                    &CoplayerTargets::One(id),
                    platform("Tilt"),
                    resource.as_ref(),
                )
            });
            let _ = tx.send(posted.map_err(|e| e.to_string()));
        })
    };
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(Ok(1)));
    poster.join().unwrap();

    // The lobby still leaves on the event it waits for.
    shell
        .pool()
        .post_event(&CoplayerTargets::One(id), platform("Leave"))
        .unwrap();
    let resource = sessions.resource_of(id).unwrap();
    assert!(eventually(|| resource
        .opened_transaction_names()
        .contains(&"Lobby.CommittedPostWait".to_string())));

    shell.shutdown().unwrap();
}

/// Shell state that broadcasts from inside its heavy Processing once a
/// coplayer is blocked on a shell operation, then tries again from its
/// untransacted wait.
struct Announcer {
    log: Log,
    coplayer_log: Log,
    gate: Arc<AtomicBool>,
    retried: bool,
}

impl GameState<ShellServices> for Announcer {
    fn name(&self) -> &str {
        "Announce"
    }

    fn processing(
        &mut self,
        ctx: &mut PhaseContext<'_, ShellServices>,
    ) -> Result<StepControl, FrameworkError> {
        self.gate.store(true, Ordering::SeqCst);
        let operations = Arc::clone(ctx.services().operations());
        assert!(eventually(|| operations.pending_count() > 0));
        let posted =
            ctx.post_event_to_coplayers_blocking(&CoplayerTargets::All, platform("Broadcast"));
        let seen = self.coplayer_log.lock().unwrap().clone();
        self.log
            .lock()
            .unwrap()
            .push(format!("posted {posted:?} after {seen:?}"));
        Ok(StepControl::GoNext)
    }

    fn committed_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, ShellServices>,
    ) -> Result<StepControl, FrameworkError> {
        if !self.retried {
            self.retried = true;
            let posted =
                ctx.post_event_to_coplayers_blocking(&CoplayerTargets::All, platform("Late"));
            let rejected = matches!(
                posted,
                Err(FrameworkError::HeavyTransactionRequired { ref state, api })
                    if state == "Announce" && api == "post_event_to_coplayers_blocking"
            );
            self.log.lock().unwrap().push(format!("rejected {rejected}"));
        }
        ctx.wait_for(|_, _| false)?;
        Ok(StepControl::RepeatWait)
    }
}

#[test]
fn shell_state_posts_blocking_while_a_coplayer_waits_on_its_transaction() {
    let sessions = Arc::new(FakeSessions::default());
    let log = Log::default();
    let credits = Log::default();
    let gate = Arc::new(AtomicBool::new(false));
    let shell = {
        let shell_log = Arc::clone(&log);
        let shell_seen = Arc::clone(&credits);
        let shell_gate = Arc::clone(&gate);
        let coplayer_log = Arc::clone(&credits);
        let coplayer_gate = Arc::clone(&gate);
        ShellSetup::new(
            Arc::new(InMemoryResource::new()),
            Arc::new(RecordingPresentation::new()),
            Arc::clone(&sessions) as Arc<dyn HostSessions>,
        )
        .configurator(move |_: GameMode| {
            StateMachine::builder("Shell")
                .state(Announcer {
                    log: Arc::clone(&shell_log),
                    coplayer_log: Arc::clone(&shell_seen),
                    gate: Arc::clone(&shell_gate),
                    retried: false,
                })
                .initial_state("Announce")
                .build()
        })
        .theme(
            "Dragons",
            move |_: &ThemeInfo| {
                StateMachine::builder("Dragons")
                    .state(Creditor {
                        log: Arc::clone(&coplayer_log),
                        gate: Some(Arc::clone(&coplayer_gate)),
                    })
                    .initial_state("Credit")
                    .build()
            },
            ServiceRequestDataMaps::default(),
        )
        .spawn()
        .unwrap()
    };
    shell
        .history()
        .start_presentation_state("ShellIdle", &items(&[("Bank", "Credits", 100)]));
    shell.pool().start_coplayer(ThemeInfo::new("Dragons")).unwrap();
    shell
        .queues()
        .post_lifecycle(LifecycleEvent::ActivateContext { mode: GameMode::Play });

    // The coplayer dispatched the broadcast before the post returned.
    assert!(eventually(|| log.lock().unwrap().len() == 2));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            r#"posted Ok(1) after ["credited Ok(Ok(42))", "broadcast"]"#.to_string(),
            "rejected true".to_string(),
        ]
    );

    shell.shutdown().unwrap();
}

/// Coplayer state that blocks on one shell operation once the gate opens.
struct Pinger {
    log: Log,
    gate: Arc<AtomicBool>,
}

impl GameState<CoplayerServices> for Pinger {
    fn name(&self) -> &str {
        "Ping"
    }

    fn processing(
        &mut self,
        ctx: &mut PhaseContext<'_, CoplayerServices>,
    ) -> Result<StepControl, FrameworkError> {
        assert!(eventually(|| self.gate.load(Ordering::SeqCst)));
        let outcome = ctx
            .services()
            .submit_to_shell("Ping", |_: &dyn TransactionalResource| ())
            .wait();
        self.log.lock().unwrap().push(format!("ping {outcome:?}"));
        Ok(StepControl::GoNext)
    }
}

/// Shell state that shuts the first coplayer down from its heavy
/// Processing while that coplayer waits on the shell.
struct Closer {
    log: Log,
    gate: Arc<AtomicBool>,
}

impl GameState<ShellServices> for Closer {
    fn name(&self) -> &str {
        "Close"
    }

    fn processing(
        &mut self,
        ctx: &mut PhaseContext<'_, ShellServices>,
    ) -> Result<StepControl, FrameworkError> {
        self.gate.store(true, Ordering::SeqCst);
        let operations = Arc::clone(ctx.services().operations());
        assert!(eventually(|| operations.pending_count() > 0));
        let pool = Arc::clone(ctx.services().pool());
        let result = pool.shutdown_coplayer(CoplayerId(0));
        self.log
            .lock()
            .unwrap()
            .push(format!("shutdown {:?}", result.map(|report| report.frameworks_built)));
        Ok(StepControl::GoNext)
    }

    fn committed_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, ShellServices>,
    ) -> Result<StepControl, FrameworkError> {
        ctx.wait_for(|_, _| false)?;
        Ok(StepControl::RepeatWait)
    }
}

#[test]
fn shell_state_shuts_down_a_coplayer_blocked_on_a_shell_operation() {
    let sessions = Arc::new(FakeSessions::default());
    let log = Log::default();
    let gate = Arc::new(AtomicBool::new(false));
    let shell = {
        let shell_log = Arc::clone(&log);
        let shell_gate = Arc::clone(&gate);
        let coplayer_log = Arc::clone(&log);
        let coplayer_gate = Arc::clone(&gate);
        ShellSetup::new(
            Arc::new(InMemoryResource::new()),
            Arc::new(RecordingPresentation::new()),
            Arc::clone(&sessions) as Arc<dyn HostSessions>,
        )
        .configurator(move |_: GameMode| {
            StateMachine::builder("Shell")
                .state(Closer {
                    log: Arc::clone(&shell_log),
                    gate: Arc::clone(&shell_gate),
                })
                .initial_state("Close")
                .build()
        })
        .theme(
            "Dragons",
            move |_: &ThemeInfo| {
                StateMachine::builder("Dragons")
                    .state(Pinger {
                        log: Arc::clone(&coplayer_log),
                        gate: Arc::clone(&coplayer_gate),
                    })
                    .initial_state("Ping")
                    .build()
            },
            ServiceRequestDataMaps::default(),
        )
        .spawn()
        .unwrap()
    };
    let id = shell.pool().start_coplayer(ThemeInfo::new("Dragons")).unwrap();
    let session = sessions.session_of(id).unwrap();
    shell
        .queues()
        .post_lifecycle(LifecycleEvent::ActivateContext { mode: GameMode::Play });

    assert!(eventually(|| log.lock().unwrap().len() == 2));
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            r#"ping Err(Cancelled { name: "Ping" })"#.to_string(),
            "shutdown Ok(1)".to_string(),
        ]
    );
    assert!(shell.pool().is_empty());
    assert!(sessions.destroyed().contains(&session));
    assert_eq!(shell.operations().pending_count(), 0);

    shell.shutdown().unwrap();
}

#[test]
fn shutting_down_a_coplayer_cancels_its_pending_shell_operations() {
    let sessions = Arc::new(FakeSessions::default());
    let log = Log::default();
    let gate = Arc::new(AtomicBool::new(true));
    let coplayer_log = Arc::clone(&log);
    let shell = shell_setup(&sessions)
        .theme(
            "Pingers",
            move |_: &ThemeInfo| {
                StateMachine::builder("Pingers")
                    .state(Pinger {
                        log: Arc::clone(&coplayer_log),
                        gate: Arc::clone(&gate),
                    })
                    .initial_state("Ping")
                    .build()
            },
            ServiceRequestDataMaps::default(),
        )
        .spawn()
        .unwrap();
    let pinger = shell.pool().start_coplayer(ThemeInfo::new("Pingers")).unwrap();
    let lobby = shell.pool().start_coplayer(ThemeInfo::new("Dragons")).unwrap();
    let pending = shell
        .operations()
        .submit_from(lobby, "Keep", |_: &dyn TransactionalResource| ());
    assert!(eventually(|| shell.operations().pending_count() == 2));

    // The shell never activates, so nothing fires the pinger's operation.
    assert_eq!(shell.pool().shutdown_coplayer(pinger).unwrap().frameworks_built, 1);
    assert_eq!(
        *log.lock().unwrap(),
        vec![r#"ping Err(Cancelled { name: "Ping" })"#.to_string()]
    );
    assert_eq!(shell.operations().pending_count(), 1);
    assert!(pending.try_wait().is_none());

    shell.shutdown().unwrap();
}
