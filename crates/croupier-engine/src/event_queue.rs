//! Per-runner event queues and the coordinator that multiplexes them.
//!
//! A runner reads from four independent [`EventQueue`]s. The
//! [`EventQueueCoordinator`] merges them into one blocking wait with a
//! fixed priority order:
//!
//! 1. interrupts (stop, exit-framework, queued transactional operations),
//! 2. queued events, scanned in registration order
//!    (host-transactional, host-non-transactional, peer, presentation),
//! 3. the per-cycle hook (async presentation flush), then block.
//!
//! An event posted with an acknowledgement is acknowledged when its
//! dispatch ends, or as soon as a drain cycle passes over it without a
//! match. A poster therefore never waits on a state's acceptance
//! predicate, only on the consumer reaching its next wait.
//!
//! Lifecycle events are never handed to state code. Whenever the
//! coordinator meets one it defers it on the shared [`RunnerControl`] and
//! raises the exit-framework signal; the runner loop performs the actual
//! teardown on its next iteration.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Select, Sender};
use tracing::trace;

use croupier_core::{Event, LifecycleEvent};

use crate::signal::Signal;

// ── EventSource ────────────────────────────────────────────────────

/// Queue an event was dequeued from, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventSource {
    /// Host events that must be handled inside a transaction.
    HostTransactional,
    /// Host events with no transactional requirement.
    HostNonTransactional,
    /// Shell/coplayer peer messages.
    Peer,
    /// Presentation feedback.
    Presentation,
}

// ── EventQueue ─────────────────────────────────────────────────────

struct QueuedEvent {
    event: Event,
    ack: Option<Sender<()>>,
}

/// Thread-safe FIFO of events with a readiness signal.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct EventQueue {
    events: Arc<Mutex<VecDeque<QueuedEvent>>>,
    ready: Signal,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            ready: Signal::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `event`.
    pub fn post(&self, event: Event) {
        self.lock().push_back(QueuedEvent { event, ack: None });
        self.ready.set();
    }

    /// Enqueue `event` and return a receiver that yields once the
    /// consumer has finished dispatching it or passed over it.
    ///
    /// The receiver disconnects without a value if the event is
    /// discarded before either happens.
    pub fn post_with_ack(&self, event: Event) -> Receiver<()> {
        let (tx, rx) = bounded(1);
        self.lock().push_back(QueuedEvent {
            event,
            ack: Some(tx),
        });
        self.ready.set();
        rx
    }

    /// Remove and return the first event matching `pred`.
    pub(crate) fn dequeue_matching(
        &self,
        mut pred: impl FnMut(&Event) -> bool,
    ) -> Option<(Event, DispatchAck)> {
        let mut events = self.lock();
        let index = events.iter().position(|queued| pred(&queued.event))?;
        let queued = events.remove(index)?;
        Some((queued.event, DispatchAck(queued.ack)))
    }

    /// Fire the pending acknowledgements of every queued event. The
    /// events stay queued.
    pub(crate) fn release_acks(&self) -> usize {
        let mut released = 0;
        for queued in self.lock().iter_mut() {
            if let Some(tx) = queued.ack.take() {
                let _ = tx.try_send(());
                released += 1;
            }
        }
        released
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard every queued event. Pending acknowledgements disconnect.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub(crate) fn ready(&self) -> &Signal {
        &self.ready
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue").field("len", &self.len()).finish()
    }
}

/// Dispatch-ended notification for an event posted with
/// [`EventQueue::post_with_ack`]. Fires when dropped.
#[derive(Debug)]
pub struct DispatchAck(Option<Sender<()>>);

impl DispatchAck {
    /// Returns `true` if the poster is waiting for this acknowledgement.
    pub fn is_awaited(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for DispatchAck {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            // The poster may have given up waiting.
            let _ = tx.try_send(());
        }
    }
}

// ── RunnerQueues ───────────────────────────────────────────────────

/// The four queues a runner consumes.
#[derive(Clone, Debug, Default)]
pub struct RunnerQueues {
    /// Host events handled inside a transaction.
    pub host_transactional: EventQueue,
    /// Host events with no transactional requirement.
    pub host_non_transactional: EventQueue,
    /// Peer runner messages.
    pub peer: EventQueue,
    /// Presentation feedback.
    pub presentation: EventQueue,
}

impl RunnerQueues {
    /// Fresh, empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues in registration (drain) order.
    pub fn iter(&self) -> impl Iterator<Item = (EventSource, &EventQueue)> {
        [
            (EventSource::HostTransactional, &self.host_transactional),
            (EventSource::HostNonTransactional, &self.host_non_transactional),
            (EventSource::Peer, &self.peer),
            (EventSource::Presentation, &self.presentation),
        ]
        .into_iter()
    }

    /// Post a host lifecycle event.
    pub fn post_lifecycle(&self, event: LifecycleEvent) {
        self.host_non_transactional.post(Event::Lifecycle(event));
    }
}

// ── RunnerControl ──────────────────────────────────────────────────

/// Cooperative control signals shared between a runner thread and its
/// owner.
#[derive(Debug, Default)]
pub struct RunnerControl {
    /// Set to make the runner thread exit after its current iteration.
    pub stop: Signal,
    /// Set to make the runner tear down the running framework.
    pub exit_framework: Signal,
    deferred: Mutex<VecDeque<LifecycleEvent>>,
}

impl RunnerControl {
    /// Fresh control block with no signal set.
    pub fn new() -> Self {
        Self::default()
    }

    fn deferred(&self) -> MutexGuard<'_, VecDeque<LifecycleEvent>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `event` for the runner loop and request framework exit.
    pub fn request_exit(&self, event: LifecycleEvent) {
        self.deferred().push_back(event);
        self.exit_framework.set();
    }

    /// Take the oldest deferred lifecycle event.
    pub fn take_deferred(&self) -> Option<LifecycleEvent> {
        self.deferred().pop_front()
    }

    /// Keep only deferred events matching `keep`.
    pub(crate) fn retain_deferred(&self, keep: impl FnMut(&LifecycleEvent) -> bool) {
        self.deferred().retain(keep);
    }
}

// ── Waiting ────────────────────────────────────────────────────────

/// Higher-priority condition that ended a wait early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// The runner thread is stopping.
    Stop,
    /// The running framework must exit.
    ExitFramework,
    /// Transactional operations are waiting for a transaction.
    OperationsQueued,
}

/// An event handed to state code.
///
/// The dispatch-ended acknowledgement fires when this value is dropped.
#[derive(Debug)]
pub struct DispatchedEvent {
    /// Queue the event came from.
    pub source: EventSource,
    /// The event itself.
    pub event: Event,
    /// Dispatch-ended notification.
    pub ack: DispatchAck,
}

/// Result of a coordinated wait.
#[derive(Debug)]
pub enum WaitOutcome {
    /// An accepted event was dequeued.
    Event(DispatchedEvent),
    /// The wait ended on an interrupt; state code should repeat its
    /// wait step.
    Interrupted(Interrupt),
}

impl WaitOutcome {
    /// The dispatched event, or `None` if the wait was interrupted.
    pub fn into_event(self) -> Option<DispatchedEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Interrupted(_) => None,
        }
    }
}

// ── EventQueueCoordinator ──────────────────────────────────────────

/// Multiplexes a runner's queues and interrupt signals into one wait.
#[derive(Clone)]
pub struct EventQueueCoordinator {
    queues: RunnerQueues,
    control: Arc<RunnerControl>,
    operations: Option<Signal>,
    async_updates: Option<Signal>,
    idle_wait: Option<Duration>,
}

impl EventQueueCoordinator {
    /// Coordinate `queues` under `control`.
    pub fn new(queues: RunnerQueues, control: Arc<RunnerControl>) -> Self {
        Self {
            queues,
            control,
            operations: None,
            async_updates: None,
            idle_wait: None,
        }
    }

    /// Interrupt waits when `signal` (queued transactional operations)
    /// is set.
    pub fn with_operations(mut self, signal: Signal) -> Self {
        self.operations = Some(signal);
        self
    }

    /// Wake to run the per-cycle hook when `signal` (pending async
    /// updates) is set.
    pub fn with_async_signal(mut self, signal: Signal) -> Self {
        self.async_updates = Some(signal);
        self
    }

    /// Re-run the drain cycle at least this often.
    pub fn with_idle_wait(mut self, idle_wait: Option<Duration>) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// The coordinated queues.
    pub fn queues(&self) -> &RunnerQueues {
        &self.queues
    }

    /// The shared control block.
    pub fn control(&self) -> &Arc<RunnerControl> {
        &self.control
    }

    fn pending_interrupt(&self) -> Option<Interrupt> {
        if self.control.stop.is_set() {
            Some(Interrupt::Stop)
        } else if self.control.exit_framework.is_set() {
            Some(Interrupt::ExitFramework)
        } else if self.operations.as_ref().is_some_and(Signal::is_set) {
            Some(Interrupt::OperationsQueued)
        } else {
            None
        }
    }

    /// Block until an event satisfying `accept` arrives or an interrupt
    /// fires.
    ///
    /// `on_cycle` runs once per drain cycle, after every queue has been
    /// scanned without a match and before blocking.
    pub fn next_event(
        &self,
        accept: &mut dyn FnMut(EventSource, &Event) -> bool,
        on_cycle: &mut dyn FnMut(),
    ) -> WaitOutcome {
        loop {
            if let Some(interrupt) = self.pending_interrupt() {
                trace!(?interrupt, "wait interrupted");
                return WaitOutcome::Interrupted(interrupt);
            }

            for (_, queue) in self.queues.iter() {
                queue.ready().reset();
            }
            if let Some(signal) = &self.async_updates {
                signal.reset();
            }

            let mut deferred = false;
            for (source, queue) in self.queues.iter() {
                let found =
                    queue.dequeue_matching(|event| event.is_lifecycle() || accept(source, event));
                match found {
                    Some((Event::Lifecycle(lifecycle), _ack)) => {
                        self.control.request_exit(lifecycle);
                        deferred = true;
                        break;
                    }
                    Some((event, ack)) => {
                        return WaitOutcome::Event(DispatchedEvent { source, event, ack });
                    }
                    None => {}
                }
            }
            if deferred {
                continue;
            }

            self.release_passed_over();
            on_cycle();
            self.block();
        }
    }

    /// Dequeue the first pending lifecycle event without blocking.
    pub fn poll_lifecycle(&self) -> Option<LifecycleEvent> {
        self.queues.iter().find_map(|(_, queue)| {
            match queue.dequeue_matching(Event::is_lifecycle) {
                Some((Event::Lifecycle(lifecycle), _ack)) => Some(lifecycle),
                _ => None,
            }
        })
    }

    /// Block until a lifecycle event arrives. Returns `None` once the
    /// runner is asked to stop.
    pub fn wait_lifecycle(&self) -> Option<LifecycleEvent> {
        loop {
            if self.control.stop.is_set() {
                return None;
            }
            for (_, queue) in self.queues.iter() {
                queue.ready().reset();
            }
            self.release_passed_over();
            if let Some(lifecycle) = self.poll_lifecycle() {
                return Some(lifecycle);
            }
            self.block();
        }
    }

    fn release_passed_over(&self) {
        let released: usize = self
            .queues
            .iter()
            .map(|(_, queue)| queue.release_acks())
            .sum();
        if released > 0 {
            trace!(released, "acknowledged events left queued");
        }
    }

    /// Wait for any wake-up source, consuming the token that woke us.
    fn block(&self) {
        let mut wakers: Vec<&Receiver<()>> = self
            .queues
            .iter()
            .map(|(_, queue)| queue.ready().waker())
            .collect();
        wakers.push(self.control.stop.waker());
        wakers.push(self.control.exit_framework.waker());
        if let Some(signal) = &self.operations {
            wakers.push(signal.waker());
        }
        if let Some(signal) = &self.async_updates {
            wakers.push(signal.waker());
        }

        let mut select = Select::new();
        for waker in &wakers {
            select.recv(waker);
        }
        let selected = match self.idle_wait {
            Some(timeout) => match select.select_timeout(timeout) {
                Ok(selected) => selected,
                Err(_) => return,
            },
            None => select.select(),
        };
        let index = selected.index();
        // Senders live inside the signals we hold, so this cannot disconnect.
        let _ = selected.recv(wakers[index]);
    }
}

impl std::fmt::Debug for EventQueueCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueueCoordinator")
            .field("queues", &self.queues)
            .field("idle_wait", &self.idle_wait)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croupier_core::{GameMode, PlatformEvent, PresentationEvent};
    use proptest::prelude::*;
    use std::thread;

    fn platform(name: &str) -> Event {
        Event::Platform(PlatformEvent::named(name))
    }

    fn coordinator() -> EventQueueCoordinator {
        EventQueueCoordinator::new(RunnerQueues::new(), Arc::new(RunnerControl::new()))
    }

    fn accept_all(_: EventSource, _: &Event) -> bool {
        true
    }

    #[test]
    fn queues_drain_in_registration_order() {
        let coord = coordinator();
        coord
            .queues()
            .presentation
            .post(Event::Presentation(PresentationEvent::StateComplete {
                state: "A".into(),
            }));
        coord.queues().peer.post(platform("peer"));
        coord.queues().host_transactional.post(platform("host"));

        let mut sources = Vec::new();
        for _ in 0..3 {
            match coord.next_event(&mut accept_all, &mut || {}) {
                WaitOutcome::Event(dispatched) => sources.push(dispatched.source),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(
            sources,
            vec![
                EventSource::HostTransactional,
                EventSource::Peer,
                EventSource::Presentation
            ]
        );
    }

    proptest! {
        #[test]
        fn drain_order_is_queue_priority_then_fifo(
            targets in prop::collection::vec(0usize..4, 0..24),
        ) {
            let coord = coordinator();
            let queues: Vec<EventQueue> =
                coord.queues().iter().map(|(_, queue)| queue.clone()).collect();
            for (i, &target) in targets.iter().enumerate() {
                queues[target].post(platform(&format!("{target}:{i}")));
            }

            let mut expected = Vec::new();
            for queue in 0..4 {
                for (i, &target) in targets.iter().enumerate() {
                    if target == queue {
                        expected.push(format!("{target}:{i}"));
                    }
                }
            }

            let mut drained = Vec::new();
            for _ in 0..targets.len() {
                match coord.next_event(&mut accept_all, &mut || {}) {
                    WaitOutcome::Event(DispatchedEvent { event: Event::Platform(p), .. }) => {
                        drained.push(p.name)
                    }
                    other => prop_assert!(false, "unexpected {:?}", other),
                }
            }
            prop_assert_eq!(drained, expected);
            prop_assert!(queues.iter().all(EventQueue::is_empty));
        }
    }

    #[test]
    fn rejected_events_stay_queued() {
        let coord = coordinator();
        coord.queues().peer.post(platform("ignored"));
        coord.queues().peer.post(platform("wanted"));

        let mut accept = |_: EventSource, e: &Event| {
            matches!(e, Event::Platform(p) if p.name == "wanted")
        };
        let outcome = coord.next_event(&mut accept, &mut || {});
        assert!(matches!(
            outcome,
            WaitOutcome::Event(DispatchedEvent { event: Event::Platform(ref p), .. }) if p.name == "wanted"
        ));
        assert_eq!(coord.queues().peer.len(), 1);
    }

    #[test]
    fn interrupts_take_priority_over_events() {
        let coord = coordinator().with_operations(Signal::new());
        coord.queues().peer.post(platform("x"));

        coord.control().exit_framework.set();
        coord.control().stop.set();
        assert!(matches!(
            coord.next_event(&mut accept_all, &mut || {}),
            WaitOutcome::Interrupted(Interrupt::Stop)
        ));
        coord.control().stop.reset();
        assert!(matches!(
            coord.next_event(&mut accept_all, &mut || {}),
            WaitOutcome::Interrupted(Interrupt::ExitFramework)
        ));
        coord.control().exit_framework.reset();
        assert_eq!(coord.queues().peer.len(), 1);
    }

    #[test]
    fn lifecycle_events_are_deferred_not_dispatched() {
        let coord = coordinator();
        coord.queues().post_lifecycle(LifecycleEvent::InactivateContext);
        coord.queues().peer.post(platform("x"));

        let outcome = coord.next_event(&mut accept_all, &mut || {});
        assert!(matches!(
            outcome,
            WaitOutcome::Interrupted(Interrupt::ExitFramework)
        ));
        assert_eq!(
            coord.control().take_deferred(),
            Some(LifecycleEvent::InactivateContext)
        );
        assert_eq!(coord.queues().peer.len(), 1);
    }

    #[test]
    fn cycle_hook_runs_before_blocking() {
        let coord = coordinator();
        let queues = coord.queues().clone();
        let mut cycles = 0;
        let outcome = coord.next_event(&mut accept_all, &mut || {
            cycles += 1;
            if cycles == 1 {
                queues.peer.post(platform("late"));
            }
        });
        assert!(matches!(outcome, WaitOutcome::Event(_)));
        assert_eq!(cycles, 1);
    }

    #[test]
    fn idle_wait_reruns_the_cycle() {
        let coord = coordinator().with_idle_wait(Some(Duration::from_millis(1)));
        let control = Arc::clone(coord.control());
        let mut cycles = 0;
        let outcome = coord.next_event(&mut accept_all, &mut || {
            cycles += 1;
            if cycles == 3 {
                control.stop.set();
            }
        });
        assert!(matches!(outcome, WaitOutcome::Interrupted(Interrupt::Stop)));
    }

    #[test]
    fn blocked_wait_wakes_on_post_from_another_thread() {
        let coord = coordinator();
        let queues = coord.queues().clone();
        let poster = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            queues.presentation.post(platform("wake"));
        });
        let outcome = coord.next_event(&mut accept_all, &mut || {});
        assert!(matches!(outcome, WaitOutcome::Event(_)));
        poster.join().unwrap();
    }

    #[test]
    fn acknowledgement_fires_when_dispatch_ends() {
        let coord = coordinator();
        let ack = coord.queues().peer.post_with_ack(platform("sync"));
        let dispatched = coord.next_event(&mut accept_all, &mut || {}).into_event();
        assert!(ack.try_recv().is_err());
        drop(dispatched);
        assert!(ack.try_recv().is_ok());
    }

    #[test]
    fn passed_over_event_is_acknowledged_but_stays_queued() {
        let coord = coordinator();
        let control = Arc::clone(coord.control());
        let ack = coord.queues().host_transactional.post_with_ack(platform("tilt"));

        let mut accept_none = |_: EventSource, _: &Event| false;
        let outcome = coord.next_event(&mut accept_none, &mut || control.stop.set());
        assert!(matches!(outcome, WaitOutcome::Interrupted(Interrupt::Stop)));
        assert!(ack.try_recv().is_ok());
        assert_eq!(coord.queues().host_transactional.len(), 1);

        control.stop.reset();
        let dispatched = coord.next_event(&mut accept_all, &mut || {}).into_event();
        assert!(matches!(
            dispatched,
            Some(DispatchedEvent { event: Event::Platform(ref p), .. }) if p.name == "tilt"
        ));
    }

    #[test]
    fn waiting_for_activation_acknowledges_queued_events() {
        let coord = coordinator();
        let ack = coord.queues().host_transactional.post_with_ack(platform("early"));
        coord.queues().post_lifecycle(LifecycleEvent::NewContext);

        assert_eq!(coord.wait_lifecycle(), Some(LifecycleEvent::NewContext));
        assert!(ack.try_recv().is_ok());
        assert_eq!(coord.queues().host_transactional.len(), 1);
    }

    #[test]
    fn cleared_event_disconnects_acknowledgement() {
        let queue = EventQueue::new();
        let ack = queue.post_with_ack(platform("lost"));
        queue.clear();
        assert!(matches!(
            ack.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn wait_lifecycle_skips_other_events_and_honours_stop() {
        let coord = coordinator();
        coord.queues().peer.post(platform("x"));
        coord.queues().post_lifecycle(LifecycleEvent::ActivateContext {
            mode: GameMode::Play,
        });
        assert_eq!(
            coord.wait_lifecycle(),
            Some(LifecycleEvent::ActivateContext {
                mode: GameMode::Play
            })
        );
        assert_eq!(coord.queues().peer.len(), 1);

        coord.control().stop.set();
        assert_eq!(coord.wait_lifecycle(), None);
    }
}
