//! Transaction-stepped state-machine runtime for Croupier games.
//!
//! A game is a set of [`GameState`]s, each running four phases in order
//! (Processing, CommittedPreWait, CommittedWait, CommittedPostWait). The
//! [`StateMachineFramework`] runs one phase per tick inside a host
//! transaction of the state's declared weight and persists its position
//! so a power hit resumes at a safe boundary.
//!
//! Frameworks run on runner threads ([`RunnerHandle`]): one shell, which
//! owns the [`CoplayerPool`], and one thread per coplayer. Runners bridge
//! host lifecycle events into framework construction and teardown and
//! multiplex their event queues through the [`EventQueueCoordinator`].
//! Coplayers reach the shell's transactions through the
//! [`TransactionalOperationManager`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod accumulator;
pub mod config;
pub mod context;
pub mod error;
pub mod event_queue;
pub mod framework;
pub mod history_replay;
pub mod metrics;
pub mod operations;
pub mod runner;
pub mod services;
pub mod signal;
pub mod state;

pub use accumulator::AsyncUpdateAccumulator;
pub use config::{ConfigError, HistoryConfig, RunnerConfig, ShellConfig};
pub use context::{FrameworkHost, PhaseContext, PhaseServices};
pub use error::FrameworkError;
pub use event_queue::{
    DispatchAck, DispatchedEvent, EventQueue, EventQueueCoordinator, EventSource, Interrupt,
    RunnerControl, RunnerQueues, WaitOutcome,
};
pub use framework::{StateMachineFramework, TickOutcome};
pub use history_replay::{history_replay_machine, HistoryReplayState};
pub use metrics::FrameworkMetrics;
pub use operations::{OperationError, OperationTicket, TransactionalOperationManager};
pub use runner::coplayer::{CoplayerConfigurator, CoplayerServices};
pub use runner::shell::{
    CoplayerPool, CoplayerSession, CoplayerTargets, HostSessions, ShellConfigurator, ShellRuntime,
    ShellServices, ShellSetup, ThemeRegistry,
};
pub use runner::{RunnerCapabilities, RunnerCore, RunnerHandle, RunnerReport, RunnerState};
pub use services::{
    RequestedServices, ServiceController, ServiceProvider, ServiceRegistry, ServiceRequest,
    ServiceRequestCatalog, ServiceRequestDataMaps, ServiceUpdate,
};
pub use signal::Signal;
pub use state::{GameState, StateMachine, StateMachineBuilder};
