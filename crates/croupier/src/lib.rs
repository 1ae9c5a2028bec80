//! Croupier: a transaction-stepped runtime for multi-player casino games.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Croupier sub-crates. For most users, adding `croupier` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use croupier::prelude::*;
//! use croupier_test_utils::{InMemoryResource, RecordingPresentation};
//!
//! // A state that shows the credit meter, then waits for nothing.
//! struct Attract;
//! impl GameState<()> for Attract {
//!     fn name(&self) -> &str { "Attract" }
//!     fn committed_pre_wait(
//!         &mut self,
//!         ctx: &mut PhaseContext<'_, ()>,
//!     ) -> Result<StepControl, FrameworkError> {
//!         ctx.start_presentation(&DataItems::new().with("Bank", "Credits", 100))?;
//!         Ok(StepControl::GoNext)
//!     }
//! }
//!
//! let machine = StateMachine::builder("Attract")
//!     .state(Attract)
//!     .initial_state("Attract")
//!     .build()
//!     .unwrap();
//!
//! let resource = Arc::new(InMemoryResource::new());
//! let presentation = Arc::new(RecordingPresentation::new());
//! let coordinator =
//!     EventQueueCoordinator::new(RunnerQueues::new(), Arc::new(RunnerControl::new()));
//! let host = FrameworkHost::new(GameMode::Play, resource, presentation.clone(), coordinator);
//! let mut framework = StateMachineFramework::new("Demo", machine, (), host);
//!
//! framework.execute_tick().unwrap(); // Processing
//! framework.execute_tick().unwrap(); // CommittedPreWait
//! assert_eq!(presentation.started_states(), vec!["Attract"]);
//! assert_eq!(framework.state_info().unwrap().current_step, Step::CommittedWait);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `croupier-core` | Data sets, steps, events, ids, host traits |
//! | [`history`] | `croupier-history` | Diff recorders, history manager, reader, codec |
//! | [`engine`] | `croupier-engine` | Framework driver, event queues, runners, shell pool |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and host traits (`croupier-core`).
///
/// Contains [`types::DataItems`], [`types::Step`] and
/// [`types::StepControl`], the [`types::Event`] union, and the
/// [`types::TransactionalResource`] / [`types::PresentationChannel`]
/// traits a host implements.
pub use croupier_core as types;

/// History recording and replay (`croupier-history`).
///
/// [`history::HistoryManager`] writes one record pair per completed game
/// step; [`history::HistoryReader`] walks them back.
pub use croupier_history as history;

/// Framework driver and runner threads (`croupier-engine`).
///
/// [`engine::StateMachineFramework`] runs one phase per tick;
/// [`engine::ShellSetup`] starts the shell and its coplayer pool.
pub use croupier_engine as engine;

/// Common imports for typical Croupier usage.
///
/// ```rust
/// use croupier::prelude::*;
/// ```
pub mod prelude {
    // Core types and host traits
    pub use croupier_core::{
        CoplayerId, CriticalDataBlock, DataItems, DataValue, Event, GameMode, LifecycleEvent,
        PresentationChannel, StateInfo, Step, StepControl, ThemeInfo, TransactionWeight,
        TransactionalResource,
    };

    // Errors
    pub use croupier_core::ResourceError;
    pub use croupier_engine::{FrameworkError, OperationError};
    pub use croupier_history::HistoryError;

    // History
    pub use croupier_history::{HistoryConfig, HistoryManager, HistoryReader};

    // Engine
    pub use croupier_engine::{
        CoplayerServices, CoplayerTargets, EventQueueCoordinator, FrameworkHost, GameState,
        HostSessions, PhaseContext, PhaseServices, RunnerConfig, RunnerControl, RunnerHandle,
        RunnerQueues, ShellConfig, ShellServices, ShellSetup, StateMachine, StateMachineFramework,
        TransactionalOperationManager,
    };
}
