//! Core types and traits for the Croupier game runtime.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by the history subsystem and the engine: accumulated
//! service data ([`DataItems`]), the four-phase step model ([`Step`],
//! [`StepControl`], [`StateInfo`]), history records, the event union
//! consumed by runners, and the narrow traits through which the host
//! platform is reached ([`TransactionalResource`], [`PresentationChannel`]).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod data;
pub mod error;
pub mod event;
pub mod id;
pub mod keys;
pub mod record;
pub mod resource;
pub mod step;

pub use data::{DataItems, DataValue};
pub use error::ResourceError;
pub use event::{
    Event, HistoryNavigation, LifecycleEvent, Peer, PeerMessage, PlatformEvent, PresentationEvent,
};
pub use id::{CoplayerId, CoplayerSet, SessionId, ThemeInfo};
pub use record::HistoryRecord;
pub use resource::{CriticalDataBlock, PresentationChannel, TransactionalResource};
pub use step::{GameMode, StateInfo, Step, StepControl, StepTransition, TransactionWeight};
