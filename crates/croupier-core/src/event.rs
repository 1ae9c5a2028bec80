//! The event union consumed by runner event loops.
//!
//! Every queue a runner reads from carries [`Event`] values; handlers
//! dispatch with an exhaustive `match`.

use crate::data::DataItems;
use crate::id::CoplayerId;
use crate::step::GameMode;

/// Any event a runner can dequeue.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Host lifecycle control. Always consumed by the runner itself.
    Lifecycle(LifecycleEvent),
    /// Feedback from the presentation layer.
    Presentation(PresentationEvent),
    /// Message from the peer runner (shell to coplayer or back).
    Peer(PeerMessage),
    /// Platform-originated event routed through the host queues.
    Platform(PlatformEvent),
}

impl Event {
    /// Returns `true` for [`Event::Lifecycle`].
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lifecycle(_) => "lifecycle",
            Self::Presentation(_) => "presentation",
            Self::Peer(_) => "peer",
            Self::Platform(_) => "platform",
        }
    }
}

/// Host lifecycle callbacks bridged into the runner loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new host context is starting; any running framework must exit.
    NewContext,
    /// The host activated a context in the given mode.
    ActivateContext {
        /// Mode the framework must run in.
        mode: GameMode,
    },
    /// The host deactivated the current context.
    InactivateContext,
}

/// Events reported back by presentation.
#[derive(Clone, Debug, PartialEq)]
pub enum PresentationEvent {
    /// Presentation finished showing the named state.
    StateComplete {
        /// State whose presentation completed.
        state: String,
    },
    /// Player navigation while viewing history.
    HistoryNavigation(HistoryNavigation),
    /// Game-specific presentation event.
    Custom {
        /// Event name.
        name: String,
        /// Attached data.
        data: DataItems,
    },
}

/// Navigation requests in history mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryNavigation {
    /// Show the next recorded step.
    Next,
    /// Restart from the first recorded step.
    First,
}

/// Originator of a [`PeerMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Peer {
    /// The shell runner.
    Shell,
    /// A coplayer runner.
    Coplayer(CoplayerId),
}

/// Message exchanged between the shell and its coplayers.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerMessage {
    /// Sender.
    pub from: Peer,
    /// Message name.
    pub name: String,
    /// Payload.
    pub data: DataItems,
}

/// Event originated by the host platform (money, doors, operator input).
#[derive(Clone, Debug, PartialEq)]
pub struct PlatformEvent {
    /// Event name.
    pub name: String,
    /// Payload.
    pub data: DataItems,
}

impl PlatformEvent {
    /// Event with no payload.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: DataItems::new(),
        }
    }
}
