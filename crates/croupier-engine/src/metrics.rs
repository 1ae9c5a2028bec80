//! Counters collected by a running framework.
//!
//! [`FrameworkMetrics`] is cumulative over the life of one framework
//! instance; a rebuilt framework starts from zero.

/// Cumulative framework counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameworkMetrics {
    /// Calls to `execute_tick`.
    pub ticks: u64,
    /// Phase bodies that ran to completion.
    pub phases_executed: u64,
    /// Transactions the driver opened (phase, recovery and transition).
    pub transactions_opened: u64,
    /// Transactions the host refused to open.
    pub transactions_not_opened: u64,
    /// Completed state transitions.
    pub state_transitions: u64,
    /// Starts that resumed from a persisted position.
    pub recoveries: u64,
    /// Starts that found no persisted position.
    pub cold_boots: u64,
    /// Async data batches flushed to presentation.
    pub async_flushes: u64,
}
