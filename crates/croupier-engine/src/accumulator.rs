//! Batches asynchronous service updates between event-queue drain cycles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use croupier_core::{DataItems, PresentationChannel};

use crate::signal::Signal;

#[derive(Default)]
struct Pending {
    state: Option<String>,
    data: DataItems,
}

/// Accumulates async updates; the framework flushes them to presentation
/// once per drain cycle rather than once per update.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone, Default)]
pub struct AsyncUpdateAccumulator {
    pending: Arc<Mutex<Pending>>,
    signal: Signal,
    flushes: Arc<AtomicU64>,
}

impl AsyncUpdateAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge `data` for `state` into the pending batch.
    ///
    /// Updates for a different state than the one pending replace the
    /// batch; presentation has moved on.
    pub fn push(&self, state: &str, data: &DataItems) {
        if data.is_empty() {
            return;
        }
        {
            let mut pending = self.lock();
            if pending.state.as_deref() != Some(state) {
                pending.state = Some(state.to_string());
                pending.data.clear();
            }
            pending.data.merge(data);
        }
        self.signal.set();
    }

    /// Take the pending batch, if any.
    pub fn take(&self) -> Option<(String, DataItems)> {
        let mut pending = self.lock();
        if pending.data.is_empty() {
            return None;
        }
        let state = pending.state.take()?;
        Some((state, std::mem::take(&mut pending.data)))
    }

    /// Push the pending batch to `presentation`. Returns `true` if
    /// anything was sent.
    pub fn flush_to(&self, presentation: &dyn PresentationChannel) -> bool {
        let Some((state, data)) = self.take() else {
            return false;
        };
        trace!(state = %state, entries = data.len(), "flushing async updates");
        presentation.update_async_data(&state, &data);
        self.flushes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of batches flushed so far.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Signal raised whenever an update is pushed.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }
}

impl std::fmt::Debug for AsyncUpdateAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncUpdateAccumulator")
            .field("flushes", &self.flush_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croupier_test_utils::{PresentationCall, RecordingPresentation};

    #[test]
    fn updates_are_batched_into_one_flush() {
        let acc = AsyncUpdateAccumulator::new();
        let presentation = RecordingPresentation::new();
        acc.push("Idle", &DataItems::new().with("bank", "credit", 10));
        acc.push("Idle", &DataItems::new().with("bank", "credit", 20));
        acc.push("Idle", &DataItems::new().with("bank", "bet", 1));
        assert!(acc.signal().is_set());

        assert!(acc.flush_to(&presentation));
        assert!(!acc.flush_to(&presentation));
        assert_eq!(acc.flush_count(), 1);
        assert_eq!(
            presentation.calls(),
            vec![PresentationCall::AsyncUpdate {
                state: "Idle".into(),
                data: DataItems::new()
                    .with("bank", "credit", 20)
                    .with("bank", "bet", 1),
            }]
        );
    }

    #[test]
    fn new_state_discards_stale_batch() {
        let acc = AsyncUpdateAccumulator::new();
        acc.push("Idle", &DataItems::new().with("bank", "credit", 10));
        acc.push("Spin", &DataItems::new().with("reels", "stop", 3));
        let (state, data) = acc.take().unwrap();
        assert_eq!(state, "Spin");
        assert_eq!(data, DataItems::new().with("reels", "stop", 3));
    }

    #[test]
    fn empty_updates_do_not_signal() {
        let acc = AsyncUpdateAccumulator::new();
        acc.push("Idle", &DataItems::new());
        assert!(!acc.signal().is_set());
        assert!(acc.take().is_none());
    }
}
