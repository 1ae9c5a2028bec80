//! Reader/writer snapshot recorder used on the shell side.
//!
//! The shell thread is the single writer; coplayer threads read it when
//! they close a history step. Records are full snapshots unless the caller
//! supplies a base to diff against. Nothing here is persisted: recovery
//! always re-enters through [`start_presentation_state`].
//!
//! [`start_presentation_state`]: ConcurrentHistoryRecorder::start_presentation_state

use std::sync::{PoisonError, RwLock};

use croupier_core::{DataItems, HistoryRecord};

use crate::error::HistoryError;

#[derive(Debug, Default)]
struct ShellHistory {
    accumulated: DataItems,
    marked_state: Option<String>,
}

/// Shell history store shared between the shell and its coplayers.
#[derive(Debug, Default)]
pub struct ConcurrentHistoryRecorder {
    inner: RwLock<ShellHistory>,
}

impl ConcurrentHistoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `data` into the store and optionally mark the current state.
    pub fn update(&self, data: &DataItems, marked_state: Option<&str>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.accumulated.merge(data);
        if let Some(state) = marked_state {
            inner.marked_state = Some(state.to_string());
        }
    }

    /// The shell started presenting `state` with `data`.
    pub fn start_presentation_state(&self, state: &str, data: &DataItems) {
        self.update(data, Some(state));
    }

    /// Build the record for `step`.
    ///
    /// With `base == None` the record is a full copy of the store;
    /// otherwise it holds only the entries that differ from `base`.
    pub fn create_history_record(
        &self,
        step: u32,
        base: Option<&DataItems>,
    ) -> Result<HistoryRecord, HistoryError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let state = inner
            .marked_state
            .as_deref()
            .ok_or(HistoryError::NoPresentationState)?;
        let data = match base {
            Some(base) => base.diff_with(&inner.accumulated),
            None => inner.accumulated.clone(),
        };
        Ok(HistoryRecord::new(step, state, data))
    }

    /// State marked by the most recent update, if any.
    pub fn marked_state(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .marked_state
            .clone()
    }

    /// Copy of the accumulated store.
    pub fn snapshot(&self) -> DataItems {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .accumulated
            .clone()
    }

    /// Forget all data and the marked state.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.accumulated.clear();
        inner.marked_state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croupier_core::DataValue;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn record_before_any_state_is_rejected() {
        let rec = ConcurrentHistoryRecorder::new();
        rec.update(&DataItems::new().with("bank", "credit", 1), None);
        assert!(matches!(
            rec.create_history_record(1, None),
            Err(HistoryError::NoPresentationState)
        ));
    }

    #[test]
    fn full_snapshot_is_a_copy() {
        let rec = ConcurrentHistoryRecorder::new();
        rec.start_presentation_state("Idle", &DataItems::new().with("bank", "credit", 10));
        let record = rec.create_history_record(5, None).unwrap();
        rec.update(&DataItems::new().with("bank", "credit", 99), None);

        assert_eq!(record.step_number, 5);
        assert_eq!(record.state_name, "Idle");
        assert_eq!(record.data, DataItems::new().with("bank", "credit", 10));
        assert_eq!(rec.snapshot(), DataItems::new().with("bank", "credit", 99));
    }

    #[test]
    fn diff_against_caller_base() {
        let rec = ConcurrentHistoryRecorder::new();
        rec.start_presentation_state(
            "Idle",
            &DataItems::new()
                .with("bank", "credit", 10)
                .with("bank", "denom", 1)
                .with("door", "open", false),
        );
        let base = DataItems::new().with("bank", "credit", 10).with("bank", "denom", 5);

        let record = rec.create_history_record(5, Some(&base)).unwrap();
        assert_eq!(
            record.data,
            DataItems::new().with("bank", "denom", 1).with("door", "open", false)
        );
    }

    #[test]
    fn readers_run_alongside_the_writer() {
        let rec = Arc::new(ConcurrentHistoryRecorder::new());
        rec.start_presentation_state("Idle", &DataItems::new());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let rec = Arc::clone(&rec);
                thread::spawn(move || {
                    for step in 1..=50 {
                        let record = rec.create_history_record(step, None).unwrap();
                        assert_eq!(record.step_number, step);
                    }
                })
            })
            .collect();

        for i in 0..50 {
            rec.update(&DataItems::new().with("bank", "credit", i as i64), Some("Play"));
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(rec.snapshot().get("bank", "credit"), Some(&DataValue::Int(49)));
    }
}
