//! Single-threaded staged-update recorder used on the coplayer side.
//!
//! Updates are merged into a `staged` buffer; creating a record emits
//! `base.diff_with(staged)`, clears `staged` and folds the diff into
//! `base`. Both buffers are persisted so a restart mid-cycle resumes with
//! the same pending delta.

use croupier_core::keys;
use croupier_core::{CriticalDataBlock, DataItems, HistoryRecord, TransactionalResource};

use crate::codec::{decode_data_items, encode_data_items};
use crate::error::HistoryError;

/// Staged diff recorder.
///
/// Not `Sync` by intent of use: one owning thread stages and records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagedDiffRecorder {
    base: DataItems,
    staged: DataItems,
}

impl StagedDiffRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore both buffers from critical data. Absent keys yield empty
    /// buffers.
    pub fn restore(resource: &dyn TransactionalResource) -> Result<Self, HistoryError> {
        let block =
            resource.read_critical_data(&[keys::HISTORY_BASE_DATA, keys::HISTORY_STAGED_DATA])?;
        Self::from_block(&block)
    }

    pub(crate) fn from_block(block: &CriticalDataBlock) -> Result<Self, HistoryError> {
        let load = |key: &str| -> Result<DataItems, HistoryError> {
            match block.get(key) {
                Some(bytes) => Ok(decode_data_items(bytes)?),
                None => Ok(DataItems::new()),
            }
        };
        Ok(Self {
            base: load(keys::HISTORY_BASE_DATA)?,
            staged: load(keys::HISTORY_STAGED_DATA)?,
        })
    }

    /// Last committed snapshot.
    pub fn base(&self) -> &DataItems {
        &self.base
    }

    /// Updates accumulated since the last record.
    pub fn staged(&self) -> &DataItems {
        &self.staged
    }

    /// Merge `data` into the staged buffer without persisting.
    pub fn stage(&mut self, data: &DataItems) {
        self.staged.merge(data);
    }

    /// Produce the record for `step` without persisting.
    ///
    /// Afterwards `staged` is empty and `base` has absorbed the diff.
    pub fn record(&mut self, step: u32, state: &str) -> HistoryRecord {
        let diff = self.base.diff_with(&self.staged);
        self.staged.clear();
        self.base.merge(&diff);
        HistoryRecord::new(step, state, diff)
    }

    /// Stage `data` and persist the staged buffer.
    pub fn stage_update(
        &mut self,
        data: &DataItems,
        resource: &dyn TransactionalResource,
    ) -> Result<(), HistoryError> {
        self.stage(data);
        let block = CriticalDataBlock::new()
            .with(keys::HISTORY_STAGED_DATA, encode_data_items(&self.staged));
        resource.write_critical_data(&block)?;
        Ok(())
    }

    /// Create the record for `step` and persist both buffers.
    pub fn create_record(
        &mut self,
        step: u32,
        state: &str,
        resource: &dyn TransactionalResource,
    ) -> Result<HistoryRecord, HistoryError> {
        let record = self.record(step, state);
        resource.write_critical_data(&self.to_block())?;
        Ok(record)
    }

    /// Empty both buffers and persist the empty state.
    pub fn clear(&mut self, resource: &dyn TransactionalResource) -> Result<(), HistoryError> {
        self.base.clear();
        self.staged.clear();
        resource.write_critical_data(&self.to_block())?;
        Ok(())
    }

    fn to_block(&self) -> CriticalDataBlock {
        CriticalDataBlock::new()
            .with(keys::HISTORY_BASE_DATA, encode_data_items(&self.base))
            .with(keys::HISTORY_STAGED_DATA, encode_data_items(&self.staged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_items() -> impl Strategy<Value = DataItems> {
        prop::collection::vec(("[a-c]", "[u-z]", 0i64..5), 0..10)
            .prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn record_emits_delta_and_folds_it_into_base(
            initial in arb_items(),
            updates in prop::collection::vec(arb_items(), 0..5),
        ) {
            let mut rec = StagedDiffRecorder::new();
            rec.stage(&initial);
            rec.record(1, "Setup");
            let old_base = rec.base().clone();

            let mut union = DataItems::new();
            for u in &updates {
                rec.stage(u);
                union.merge(u);
            }
            let record = rec.record(2, "Spin");

            // Every emitted entry is a staged value that differs from base.
            prop_assert_eq!(&record.data, &old_base.diff_with(&union));
            for (p, s, v) in union.iter() {
                let unchanged = old_base.get(p, s) == Some(v);
                prop_assert_eq!(record.data.get(p, s).is_none(), unchanged);
            }

            let mut expected_base = old_base.clone();
            expected_base.merge(&record.data);
            prop_assert_eq!(rec.base(), &expected_base);
            prop_assert!(rec.staged().is_empty());
        }
    }

    #[test]
    fn unchanged_values_are_not_recorded() {
        let mut rec = StagedDiffRecorder::new();
        rec.stage(&DataItems::new().with("meters", "credit", 100));
        let first = rec.record(1, "Idle");
        assert_eq!(first.data.len(), 1);

        rec.stage(&DataItems::new().with("meters", "credit", 100).with("meters", "win", 5));
        let second = rec.record(2, "Spin");
        assert_eq!(second.data, DataItems::new().with("meters", "win", 5));
        assert_eq!(second.step_number, 2);
        assert_eq!(second.state_name, "Spin");
    }
}
