//! Immutable per-step history records.

use crate::data::DataItems;

/// One recorded history step.
///
/// `step_number` is 1-based and strictly increasing within a game cycle.
/// On the coplayer side `data` holds only the entries that changed since
/// the previous record; on the shell side it is a full snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRecord {
    /// 1-based step number.
    pub step_number: u32,
    /// State that was being presented when the step was recorded.
    pub state_name: String,
    /// Recorded data.
    pub data: DataItems,
}

impl HistoryRecord {
    /// Assemble a record.
    pub fn new(step_number: u32, state_name: impl Into<String>, data: DataItems) -> Self {
        Self {
            step_number,
            state_name: state_name.into(),
            data,
        }
    }
}
