//! Sequential reader over persisted history step pairs.
//!
//! [`HistoryReader`] walks `"Step{n}"` / `"Shell/Step{n}"` from step 1 up
//! to the recorded total. It holds only a cursor; every read goes to the
//! resource, so it must be called inside a transaction.

use croupier_core::keys;
use croupier_core::{HistoryRecord, TransactionalResource};

use crate::codec::{decode_counter, decode_history_record};
use crate::error::HistoryError;

/// A coplayer record and the shell record written with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryStepPair {
    /// Coplayer diff record.
    pub coplayer: HistoryRecord,
    /// Shell snapshot record.
    pub shell: HistoryRecord,
}

/// Cursor over recorded history steps.
#[derive(Clone, Debug)]
pub struct HistoryReader {
    total: u32,
    next: u32,
}

impl HistoryReader {
    /// Read the recorded total from `"Steps"` (absent means zero steps).
    pub fn open(resource: &dyn TransactionalResource) -> Result<Self, HistoryError> {
        let block = resource.read_critical_data(&[keys::STEPS])?;
        let total = match block.get(keys::STEPS) {
            Some(bytes) => decode_counter(bytes)?,
            None => 0,
        };
        Ok(Self::with_total(total))
    }

    /// Reader over a configured number of steps.
    pub fn with_total(total: u32) -> Self {
        Self { total, next: 1 }
    }

    /// Total steps this reader walks.
    pub fn total_steps(&self) -> u32 {
        self.total
    }

    /// Step number the next call returns.
    pub fn position(&self) -> u32 {
        self.next
    }

    /// Returns `true` once every step has been read.
    pub fn is_exhausted(&self) -> bool {
        self.next > self.total
    }

    /// Restart from step 1.
    pub fn reset(&mut self) {
        self.next = 1;
    }

    /// Read the next pair, or `None` past the last step.
    pub fn next_pair(
        &mut self,
        resource: &dyn TransactionalResource,
    ) -> Result<Option<HistoryStepPair>, HistoryError> {
        if self.is_exhausted() {
            return Ok(None);
        }
        let n = self.next;
        let coplayer_key = keys::coplayer_step(n);
        let shell_key = keys::shell_step(n);
        let block = resource.read_critical_data(&[coplayer_key.as_str(), shell_key.as_str()])?;

        let read = |key: &str| -> Result<HistoryRecord, HistoryError> {
            let bytes = block.get(key).ok_or_else(|| HistoryError::MissingRecord {
                key: key.to_string(),
            })?;
            Ok(decode_history_record(bytes)?)
        };
        let coplayer = read(&coplayer_key)?;
        let shell = read(&shell_key)?;
        if coplayer.step_number != shell.step_number {
            return Err(HistoryError::StepMismatch {
                coplayer: coplayer.step_number,
                shell: shell.step_number,
            });
        }

        self.next += 1;
        Ok(Some(HistoryStepPair { coplayer, shell }))
    }
}
