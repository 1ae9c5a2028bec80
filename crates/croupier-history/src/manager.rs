//! Step numbering, write gating and paired record persistence.
//!
//! [`HistoryManager`] runs on a coplayer thread and is only called from
//! inside that thread's transactions, which serializes every step write.
//! Its persisted fields are loaded lazily on first use so it can be
//! constructed before any transaction is open.

use std::sync::Arc;

use croupier_core::keys;
use croupier_core::{CriticalDataBlock, DataItems, HistoryRecord, TransactionalResource};
use tracing::debug;

use crate::codec::{
    decode_counter, decode_flag, decode_optional_text, encode_counter, encode_flag,
    encode_history_record, encode_optional_text,
};
use crate::concurrent::ConcurrentHistoryRecorder;
use crate::error::HistoryError;
use crate::staged::StagedDiffRecorder;

/// History recording options.
#[derive(Clone, Debug)]
pub struct HistoryConfig {
    /// Whether history writing starts enabled when critical data holds no
    /// write-enable flag yet. Default: `true`.
    pub enable_on_cold_boot: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enable_on_cold_boot: true,
        }
    }
}

/// Coplayer history orchestrator.
pub struct HistoryManager {
    config: HistoryConfig,
    recorder: StagedDiffRecorder,
    shell: Arc<ConcurrentHistoryRecorder>,
    loaded: bool,
    step_count: u32,
    write_enabled: bool,
    marked_state: Option<String>,
}

impl HistoryManager {
    /// Create a manager that pairs its records with `shell`.
    pub fn new(shell: Arc<ConcurrentHistoryRecorder>, config: HistoryConfig) -> Self {
        let write_enabled = config.enable_on_cold_boot;
        Self {
            config,
            recorder: StagedDiffRecorder::new(),
            shell,
            loaded: false,
            step_count: 0,
            write_enabled,
            marked_state: None,
        }
    }

    /// Load persisted state. Later calls are no-ops.
    pub fn load(&mut self, resource: &dyn TransactionalResource) -> Result<(), HistoryError> {
        if self.loaded {
            return Ok(());
        }
        let block = resource.read_critical_data(&[
            keys::HISTORY_STEP_COUNT,
            keys::HISTORY_WRITE_ENABLED,
            keys::MARKED_HISTORY_STATE,
            keys::HISTORY_BASE_DATA,
            keys::HISTORY_STAGED_DATA,
        ])?;
        self.step_count = match block.get(keys::HISTORY_STEP_COUNT) {
            Some(bytes) => decode_counter(bytes)?,
            None => 0,
        };
        self.write_enabled = match block.get(keys::HISTORY_WRITE_ENABLED) {
            Some(bytes) => decode_flag(bytes)?,
            None => self.config.enable_on_cold_boot,
        };
        self.marked_state = match block.get(keys::MARKED_HISTORY_STATE) {
            Some(bytes) => decode_optional_text(bytes)?,
            None => None,
        };
        self.recorder = StagedDiffRecorder::from_block(&block)?;
        self.loaded = true;
        debug!(
            steps = self.step_count,
            write_enabled = self.write_enabled,
            "history state loaded"
        );
        Ok(())
    }

    /// Steps recorded in the current game cycle.
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    /// Whether begin/end calls currently have effect.
    pub fn is_write_enabled(&self) -> bool {
        self.write_enabled
    }

    /// State marked by the currently open step.
    pub fn marked_state(&self) -> Option<&str> {
        self.marked_state.as_deref()
    }

    /// The underlying staged recorder.
    pub fn recorder(&self) -> &StagedDiffRecorder {
        &self.recorder
    }

    /// Allow history steps to be recorded.
    pub fn enable_history_write(
        &mut self,
        resource: &dyn TransactionalResource,
    ) -> Result<(), HistoryError> {
        self.load(resource)?;
        self.write_enabled = true;
        resource.write_critical_data(
            &CriticalDataBlock::new().with(keys::HISTORY_WRITE_ENABLED, encode_flag(true)),
        )?;
        Ok(())
    }

    /// Stop recording history steps and drop any open step.
    pub fn disable_history_write(
        &mut self,
        resource: &dyn TransactionalResource,
    ) -> Result<(), HistoryError> {
        self.load(resource)?;
        self.write_enabled = false;
        self.marked_state = None;
        resource.write_critical_data(
            &CriticalDataBlock::new()
                .with(keys::HISTORY_WRITE_ENABLED, encode_flag(false))
                .with(keys::MARKED_HISTORY_STATE, encode_optional_text(None)),
        )?;
        Ok(())
    }

    /// Open a history step for `state`. Returns `false` when writing is
    /// disabled.
    pub fn begin_history_step(
        &mut self,
        state: &str,
        resource: &dyn TransactionalResource,
    ) -> Result<bool, HistoryError> {
        self.load(resource)?;
        if !self.write_enabled {
            return Ok(false);
        }
        self.marked_state = Some(state.to_string());
        resource.write_critical_data(
            &CriticalDataBlock::new()
                .with(keys::MARKED_HISTORY_STATE, encode_optional_text(Some(state))),
        )?;
        Ok(true)
    }

    /// Stage presented data for the next record.
    pub fn stage_update(
        &mut self,
        data: &DataItems,
        resource: &dyn TransactionalResource,
    ) -> Result<(), HistoryError> {
        self.load(resource)?;
        self.recorder.stage_update(data, resource)
    }

    /// Close the open step, writing the coplayer diff paired with a full
    /// shell snapshot.
    ///
    /// Returns the step number written, or `None` when no step was begun
    /// or writing is disabled.
    pub fn end_history_step(
        &mut self,
        resource: &dyn TransactionalResource,
    ) -> Result<Option<u32>, HistoryError> {
        self.load(resource)?;
        if !self.write_enabled {
            return Ok(None);
        }
        let Some(state) = self.marked_state.clone() else {
            return Ok(None);
        };

        let step = self.step_count + 1;
        let shell = self.shell.create_history_record(step, None)?;
        let coplayer = self.recorder.create_record(step, &state, resource)?;
        write_step_pair(resource, &coplayer, &shell)?;

        self.step_count = step;
        self.marked_state = None;
        resource.write_critical_data(
            &CriticalDataBlock::new()
                .with(keys::HISTORY_STEP_COUNT, encode_counter(step))
                .with(keys::MARKED_HISTORY_STATE, encode_optional_text(None)),
        )?;
        debug!(step, state = %state, entries = coplayer.data.len(), "history step recorded");
        Ok(Some(step))
    }

    /// Start a new game cycle: forget recorded steps and tracked data.
    pub fn clear_tracked_data(
        &mut self,
        resource: &dyn TransactionalResource,
    ) -> Result<(), HistoryError> {
        self.load(resource)?;
        let mut stale: Vec<String> = (1..=self.step_count)
            .flat_map(|n| [keys::coplayer_step(n), keys::shell_step(n)])
            .collect();
        stale.push(keys::STEPS.to_string());
        stale.push(keys::SHELL_LAST_STEP.to_string());
        let stale: Vec<&str> = stale.iter().map(String::as_str).collect();
        resource.remove_critical_data(&stale)?;

        self.recorder.clear(resource)?;
        self.step_count = 0;
        self.marked_state = None;
        resource.write_critical_data(
            &CriticalDataBlock::new()
                .with(keys::HISTORY_STEP_COUNT, encode_counter(0))
                .with(keys::MARKED_HISTORY_STATE, encode_optional_text(None)),
        )?;
        debug!("history tracked data cleared");
        Ok(())
    }
}

/// Persist a coplayer/shell record pair as step `n`.
///
/// Writes `"Step{n}"`, `"Shell/Step{n}"`, `"Steps"` and `"ShellLastStep"`
/// in one block. Records with different step numbers are rejected.
pub fn write_step_pair(
    resource: &dyn TransactionalResource,
    coplayer: &HistoryRecord,
    shell: &HistoryRecord,
) -> Result<(), HistoryError> {
    if coplayer.step_number != shell.step_number {
        return Err(HistoryError::StepMismatch {
            coplayer: coplayer.step_number,
            shell: shell.step_number,
        });
    }
    let n = coplayer.step_number;
    let shell_bytes = encode_history_record(shell);
    let block = CriticalDataBlock::new()
        .with(keys::coplayer_step(n), encode_history_record(coplayer))
        .with(keys::shell_step(n), shell_bytes.clone())
        .with(keys::STEPS, encode_counter(n))
        .with(keys::SHELL_LAST_STEP, shell_bytes);
    resource.write_critical_data(&block)?;
    Ok(())
}
