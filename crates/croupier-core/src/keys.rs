//! Critical-data key layout.
//!
//! These strings are persisted on the host and must stay stable across
//! releases, or recovery after a power hit reads nothing.

use crate::step::GameMode;

/// Total number of recorded history steps.
pub const STEPS: &str = "Steps";
/// Most recent shell history record.
pub const SHELL_LAST_STEP: &str = "ShellLastStep";
/// History step counter of the current game cycle.
pub const HISTORY_STEP_COUNT: &str = "HistoryManager.StepCount";
/// History write-enable gate.
pub const HISTORY_WRITE_ENABLED: &str = "HistoryManager.HistoryWriteEnabled";
/// State marked by the last begun history step.
pub const MARKED_HISTORY_STATE: &str = "HistoryManager.MarkedHistoryState";
/// Coplayer recorder staged buffer.
pub const HISTORY_STAGED_DATA: &str = "HistoryManager.StagedData";
/// Coplayer recorder base snapshot.
pub const HISTORY_BASE_DATA: &str = "HistoryManager.BaseData";
/// Step number history replay last showed.
pub const HISTORY_REPLAY_POSITION: &str = "HistoryReplay.Position";

/// `"{framework}/{mode}Mode/StateInfo"`.
pub fn state_info(framework: &str, mode: GameMode) -> String {
    format!("{framework}/{}Mode/StateInfo", mode.as_str())
}

/// `"Step{n}"`, the coplayer record of step `n`.
pub fn coplayer_step(n: u32) -> String {
    format!("Step{n}")
}

/// `"Shell/Step{n}"`, the shell record of step `n`.
pub fn shell_step(n: u32) -> String {
    format!("Shell/Step{n}")
}
