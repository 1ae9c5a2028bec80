//! Runner and shell configuration, validation, and error types.
//!
//! Configs are plain structs with `Default`; constructors call
//! `validate()` and refuse to start on the first violated invariant.

use std::time::Duration;

pub use croupier_history::HistoryConfig;

// ── RunnerConfig ───────────────────────────────────────────────────

/// Configuration shared by every runner thread.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Thread and log name. Must be non-empty.
    pub name: String,
    /// Upper bound on a single blocking wait before the coordinator
    /// re-runs its drain cycle. `None` waits until an event or interrupt
    /// arrives. Default: `None`.
    pub idle_wait: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: "runner".to_string(),
            idle_wait: None,
        }
    }
}

impl RunnerConfig {
    /// Config with the given thread name and default settings.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyRunnerName);
        }
        if self.idle_wait == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroDuration { field: "idle_wait" });
        }
        Ok(())
    }
}

// ── ShellConfig ────────────────────────────────────────────────────

/// Configuration of the shell runner and its coplayer pool.
#[derive(Clone, Debug)]
pub struct ShellConfig {
    /// Shell runner settings.
    pub runner: RunnerConfig,
    /// Maximum concurrently running coplayers. Default: 8.
    pub max_coplayers: usize,
    /// How often shutting a coplayer down re-cancels the operations it
    /// queued for the shell while waiting for its thread to end.
    /// Default: 50 ms.
    pub retire_poll_interval: Duration,
    /// History settings handed to every coplayer.
    pub history: HistoryConfig,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            runner: RunnerConfig::named("shell"),
            max_coplayers: 8,
            retire_poll_interval: Duration::from_millis(50),
            history: HistoryConfig::default(),
        }
    }
}

impl ShellConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runner.validate()?;
        if self.max_coplayers == 0 {
            return Err(ConfigError::NoCoplayerSlots);
        }
        if self.retire_poll_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "retire_poll_interval",
            });
        }
        Ok(())
    }

    /// Runner config for the coplayer in slot `id`.
    pub(crate) fn coplayer_runner(&self, id: croupier_core::CoplayerId) -> RunnerConfig {
        RunnerConfig {
            name: format!("{}-coplayer-{id}", self.runner.name),
            idle_wait: self.runner.idle_wait,
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by `validate()`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Runner name is empty or whitespace.
    #[error("runner name must not be empty")]
    EmptyRunnerName,
    /// A duration that must be positive is zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Offending field.
        field: &'static str,
    },
    /// The shell allows no coplayers.
    #[error("max_coplayers must be at least 1")]
    NoCoplayerSlots,
}
