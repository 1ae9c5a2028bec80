//! Built-in state machine run in history mode.
//!
//! A single state walks the recorded step pairs. Each pass through the
//! state shows one step: the coplayer diff is merged into a running
//! reconstruction, and the shell snapshot of the same step is laid over
//! it for presentation. Navigation events from presentation move to the
//! next step or restart from the first.
//!
//! The number of the step on show is persisted with each pass, so a
//! replay recovered after a power hit shows the same step again.

use tracing::debug;

use croupier_core::{
    keys, CriticalDataBlock, DataItems, Event, HistoryNavigation, PresentationEvent, Step,
    StepControl, TransactionWeight, TransactionalResource,
};
use croupier_history::codec::{decode_counter, encode_counter};
use croupier_history::{HistoryReader, HistoryStepPair};

use crate::context::{PhaseContext, PhaseServices};
use crate::error::FrameworkError;
use crate::event_queue::WaitOutcome;
use crate::state::{GameState, StateMachine};

/// Name of the replay state and machine.
pub const HISTORY_REPLAY_STATE: &str = "HistoryReplay";

/// Provider under which replay position is presented.
pub const HISTORY_PROVIDER: &str = "History";

/// The replay state.
#[derive(Debug, Default)]
pub struct HistoryReplayState {
    reader: Option<HistoryReader>,
    reconstruction: DataItems,
    current: Option<HistoryStepPair>,
}

impl HistoryReplayState {
    /// Create a replay state positioned before the first step.
    pub fn new() -> Self {
        Self::default()
    }

    /// Coplayer data reconstructed up to the current step.
    pub fn reconstruction(&self) -> &DataItems {
        &self.reconstruction
    }

    /// Pair shown by the current pass, if any step remained.
    pub fn current(&self) -> Option<&HistoryStepPair> {
        self.current.as_ref()
    }

    /// Reopen the reader and replay up to the persisted position.
    fn restore(&mut self, resource: &dyn TransactionalResource) -> Result<(), FrameworkError> {
        let mut reader = HistoryReader::open(resource)?;
        let block = resource.read_critical_data(&[keys::HISTORY_REPLAY_POSITION])?;
        let shown = match block.get(keys::HISTORY_REPLAY_POSITION) {
            Some(bytes) => decode_counter(bytes)?,
            None => 0,
        };
        self.reconstruction.clear();
        self.current = None;
        while reader.position() <= shown {
            let Some(pair) = reader.next_pair(resource)? else {
                break;
            };
            self.reconstruction.merge(&pair.coplayer.data);
            self.current = Some(pair);
        }
        debug!(shown, total = reader.total_steps(), "history replay restored");
        self.reader = Some(reader);
        Ok(())
    }

    fn presented(&self) -> DataItems {
        let mut shown = self.reconstruction.clone();
        let total = self.reader.as_ref().map_or(0, HistoryReader::total_steps);
        shown.insert(HISTORY_PROVIDER, "TotalSteps", total);
        if let Some(pair) = &self.current {
            shown.merge(&pair.shell.data);
            shown.insert(HISTORY_PROVIDER, "StepNumber", pair.coplayer.step_number);
            shown.insert(HISTORY_PROVIDER, "StateName", pair.coplayer.state_name.as_str());
        }
        shown
    }
}

impl<C: PhaseServices> GameState<C> for HistoryReplayState {
    fn name(&self) -> &str {
        HISTORY_REPLAY_STATE
    }

    fn transaction_weight(&self, step: Step) -> TransactionWeight {
        match step {
            Step::Processing => TransactionWeight::Light,
            _ => TransactionWeight::None,
        }
    }

    fn processing(&mut self, ctx: &mut PhaseContext<'_, C>) -> Result<StepControl, FrameworkError> {
        if self.reader.is_none() {
            self.reader = Some(HistoryReader::open(ctx.resource())?);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(StepControl::GoNext);
        };
        if let Some(pair) = reader.next_pair(ctx.resource())? {
            ctx.write_critical_data(&CriticalDataBlock::new().with(
                keys::HISTORY_REPLAY_POSITION,
                encode_counter(pair.coplayer.step_number),
            ))?;
            self.reconstruction.merge(&pair.coplayer.data);
            self.current = Some(pair);
        }
        Ok(StepControl::GoNext)
    }

    fn committed_pre_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        if self.reader.is_none() {
            self.restore(ctx.resource())?;
        }
        ctx.start_presentation(&self.presented())?;
        Ok(StepControl::GoNext)
    }

    fn committed_wait(
        &mut self,
        ctx: &mut PhaseContext<'_, C>,
    ) -> Result<StepControl, FrameworkError> {
        let outcome = ctx.next_event(|_, event| {
            matches!(
                event,
                Event::Presentation(PresentationEvent::HistoryNavigation(_))
            )
        })?;
        let navigation = match outcome {
            WaitOutcome::Event(dispatched) => match dispatched.event {
                Event::Presentation(PresentationEvent::HistoryNavigation(navigation)) => navigation,
                _ => return Ok(StepControl::RepeatWait),
            },
            WaitOutcome::Interrupted(_) => return Ok(StepControl::RepeatWait),
        };

        if navigation == HistoryNavigation::First {
            if let Some(reader) = &mut self.reader {
                reader.reset();
            }
            self.reconstruction.clear();
            self.current = None;
        }
        ctx.set_next_state(HISTORY_REPLAY_STATE);
        Ok(StepControl::ExitState)
    }
}

/// The history-mode machine: one [`HistoryReplayState`].
pub fn history_replay_machine<C: PhaseServices + 'static>() -> Result<StateMachine<C>, FrameworkError>
{
    StateMachine::builder(HISTORY_REPLAY_STATE)
        .state(HistoryReplayState::new())
        .initial_state(HISTORY_REPLAY_STATE)
        .build()
}
