//! The narrow contracts through which the host platform is reached.

use indexmap::IndexMap;

use crate::data::DataItems;
use crate::error::ResourceError;
use crate::step::{GameMode, TransactionWeight};

/// A batch of critical-data entries, keyed by critical-data key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CriticalDataBlock {
    entries: IndexMap<String, Vec<u8>>,
}

impl CriticalDataBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.entries.insert(key.into(), bytes);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(key, bytes);
        self
    }

    /// Bytes stored under `key`.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Take the bytes stored under `key` out of the block.
    pub fn take(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.shift_remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the block holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Host transaction and critical-data primitives.
///
/// Implementations serialize transactions across sessions themselves.
/// An open call returns `Ok(false)` when a higher-priority interrupt
/// preempted the transaction; the body did not run and the caller must
/// repeat the step.
pub trait TransactionalResource: Send + Sync {
    /// Run `body` inside a heavyweight transaction.
    fn open_heavy_transaction(
        &self,
        name: &str,
        body: &mut dyn FnMut(),
    ) -> Result<bool, ResourceError>;

    /// Run `body` inside a lightweight transaction.
    fn open_light_transaction(
        &self,
        name: &str,
        body: &mut dyn FnMut(),
    ) -> Result<bool, ResourceError>;

    /// Read the entries present for `keys`. Absent keys are simply
    /// missing from the returned block.
    fn read_critical_data(&self, keys: &[&str]) -> Result<CriticalDataBlock, ResourceError>;

    /// Persist every entry of `block`.
    fn write_critical_data(&self, block: &CriticalDataBlock) -> Result<(), ResourceError>;

    /// Remove `keys` from critical data.
    fn remove_critical_data(&self, keys: &[&str]) -> Result<(), ResourceError>;

    /// Run `body` in a transaction of `weight`; `None` runs it directly.
    fn open_transaction(
        &self,
        weight: TransactionWeight,
        name: &str,
        body: &mut dyn FnMut(),
    ) -> Result<bool, ResourceError> {
        match weight {
            TransactionWeight::None => {
                body();
                Ok(true)
            }
            TransactionWeight::Light => self.open_light_transaction(name, body),
            TransactionWeight::Heavy => self.open_heavy_transaction(name, body),
        }
    }
}

/// One-way pushes to the presentation layer.
///
/// Completion comes back asynchronously as a
/// [`PresentationEvent::StateComplete`](crate::PresentationEvent::StateComplete)
/// event.
pub trait PresentationChannel: Send + Sync {
    /// Start presenting `state` with `data`.
    fn start_state(&self, state: &str, data: &DataItems);

    /// Push asynchronously refreshed data for the state being presented.
    fn update_async_data(&self, state: &str, data: &DataItems);

    /// The context running in `mode` was deactivated.
    fn context_exited(&self, _mode: GameMode) {}
}
