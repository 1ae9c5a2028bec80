//! Test utilities and in-memory host doubles for Croupier development.
//!
//! Provides an in-memory [`TransactionalResource`] with transaction
//! tracking and forced preemption, a [`PresentationChannel`] that records
//! every push, and small data builders in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use croupier_core::{
    CriticalDataBlock, DataItems, GameMode, PresentationChannel, ResourceError,
    TransactionWeight, TransactionalResource,
};

/// One transaction request seen by [`InMemoryResource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    pub name: String,
    pub weight: TransactionWeight,
    pub opened: bool,
}

#[derive(Default)]
struct ResourceState {
    store: IndexMap<String, Vec<u8>>,
    open: Option<String>,
    refuse_next: u32,
    log: Vec<TransactionRecord>,
    writes: usize,
}

/// In-memory host resource.
///
/// Writes and removals outside a transaction fail with
/// [`ResourceError::NoTransaction`]; nested transactions fail with
/// [`ResourceError::TransactionAlreadyOpen`]. Reads are always allowed.
/// [`refuse_next_transactions`](Self::refuse_next_transactions) makes the
/// next open calls report "not opened", as a higher-priority interrupt
/// would.
#[derive(Default)]
pub struct InMemoryResource {
    state: Mutex<ResourceState>,
}

impl InMemoryResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed critical data before the code under test runs.
    pub fn with_data(block: &CriticalDataBlock) -> Self {
        let resource = Self::new();
        {
            let mut state = resource.lock();
            for (key, bytes) in block.iter() {
                state.store.insert(key.to_string(), bytes.to_vec());
            }
        }
        resource
    }

    fn lock(&self) -> MutexGuard<'_, ResourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next `n` open calls return `Ok(false)` without running the body.
    pub fn refuse_next_transactions(&self, n: u32) {
        self.lock().refuse_next = n;
    }

    /// Every transaction request so far, in order.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.lock().log.clone()
    }

    /// Names of transactions that actually opened.
    pub fn opened_transaction_names(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|t| t.opened)
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn is_in_transaction(&self) -> bool {
        self.lock().open.is_some()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().store.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().store.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().store.keys().cloned().collect()
    }

    /// Number of `write_critical_data` calls that succeeded.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Write directly, bypassing transaction checks (test setup).
    pub fn seed(&self, key: &str, bytes: Vec<u8>) {
        self.lock().store.insert(key.to_string(), bytes);
    }

    /// Run `body` inside a heavy transaction, panicking if it does not open.
    pub fn in_transaction<T>(&self, body: impl FnOnce() -> T) -> T {
        let mut body = Some(body);
        let mut out = None;
        let opened = self
            .open_heavy_transaction("test", &mut || {
                if let Some(body) = body.take() {
                    out = Some(body());
                }
            })
            .expect("test transaction failed");
        assert!(opened, "test transaction was refused");
        out.expect("test transaction body did not run")
    }

    fn open(
        &self,
        weight: TransactionWeight,
        name: &str,
        body: &mut dyn FnMut(),
    ) -> Result<bool, ResourceError> {
        {
            let mut state = self.lock();
            if let Some(open) = &state.open {
                return Err(ResourceError::TransactionAlreadyOpen {
                    requested: name.to_string(),
                    open: open.clone(),
                });
            }
            let refused = state.refuse_next > 0;
            state.log.push(TransactionRecord {
                name: name.to_string(),
                weight,
                opened: !refused,
            });
            if refused {
                state.refuse_next -= 1;
                return Ok(false);
            }
            state.open = Some(name.to_string());
        }
        body();
        self.lock().open = None;
        Ok(true)
    }
}

impl TransactionalResource for InMemoryResource {
    fn open_heavy_transaction(
        &self,
        name: &str,
        body: &mut dyn FnMut(),
    ) -> Result<bool, ResourceError> {
        self.open(TransactionWeight::Heavy, name, body)
    }

    fn open_light_transaction(
        &self,
        name: &str,
        body: &mut dyn FnMut(),
    ) -> Result<bool, ResourceError> {
        self.open(TransactionWeight::Light, name, body)
    }

    fn read_critical_data(&self, keys: &[&str]) -> Result<CriticalDataBlock, ResourceError> {
        let state = self.lock();
        let mut block = CriticalDataBlock::new();
        for key in keys {
            if let Some(bytes) = state.store.get(*key) {
                block.insert(*key, bytes.clone());
            }
        }
        Ok(block)
    }

    fn write_critical_data(&self, block: &CriticalDataBlock) -> Result<(), ResourceError> {
        let mut state = self.lock();
        if state.open.is_none() {
            return Err(ResourceError::NoTransaction);
        }
        for (key, bytes) in block.iter() {
            state.store.insert(key.to_string(), bytes.to_vec());
        }
        state.writes += 1;
        Ok(())
    }

    fn remove_critical_data(&self, keys: &[&str]) -> Result<(), ResourceError> {
        let mut state = self.lock();
        if state.open.is_none() {
            return Err(ResourceError::NoTransaction);
        }
        for key in keys {
            state.store.shift_remove(*key);
        }
        Ok(())
    }
}

/// A push observed by [`RecordingPresentation`].
#[derive(Clone, Debug, PartialEq)]
pub enum PresentationCall {
    StartState { state: String, data: DataItems },
    AsyncUpdate { state: String, data: DataItems },
    ContextExited(GameMode),
}

/// Presentation channel that records every call.
#[derive(Default)]
pub struct RecordingPresentation {
    calls: Mutex<Vec<PresentationCall>>,
}

impl RecordingPresentation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PresentationCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Names of started states, in order.
    pub fn started_states(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PresentationCall::StartState { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Data pushed with the most recent `start_state`.
    pub fn last_started_data(&self) -> Option<DataItems> {
        self.calls().into_iter().rev().find_map(|c| match c {
            PresentationCall::StartState { data, .. } => Some(data),
            _ => None,
        })
    }

    fn push(&self, call: PresentationCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl PresentationChannel for RecordingPresentation {
    fn start_state(&self, state: &str, data: &DataItems) {
        self.push(PresentationCall::StartState {
            state: state.to_string(),
            data: data.clone(),
        });
    }

    fn update_async_data(&self, state: &str, data: &DataItems) {
        self.push(PresentationCall::AsyncUpdate {
            state: state.to_string(),
            data: data.clone(),
        });
    }

    fn context_exited(&self, mode: GameMode) {
        self.push(PresentationCall::ContextExited(mode));
    }
}
