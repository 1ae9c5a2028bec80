//! Service providers and the per-framework service controller.
//!
//! Each state declares, per game mode, which provider services it wants
//! when its presentation starts (sync) and which it wants pushed as they
//! change (async). [`ServiceRequestDataMaps`] partitions a master request
//! list into those four views once; a [`ServiceController`] answers them
//! against the providers in a [`ServiceRegistry`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use indexmap::IndexMap;
use tracing::trace;

use croupier_core::{DataItems, DataValue, GameMode, ThemeInfo};

use crate::accumulator::AsyncUpdateAccumulator;
use crate::error::FrameworkError;

// ── Requests ───────────────────────────────────────────────────────

/// How a requested service reaches presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceUpdate {
    /// Filled once when the state's presentation starts.
    Sync,
    /// Pushed whenever the provider reports a change.
    Async,
}

/// One service a state asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Provider name.
    pub provider: String,
    /// Service id within the provider.
    pub service: String,
    /// Delivery kind.
    pub update: ServiceUpdate,
    /// Requested in play mode.
    pub play: bool,
    /// Requested in history mode.
    pub history: bool,
}

impl ServiceRequest {
    /// A sync request active in both play and history mode.
    pub fn sync(provider: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            service: service.into(),
            update: ServiceUpdate::Sync,
            play: true,
            history: true,
        }
    }

    /// An async request active in both play and history mode.
    pub fn async_update(provider: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            update: ServiceUpdate::Async,
            ..Self::sync(provider, service)
        }
    }

    /// Restrict the request to play mode.
    pub fn play_only(mut self) -> Self {
        self.history = false;
        self
    }

    /// Restrict the request to history mode.
    pub fn history_only(mut self) -> Self {
        self.play = false;
        self
    }
}

/// Provider name → requested service ids.
pub type RequestedServices = IndexMap<String, Vec<String>>;

/// State name → requested services, for one mode and update kind.
type Partition = IndexMap<String, RequestedServices>;

/// The four (mode × update) views of a master request list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceRequestDataMaps {
    play_sync: Partition,
    play_async: Partition,
    history_sync: Partition,
    history_async: Partition,
}

impl ServiceRequestDataMaps {
    /// Partition `master` (state name → requests).
    pub fn from_master<'a, I, S>(master: I) -> Self
    where
        I: IntoIterator<Item = (S, &'a [ServiceRequest])>,
        S: Into<String>,
    {
        let mut maps = Self::default();
        for (state, requests) in master {
            let state = state.into();
            for request in requests {
                let partitions = [
                    (request.play, GameMode::Play),
                    (request.history, GameMode::History),
                ];
                for (wanted, mode) in partitions {
                    if !wanted {
                        continue;
                    }
                    if let Some(partition) = maps.partition_mut(mode, request.update) {
                        partition
                            .entry(state.clone())
                            .or_default()
                            .entry(request.provider.clone())
                            .or_default()
                            .push(request.service.clone());
                    }
                }
            }
        }
        maps
    }

    fn partition_mut(&mut self, mode: GameMode, update: ServiceUpdate) -> Option<&mut Partition> {
        match (mode, update) {
            (GameMode::Play, ServiceUpdate::Sync) => Some(&mut self.play_sync),
            (GameMode::Play, ServiceUpdate::Async) => Some(&mut self.play_async),
            (GameMode::History, ServiceUpdate::Sync) => Some(&mut self.history_sync),
            (GameMode::History, ServiceUpdate::Async) => Some(&mut self.history_async),
            (GameMode::Utility, _) => None,
        }
    }

    /// Services `state` requests in `mode` for `update`.
    pub fn requests(
        &self,
        mode: GameMode,
        update: ServiceUpdate,
        state: &str,
    ) -> Option<&RequestedServices> {
        let partition = match (mode, update) {
            (GameMode::Play, ServiceUpdate::Sync) => &self.play_sync,
            (GameMode::Play, ServiceUpdate::Async) => &self.play_async,
            (GameMode::History, ServiceUpdate::Sync) => &self.history_sync,
            (GameMode::History, ServiceUpdate::Async) => &self.history_async,
            (GameMode::Utility, _) => return None,
        };
        partition.get(state)
    }
}

/// Service request maps for every known theme.
#[derive(Clone, Debug, Default)]
pub struct ServiceRequestCatalog {
    themes: IndexMap<String, Arc<ServiceRequestDataMaps>>,
}

impl ServiceRequestCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the request maps of `theme`.
    pub fn insert(&mut self, theme: impl Into<String>, maps: ServiceRequestDataMaps) {
        self.themes.insert(theme.into(), Arc::new(maps));
    }

    /// Request maps of `theme`.
    pub fn for_theme(&self, theme: &ThemeInfo) -> Result<Arc<ServiceRequestDataMaps>, FrameworkError> {
        self.themes
            .get(&theme.name)
            .cloned()
            .ok_or_else(|| FrameworkError::MissingServiceRequestData {
                theme: theme.name.clone(),
            })
    }
}

// ── Providers ──────────────────────────────────────────────────────

/// A source of service values (meters, denominations, bank state...).
pub trait ServiceProvider: Send + Sync {
    /// Provider name used in requests and [`DataItems`].
    fn name(&self) -> &str;

    /// Current value of `service`, if the provider offers it.
    fn value(&self, service: &str) -> Option<DataValue>;
}

/// Registered providers plus the controllers listening for changes.
#[derive(Default)]
pub struct ServiceRegistry {
    providers: RwLock<IndexMap<String, Arc<dyn ServiceProvider>>>,
    listeners: Mutex<Vec<Weak<ServiceController>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider`, replacing any provider of the same name.
    pub fn register(&self, provider: Arc<dyn ServiceProvider>) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.name().to_string(), provider);
    }

    /// Current value of `provider.service`.
    pub fn value(&self, provider: &str, service: &str) -> Option<DataValue> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.get(provider)?.value(service)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Weak<ServiceController>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(&self, controller: Weak<ServiceController>) {
        self.listeners().push(controller);
    }

    /// Tell every live controller that `provider` changed.
    pub fn notify_provider_changed(&self, provider: &str) {
        let live: Vec<Arc<ServiceController>> = {
            let mut listeners = self.listeners();
            listeners.retain(|weak| weak.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for controller in live {
            controller.on_provider_changed(provider);
        }
    }

    /// Number of live controllers.
    pub fn listener_count(&self) -> usize {
        self.listeners()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ServiceRegistry")
            .field("providers", &providers.keys().collect::<Vec<_>>())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ── Controller ─────────────────────────────────────────────────────

/// Answers a framework's service requests for its current state.
pub struct ServiceController {
    registry: Arc<ServiceRegistry>,
    requests: Arc<ServiceRequestDataMaps>,
    mode: GameMode,
    current_state: Mutex<Option<String>>,
    sink: AsyncUpdateAccumulator,
}

impl ServiceController {
    /// Create a controller and subscribe it to provider changes.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        requests: Arc<ServiceRequestDataMaps>,
        mode: GameMode,
        sink: AsyncUpdateAccumulator,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            registry: Arc::clone(&registry),
            requests,
            mode,
            current_state: Mutex::new(None),
            sink,
        });
        registry.subscribe(Arc::downgrade(&controller));
        controller
    }

    fn current(&self) -> MutexGuard<'_, Option<String>> {
        self.current_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// State whose presentation last started.
    pub fn current_state(&self) -> Option<String> {
        self.current().clone()
    }

    fn collect(&self, update: ServiceUpdate, state: &str, only: Option<&str>) -> DataItems {
        let mut items = DataItems::new();
        let Some(requested) = self.requests.requests(self.mode, update, state) else {
            return items;
        };
        for (provider, services) in requested {
            if only.is_some_and(|p| p != provider.as_str()) {
                continue;
            }
            for service in services {
                if let Some(value) = self.registry.value(provider, service) {
                    items.insert(provider.as_str(), service.as_str(), value);
                }
            }
        }
        items
    }

    /// Sync values for `state`, which becomes the current state.
    pub fn fill_sync(&self, state: &str) -> DataItems {
        *self.current() = Some(state.to_string());
        self.collect(ServiceUpdate::Sync, state, None)
    }

    /// Async values for `state`.
    pub fn fill_async(&self, state: &str) -> DataItems {
        self.collect(ServiceUpdate::Async, state, None)
    }

    /// Push refreshed async values of `provider` for the current state.
    pub fn on_provider_changed(&self, provider: &str) {
        let Some(state) = self.current_state() else {
            return;
        };
        let data = self.collect(ServiceUpdate::Async, &state, Some(provider));
        if !data.is_empty() {
            trace!(state = %state, provider, "async service update");
            self.sink.push(&state, &data);
        }
    }
}

impl std::fmt::Debug for ServiceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceController")
            .field("mode", &self.mode)
            .field("current_state", &self.current_state())
            .finish_non_exhaustive()
    }
}
