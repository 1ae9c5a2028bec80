//! Accumulated service data: [`DataValue`] and [`DataItems`].
//!
//! `DataItems` is the currency of both the history recorders and the
//! service-update path. It is a two-level ordered map
//! `provider -> (service id -> value)`; insertion order is preserved so
//! that encoded records are stable across runs.

use std::fmt;

use indexmap::IndexMap;

/// A single service value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer (credits, counters, meter values).
    Int(i64),
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes owned by the provider.
    Bytes(Vec<u8>),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for DataValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for DataValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Ordered multimap from provider name to `(service id -> value)`.
///
/// Provider entries exist only while they hold at least one service, so
/// two `DataItems` with the same entries always compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataItems {
    providers: IndexMap<String, IndexMap<String, DataValue>>,
}

impl DataItems {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value for that entry.
    pub fn insert(
        &mut self,
        provider: impl Into<String>,
        service: impl Into<String>,
        value: impl Into<DataValue>,
    ) -> Option<DataValue> {
        self.providers
            .entry(provider.into())
            .or_default()
            .insert(service.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(
        mut self,
        provider: impl Into<String>,
        service: impl Into<String>,
        value: impl Into<DataValue>,
    ) -> Self {
        self.insert(provider, service, value);
        self
    }

    /// Look up a single entry.
    pub fn get(&self, provider: &str, service: &str) -> Option<&DataValue> {
        self.providers.get(provider)?.get(service)
    }

    /// All services recorded for one provider.
    pub fn provider(&self, provider: &str) -> Option<&IndexMap<String, DataValue>> {
        self.providers.get(provider)
    }

    /// Provider names in insertion order.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Remove one entry, dropping the provider if it becomes empty.
    pub fn remove(&mut self, provider: &str, service: &str) -> Option<DataValue> {
        let services = self.providers.get_mut(provider)?;
        let removed = services.shift_remove(service);
        if services.is_empty() {
            self.providers.shift_remove(provider);
        }
        removed
    }

    /// Iterate `(provider, service, value)` triples in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &DataValue)> {
        self.providers.iter().flat_map(|(provider, services)| {
            services
                .iter()
                .map(move |(service, value)| (provider.as_str(), service.as_str(), value))
        })
    }

    /// Number of `(provider, service)` entries.
    pub fn len(&self) -> usize {
        self.providers.values().map(IndexMap::len).sum()
    }

    /// Returns `true` if no entries are present.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Union `other` into `self`; values from `other` win.
    pub fn merge(&mut self, other: &DataItems) {
        for (provider, service, value) in other.iter() {
            self.insert(provider, service, value.clone());
        }
    }

    /// Entries of `other` that are absent from `self` or hold a different
    /// value. `self` is the base; the result is a subset of `other`.
    pub fn diff_with(&self, other: &DataItems) -> DataItems {
        let mut diff = DataItems::new();
        for (provider, service, value) in other.iter() {
            if self.get(provider, service) != Some(value) {
                diff.insert(provider, service, value.clone());
            }
        }
        diff
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.providers.clear();
    }
}

impl<P, S, V> FromIterator<(P, S, V)> for DataItems
where
    P: Into<String>,
    S: Into<String>,
    V: Into<DataValue>,
{
    fn from_iter<I: IntoIterator<Item = (P, S, V)>>(iter: I) -> Self {
        let mut items = DataItems::new();
        for (p, s, v) in iter {
            items.insert(p, s, v);
        }
        items
    }
}
