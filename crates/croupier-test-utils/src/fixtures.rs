//! Reusable data fixtures.

use croupier_core::{DataItems, DataValue};

/// Build `DataItems` from `(provider, service, value)` triples.
pub fn items<V: Into<DataValue> + Clone>(entries: &[(&str, &str, V)]) -> DataItems {
    entries
        .iter()
        .map(|(p, s, v)| (*p, *s, v.clone()))
        .collect()
}

/// A meter snapshot: `("meters", name, value)` entries.
pub fn meters(entries: &[(&str, i64)]) -> DataItems {
    entries
        .iter()
        .map(|&(name, value)| ("meters", name, value))
        .collect()
}
