//! Strongly-typed identifiers for coplayers, host sessions and themes.

use std::fmt;

use smallvec::SmallVec;

/// Slot number of a coplayer under the shell.
///
/// Ids are recycled: when a coplayer shuts down its id returns to the
/// shell's vacant pool and the next start reuses it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoplayerId(pub u32);

impl fmt::Display for CoplayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CoplayerId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Host-side session handle for a launched coplayer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inline set of coplayer ids used when routing events to several coplayers.
pub type CoplayerSet = SmallVec<[CoplayerId; 4]>;

/// The game theme a coplayer runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ThemeInfo {
    /// Registry name of the theme.
    pub name: String,
    /// Optional paytable variant.
    pub paytable: Option<String>,
}

impl ThemeInfo {
    /// Theme with the default paytable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paytable: None,
        }
    }

    /// Select a paytable variant.
    pub fn with_paytable(mut self, paytable: impl Into<String>) -> Self {
        self.paytable = Some(paytable.into());
        self
    }
}

impl fmt::Display for ThemeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.paytable {
            Some(p) => write!(f, "{}[{p}]", self.name),
            None => f.write_str(&self.name),
        }
    }
}
