//! History recording, critical-data codec and replay for Croupier.
//!
//! Two recorders share one contract: accumulate service data and emit a
//! record per history step.
//!
//! - [`StagedDiffRecorder`] is the single-threaded coplayer recorder. It
//!   stages updates and emits only the delta against its base snapshot,
//!   persisting both buffers so a restart resumes mid-cycle.
//! - [`ConcurrentHistoryRecorder`] is the shell recorder. One writer
//!   thread updates it while coplayer threads read full snapshots (or
//!   diffs against a caller-supplied base) under a reader/writer lock.
//!
//! [`HistoryManager`] adds step numbering and the write-enable gate on top
//! of the staged recorder and writes paired coplayer/shell records;
//! [`HistoryReader`] walks them back for history playback.
//!
//! # Format
//!
//! Every critical-data value this crate writes is prefixed with
//! `[FORMAT_VERSION u8] [kind u8]`; see [`codec`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod concurrent;
pub mod error;
pub mod manager;
pub mod reader;
pub mod staged;

pub use concurrent::ConcurrentHistoryRecorder;
pub use error::{CodecError, HistoryError};
pub use manager::{HistoryConfig, HistoryManager};
pub use reader::{HistoryReader, HistoryStepPair};
pub use staged::StagedDiffRecorder;

/// Current binary format version of persisted history values.
///
/// History:
/// - v1: initial layout
pub const FORMAT_VERSION: u8 = 1;
