//! Error types for the history subsystem.

use std::io;

use croupier_core::ResourceError;

/// Errors decoding or encoding persisted history values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred (truncated input surfaces here).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The value was written by an unsupported format version.
    #[error("unsupported format version {found}")]
    UnsupportedVersion {
        /// The version found in the value.
        found: u8,
    },
    /// The value holds a different kind than the caller expected.
    #[error("unexpected value kind {found} (expected {expected})")]
    UnexpectedKind {
        /// Kind the caller asked for.
        expected: u8,
        /// Kind found in the value.
        found: u8,
    },
    /// The value could not be decoded.
    #[error("malformed record: {detail}")]
    MalformedRecord {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A data value carries an unknown type tag.
    #[error("unknown value tag {tag}")]
    UnknownValueTag {
        /// The unrecognized tag.
        tag: u8,
    },
}

/// Errors raised while recording or reading history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// A persisted value could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The host resource failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// A shell record was requested before any state was presented.
    #[error("no presentation state recorded yet")]
    NoPresentationState,
    /// Paired coplayer and shell records carry different step numbers.
    #[error("history step mismatch: coplayer step {coplayer}, shell step {shell}")]
    StepMismatch {
        /// Step number of the coplayer record.
        coplayer: u32,
        /// Step number of the shell record.
        shell: u32,
    },
    /// A record the step count promises is absent from critical data.
    #[error("history record '{key}' is missing")]
    MissingRecord {
        /// Critical-data key that was read.
        key: String,
    },
}
