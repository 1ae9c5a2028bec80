//! Errors reported by the host transactional resource.

/// Failure reaching the host's transaction or critical-data primitives.
///
/// A transaction that merely fails to open is not an error; it is
/// reported as `Ok(false)` by the open calls.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// Critical data was written or removed outside a transaction.
    #[error("critical data access requires an open transaction")]
    NoTransaction,
    /// A transaction was requested while another one is open.
    #[error("transaction '{requested}' requested while '{open}' is open")]
    TransactionAlreadyOpen {
        /// Transaction that was requested.
        requested: String,
        /// Transaction currently open.
        open: String,
    },
    /// The host reported a failure.
    #[error("host error: {reason}")]
    Host {
        /// Host-supplied description.
        reason: String,
    },
}
