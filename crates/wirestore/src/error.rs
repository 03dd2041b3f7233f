//! Error types for store operations.

use thiserror::Error;

/// Errors returned by [`Connection`](crate::Connection) operations.
///
/// The set is deliberately small: a reference store has no transport of
/// its own, so the only failure modes are a downed link and a malformed
/// path. Consumers treat both as transient transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The connection's link is down; the operation was not attempted.
    #[error("connection link is down")]
    Disconnected,

    /// The path string could not be parsed into segments.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}
