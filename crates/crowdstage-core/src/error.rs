//! Session error taxonomy.

use thiserror::Error;
use wirestore::StoreError;

/// Failures a session can hit against the store.
///
/// Nothing here is fatal to the process. A capacity rejection stops that
/// join attempt and is surfaced to the user; a downed link defers work
/// until connectivity returns; a transport failure retries (joins) or is
/// dropped silently (input and name updates, where the next successful
/// write supersedes the lost one). Claim contention is deliberately NOT
/// in this taxonomy: a non-authoritative screen is a normal steady
/// state, reported as status text only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The room already holds the maximum number of players; nothing was
    /// written. Not retried automatically.
    #[error("room is full ({max} players)")]
    CapacityExceeded {
        /// The capacity that was hit.
        max: usize,
    },

    /// The link is down; the operation was not attempted.
    #[error("not connected")]
    Disconnected,

    /// A store operation failed in transit.
    #[error("store operation failed: {0}")]
    Transport(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Disconnected => Self::Disconnected,
            other => Self::Transport(other),
        }
    }
}
