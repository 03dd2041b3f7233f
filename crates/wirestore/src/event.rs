//! Subscription event types and receiver handles.
//!
//! Every subscription hands back a receiver wrapping an unbounded
//! [`crossbeam_channel`] channel. The store pushes into the channel at
//! mutation time; subscribers drain whenever their cooperative loop next
//! runs. Dropping a receiver is the unsubscribe: the store prunes dead
//! senders on its next dispatch.

use crossbeam_channel::Receiver;
use serde_json::Value;

/// A change to one immediate child of a subscribed path.
///
/// Delivery is monotonic per key: for a given child, `Added` precedes any
/// `Changed`, which precede a `Removed`. No ordering holds across keys.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    /// A child appeared (including replay of children that already existed
    /// when the subscription was established).
    Added {
        /// Child key under the subscribed path.
        key: String,
        /// The child's full value.
        value: Value,
    },
    /// An existing child's value changed.
    Changed {
        /// Child key under the subscribed path.
        key: String,
        /// The child's full new value.
        value: Value,
    },
    /// A child was deleted.
    Removed {
        /// Child key under the subscribed path.
        key: String,
    },
}

impl ChildEvent {
    /// The child key this event concerns.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Changed { key, .. } | Self::Removed { key } => key,
        }
    }
}

/// Receiver for [`ChildEvent`]s on one subscribed path.
#[derive(Debug)]
pub struct ChildEvents {
    pub(crate) rx: Receiver<ChildEvent>,
}

impl ChildEvents {
    /// Takes the next pending event, if any. Never blocks.
    #[must_use]
    pub fn try_next(&self) -> Option<ChildEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains every pending event in delivery order.
    #[must_use]
    pub fn drain(&self) -> Vec<ChildEvent> {
        self.rx.try_iter().collect()
    }
}

/// Receiver for whole-value snapshots of one subscribed path.
///
/// `None` means the subtree is absent. The current value is delivered
/// immediately on subscribe; afterwards a snapshot arrives whenever the
/// value changes.
#[derive(Debug)]
pub struct ValueEvents {
    pub(crate) rx: Receiver<Option<Value>>,
}

impl ValueEvents {
    /// Takes the next pending snapshot, if any. Never blocks.
    #[must_use]
    pub fn try_next(&self) -> Option<Option<Value>> {
        self.rx.try_recv().ok()
    }

    /// Drains every pending snapshot in delivery order.
    #[must_use]
    pub fn drain(&self) -> Vec<Option<Value>> {
        self.rx.try_iter().collect()
    }
}

/// Receiver for the connection's local link state.
///
/// The current state is delivered immediately on subscribe; afterwards a
/// `bool` arrives on every sever/restore transition.
#[derive(Debug)]
pub struct ConnectivityEvents {
    pub(crate) rx: Receiver<bool>,
}

impl ConnectivityEvents {
    /// Takes the next pending transition, if any. Never blocks.
    #[must_use]
    pub fn try_next(&self) -> Option<bool> {
        self.rx.try_recv().ok()
    }

    /// Drains every pending transition in delivery order.
    #[must_use]
    pub fn drain(&self) -> Vec<bool> {
        self.rx.try_iter().collect()
    }
}
