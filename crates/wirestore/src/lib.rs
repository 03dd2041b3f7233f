//! # Wirestore
//!
//! A multi-reader/multi-writer key-value tree with child-level change
//! notifications and per-connection disconnect hooks.
//!
//! Wirestore models the coordination substrate that `crowdstage-core` is
//! written against: a single JSON tree addressed by slash-separated paths,
//! shared by any number of client [`Connection`]s. Each connection gets:
//!
//! - read/write/patch/delete on any path
//! - an atomic read-modify-write transaction on one path ([`Connection::transact`])
//! - ordered child-event subscriptions (added / changed / removed)
//! - a local connectivity signal
//! - server-side cleanups that run when the connection's link drops
//!   ([`Connection::on_disconnect_delete`])
//!
//! ## Delivery model
//!
//! Events are delivered over unbounded [`crossbeam_channel`] channels and
//! drained by the subscriber at its own pace. Delivery is monotonic per
//! child key (an `Added` precedes any `Changed` precedes a `Removed` for
//! the same key); no ordering is guaranteed across different keys.
//!
//! Subscribing replays current state: a child subscription immediately
//! receives an `Added` for every existing child, and a value subscription
//! immediately receives the current value. A connection whose link is down
//! receives nothing; when the link is restored the store re-synchronizes
//! the subscription against the current tree, so missed updates surface as
//! a compact diff rather than being lost.
//!
//! ## Link loss
//!
//! [`Connection::sever`] simulates an abrupt network loss: every cleanup
//! registered through `on_disconnect_delete` runs server-side exactly
//! once, connectivity subscribers observe `false`, and further operations
//! fail with [`StoreError::Disconnected`] until [`Connection::restore`].
//!
//! ## Quick start
//!
//! ```
//! use wirestore::{Store, StorePath};
//! use serde_json::json;
//!
//! let store = Store::new();
//! let conn = store.connect();
//! let path = StorePath::parse("rooms/default/screen").unwrap();
//!
//! let result = conn
//!     .transact(&path, |current| match current {
//!         None => Some(json!({ "ownerId": "screen-a" })),
//!         Some(_) => None,
//!     })
//!     .unwrap();
//! assert!(result.committed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod event;
pub mod path;
pub mod store;
pub mod tree;

pub use error::StoreError;
pub use event::{ChildEvent, ChildEvents, ConnectivityEvents, ValueEvents};
pub use path::StorePath;
pub use store::{Connection, DisconnectGuard, Store, TxnResult};
pub use tree::server_timestamp;
