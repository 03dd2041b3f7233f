//! The store, its client connections, and disconnect hooks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{unbounded, Sender};
use rand::Rng;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::StoreError;
use crate::event::{ChildEvent, ChildEvents, ConnectivityEvents, ValueEvents};
use crate::path::StorePath;
use crate::tree::{resolve_timestamps, Tree};

/// Outcome of a [`Connection::transact`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TxnResult {
    /// Whether the update closure's value was committed.
    pub committed: bool,
    /// The value at the path after the transaction (committed or not).
    pub value: Option<Value>,
}

/// A shared in-process store.
///
/// `Store` is cheap to clone; clones share the same tree. Clients obtain
/// a [`Connection`] per logical device and perform all reads and writes
/// through it.
///
/// The store carries a logical millisecond clock used to resolve
/// [`server_timestamp`](crate::server_timestamp) sentinels and to order
/// pushed keys. Tests advance it explicitly with [`Store::advance`].
#[derive(Debug, Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<Inner>>,
}

impl Store {
    /// Creates an empty store with the clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new connection with its link up.
    #[must_use]
    pub fn connect(&self) -> Connection {
        let id = {
            let mut inner = lock(&self.inner);
            inner.next_conn += 1;
            let id = inner.next_conn;
            inner.conns.insert(id, ConnState::default());
            id
        };
        debug!(conn = id, "connection opened");
        Connection {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Advances the logical clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        lock(&self.inner).clock_ms += ms;
    }

    /// Current logical clock reading in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        lock(&self.inner).clock_ms
    }
}

/// One client's handle onto the store.
///
/// Dropping a connection severs it, which fires any still-armed
/// disconnect cleanups, the same path an abrupt network loss takes.
#[derive(Debug)]
pub struct Connection {
    inner: Arc<Mutex<Inner>>,
    id: u64,
}

impl Connection {
    /// Reads the value at `path`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn read(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        let inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        Ok(inner.tree.get(path).cloned())
    }

    /// Counts the immediate children at `path`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn child_count(&self, path: &StorePath) -> Result<usize, StoreError> {
        let inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        Ok(inner.tree.child_count(path))
    }

    /// Writes `value` at `path`, replacing any existing subtree.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn write(&self, path: &StorePath, mut value: Value) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        resolve_timestamps(&mut value, inner.clock_ms);
        inner.tree.set(path, Some(value));
        inner.broadcast();
        Ok(())
    }

    /// Shallow-merges `fields` into the object at `path`. A `null` field
    /// deletes that key.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn patch(&self, path: &StorePath, fields: Map<String, Value>) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        let mut resolved = Value::Object(fields);
        resolve_timestamps(&mut resolved, inner.clock_ms);
        if let Value::Object(fields) = resolved {
            inner.tree.patch(path, fields);
        }
        inner.broadcast();
        Ok(())
    }

    /// Deletes the subtree at `path`. Deleting an absent path is a no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        inner.tree.set(path, None);
        inner.broadcast();
        Ok(())
    }

    /// Allocates a store-unique, allocation-ordered child key under
    /// `path`. Keys are never reused; nothing is written.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn push(&self, _path: &StorePath) -> Result<String, StoreError> {
        let mut inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        inner.push_seq += 1;
        let entropy: u16 = rand::thread_rng().gen();
        Ok(format!("k{:08x}{entropy:04x}", inner.push_seq))
    }

    /// Atomic read-modify-write on one path.
    ///
    /// `update` sees the current value (`None` when absent) and returns
    /// either the value to commit or `None` to abort without mutation.
    /// The read, decision, and write happen under one lock, giving the
    /// linearizable single-key semantics leader election relies on.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn transact(
        &self,
        path: &StorePath,
        update: impl FnOnce(Option<&Value>) -> Option<Value>,
    ) -> Result<TxnResult, StoreError> {
        let mut inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        let current = inner.tree.get(path).cloned();
        match update(current.as_ref()) {
            Some(mut value) => {
                resolve_timestamps(&mut value, inner.clock_ms);
                inner.tree.set(path, Some(value));
                let value = inner.tree.get(path).cloned();
                inner.broadcast();
                Ok(TxnResult {
                    committed: true,
                    value,
                })
            }
            None => Ok(TxnResult {
                committed: false,
                value: current,
            }),
        }
    }

    /// Subscribes to child-level changes at `path`.
    ///
    /// An `Added` for every existing child is delivered immediately. While
    /// the link is down nothing is delivered; on restore the subscription
    /// is re-synchronized against the current tree.
    #[must_use]
    pub fn subscribe_children(&self, path: &StorePath) -> ChildEvents {
        let (tx, rx) = unbounded();
        let mut inner = lock(&self.inner);
        let mut sub = ChildSub {
            path: path.clone(),
            seen: BTreeMap::new(),
            tx,
        };
        let linked = inner.is_linked(self.id);
        if linked {
            sync_child_sub(&inner.tree, &mut sub);
        }
        if let Some(conn) = inner.conns.get_mut(&self.id) {
            conn.child_subs.push(sub);
        }
        ChildEvents { rx }
    }

    /// Subscribes to whole-value snapshots of `path`.
    ///
    /// The current value is delivered immediately when the link is up.
    #[must_use]
    pub fn subscribe_value(&self, path: &StorePath) -> ValueEvents {
        let (tx, rx) = unbounded();
        let mut inner = lock(&self.inner);
        let mut sub = ValueSub {
            path: path.clone(),
            last: None,
            primed: false,
            tx,
        };
        let linked = inner.is_linked(self.id);
        if linked {
            sync_value_sub(&inner.tree, &mut sub);
        }
        if let Some(conn) = inner.conns.get_mut(&self.id) {
            conn.value_subs.push(sub);
        }
        ValueEvents { rx }
    }

    /// Subscribes to this connection's link state. The current state is
    /// delivered immediately.
    #[must_use]
    pub fn subscribe_connectivity(&self) -> ConnectivityEvents {
        let (tx, rx) = unbounded();
        let mut inner = lock(&self.inner);
        let linked = inner.is_linked(self.id);
        let _ = tx.send(linked);
        if let Some(conn) = inner.conns.get_mut(&self.id) {
            conn.link_subs.push(tx);
        }
        ConnectivityEvents { rx }
    }

    /// Registers a server-side deletion of `path` to run when this
    /// connection's link drops.
    ///
    /// The hook lives in the store, not the client: it fires even if the
    /// client never gets another word in. It fires at most once and must
    /// be [cancelled](DisconnectGuard::cancel) when the owner releases the
    /// resource through its voluntary path.
    ///
    /// # Errors
    ///
    /// [`StoreError::Disconnected`] when the link is down.
    pub fn on_disconnect_delete(&self, path: &StorePath) -> Result<DisconnectGuard, StoreError> {
        let mut inner = lock(&self.inner);
        inner.require_linked(self.id)?;
        inner.next_guard += 1;
        let guard_id = inner.next_guard;
        if let Some(conn) = inner.conns.get_mut(&self.id) {
            conn.hooks.insert(guard_id, path.clone());
        }
        Ok(DisconnectGuard {
            inner: Arc::clone(&self.inner),
            conn: self.id,
            id: guard_id,
        })
    }

    /// Drops the link: runs armed disconnect hooks server-side, notifies
    /// connectivity subscribers, and fails subsequent operations until
    /// [`restore`](Self::restore). Severing a downed link is a no-op.
    pub fn sever(&self) {
        let mut inner = lock(&self.inner);
        inner.sever(self.id);
    }

    /// Re-establishes the link, notifies connectivity subscribers, and
    /// re-synchronizes this connection's subscriptions against the
    /// current tree. Restoring an up link is a no-op.
    pub fn restore(&self) {
        let mut inner = lock(&self.inner);
        inner.restore(self.id);
    }

    /// Whether the link is currently up.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        lock(&self.inner).is_linked(self.id)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        inner.sever(self.id);
        inner.conns.remove(&self.id);
    }
}

/// Handle for one armed disconnect cleanup.
///
/// Dropping the guard does NOT disarm the hook: the registration
/// outlives the handle, exactly like a server-side `onDisconnect`.
/// Call [`cancel`](Self::cancel) on voluntary teardown.
#[derive(Debug)]
pub struct DisconnectGuard {
    inner: Arc<Mutex<Inner>>,
    conn: u64,
    id: u64,
}

impl DisconnectGuard {
    /// Disarms the cleanup. Idempotent; cancelling a hook that already
    /// fired is a no-op.
    pub fn cancel(&self) {
        let mut inner = lock(&self.inner);
        if let Some(conn) = inner.conns.get_mut(&self.conn) {
            conn.hooks.remove(&self.id);
        }
    }
}

// =============================================================================
// Internals
// =============================================================================

#[derive(Debug, Default)]
struct Inner {
    tree: Tree,
    clock_ms: u64,
    push_seq: u64,
    next_conn: u64,
    next_guard: u64,
    conns: BTreeMap<u64, ConnState>,
}

#[derive(Debug)]
struct ConnState {
    linked: bool,
    child_subs: Vec<ChildSub>,
    value_subs: Vec<ValueSub>,
    link_subs: Vec<Sender<bool>>,
    hooks: BTreeMap<u64, StorePath>,
}

impl Default for ConnState {
    fn default() -> Self {
        Self {
            linked: true,
            child_subs: Vec::new(),
            value_subs: Vec::new(),
            link_subs: Vec::new(),
            hooks: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct ChildSub {
    path: StorePath,
    /// Last state delivered to this subscriber, per child key. The diff
    /// between `seen` and the tree is what gets emitted, which is also
    /// what makes restore-after-sever catch-up work.
    seen: BTreeMap<String, Value>,
    tx: Sender<ChildEvent>,
}

#[derive(Debug)]
struct ValueSub {
    path: StorePath,
    last: Option<Value>,
    /// Whether the initial snapshot has been delivered.
    primed: bool,
    tx: Sender<Option<Value>>,
}

impl Inner {
    fn is_linked(&self, conn: u64) -> bool {
        self.conns.get(&conn).is_some_and(|c| c.linked)
    }

    fn require_linked(&self, conn: u64) -> Result<(), StoreError> {
        if self.is_linked(conn) {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }

    /// Pushes the current tree state out to every linked subscriber.
    fn broadcast(&mut self) {
        let Self { tree, conns, .. } = self;
        for conn in conns.values_mut() {
            if !conn.linked {
                continue;
            }
            sync_conn(tree, conn);
        }
    }

    fn sever(&mut self, conn_id: u64) {
        let hooks: Vec<StorePath> = {
            let Some(conn) = self.conns.get_mut(&conn_id) else {
                return;
            };
            if !conn.linked {
                return;
            }
            conn.linked = false;
            for tx in &conn.link_subs {
                let _ = tx.send(false);
            }
            let paths: Vec<StorePath> = conn.hooks.values().cloned().collect();
            conn.hooks.clear();
            paths
        };
        if !hooks.is_empty() {
            debug!(conn = conn_id, hooks = hooks.len(), "link down, running disconnect hooks");
        }
        for path in hooks {
            self.tree.set(&path, None);
        }
        self.broadcast();
    }

    fn restore(&mut self, conn_id: u64) {
        let Self { tree, conns, .. } = self;
        let Some(conn) = conns.get_mut(&conn_id) else {
            return;
        };
        if conn.linked {
            return;
        }
        conn.linked = true;
        debug!(conn = conn_id, "link restored");
        for tx in &conn.link_subs {
            let _ = tx.send(true);
        }
        sync_conn(tree, conn);
    }
}

fn sync_conn(tree: &Tree, conn: &mut ConnState) {
    conn.child_subs.retain_mut(|sub| sync_child_sub(tree, sub));
    conn.value_subs.retain_mut(|sub| sync_value_sub(tree, sub));
}

/// Diffs the subscriber's delivered state against the tree and emits the
/// difference. Returns `false` when the receiver is gone.
fn sync_child_sub(tree: &Tree, sub: &mut ChildSub) -> bool {
    let current: BTreeMap<String, Value> = tree.children(&sub.path).into_iter().collect();
    let mut alive = true;
    let removed: Vec<String> = sub
        .seen
        .keys()
        .filter(|key| !current.contains_key(*key))
        .cloned()
        .collect();
    for key in removed {
        sub.seen.remove(&key);
        alive &= sub.tx.send(ChildEvent::Removed { key }).is_ok();
    }
    for (key, value) in current {
        match sub.seen.get(&key) {
            None => {
                sub.seen.insert(key.clone(), value.clone());
                alive &= sub.tx.send(ChildEvent::Added { key, value }).is_ok();
            }
            Some(old) if *old != value => {
                sub.seen.insert(key.clone(), value.clone());
                alive &= sub.tx.send(ChildEvent::Changed { key, value }).is_ok();
            }
            Some(_) => {}
        }
    }
    alive
}

fn sync_value_sub(tree: &Tree, sub: &mut ValueSub) -> bool {
    let current = tree.get(&sub.path).cloned();
    if sub.primed && current == sub.last {
        return true;
    }
    sub.primed = true;
    sub.last = current.clone();
    sub.tx.send(current).is_ok()
}

/// Locks the store, recovering from a poisoned mutex. A panic in one
/// client must not take the shared store down with it.
fn lock(inner: &Arc<Mutex<Inner>>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::server_timestamp;
    use serde_json::json;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    fn trace_init() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn write_read_round_trip() {
        let store = Store::new();
        let conn = store.connect();
        conn.write(&path("rooms/a/players/p1"), json!({ "name": "N" }))
            .unwrap();
        assert_eq!(
            conn.read(&path("rooms/a/players/p1")).unwrap(),
            Some(json!({ "name": "N" }))
        );
        assert_eq!(conn.child_count(&path("rooms/a/players")).unwrap(), 1);
    }

    #[test]
    fn server_timestamp_resolves_to_store_clock() {
        let store = Store::new();
        store.advance(5000);
        let conn = store.connect();
        conn.write(
            &path("rooms/a/players/p1"),
            json!({ "joinedAt": server_timestamp() }),
        )
        .unwrap();
        let value = conn.read(&path("rooms/a/players/p1")).unwrap().unwrap();
        assert_eq!(value["joinedAt"], json!(5000));
    }

    #[test]
    fn push_keys_are_unique_and_ordered() {
        let store = Store::new();
        let conn = store.connect();
        let players = path("rooms/a/players");
        let a = conn.push(&players).unwrap();
        let b = conn.push(&players).unwrap();
        assert_ne!(a, b);
        assert!(a < b, "push keys must sort by allocation order");
    }

    #[test]
    fn transaction_commits_on_absent_value() {
        let store = Store::new();
        let conn = store.connect();
        let screen = path("rooms/a/screen");
        let result = conn
            .transact(&screen, |current| {
                assert!(current.is_none());
                Some(json!({ "ownerId": "s1" }))
            })
            .unwrap();
        assert!(result.committed);
        assert_eq!(conn.read(&screen).unwrap(), Some(json!({ "ownerId": "s1" })));
    }

    #[test]
    fn transaction_abort_leaves_value_untouched() {
        let store = Store::new();
        let a = store.connect();
        let b = store.connect();
        let screen = path("rooms/a/screen");
        a.write(&screen, json!({ "ownerId": "s1" })).unwrap();
        let result = b.transact(&screen, |_| None).unwrap();
        assert!(!result.committed);
        assert_eq!(result.value, Some(json!({ "ownerId": "s1" })));
        assert_eq!(b.read(&screen).unwrap(), Some(json!({ "ownerId": "s1" })));
    }

    #[test]
    fn child_subscription_replays_existing_children() {
        let store = Store::new();
        let writer = store.connect();
        let players = path("rooms/a/players");
        writer
            .write(&players.join("p1"), json!({ "name": "A" }))
            .unwrap();

        let watcher = store.connect();
        let events = watcher.subscribe_children(&players);
        let replay = events.drain();
        assert_eq!(replay.len(), 1);
        assert!(matches!(&replay[0], ChildEvent::Added { key, .. } if key == "p1"));
    }

    #[test]
    fn child_events_are_monotonic_per_key() {
        let store = Store::new();
        let writer = store.connect();
        let watcher = store.connect();
        let players = path("rooms/a/players");
        let events = watcher.subscribe_children(&players);

        writer
            .write(&players.join("p1"), json!({ "name": "A" }))
            .unwrap();
        writer
            .write(&players.join("p1"), json!({ "name": "B" }))
            .unwrap();
        writer.delete(&players.join("p1")).unwrap();

        let got = events.drain();
        assert_eq!(got.len(), 3);
        assert!(matches!(got[0], ChildEvent::Added { .. }));
        assert!(matches!(got[1], ChildEvent::Changed { .. }));
        assert!(matches!(got[2], ChildEvent::Removed { .. }));
    }

    #[test]
    fn value_subscription_delivers_current_then_changes() {
        let store = Store::new();
        let writer = store.connect();
        let watcher = store.connect();
        let screen = path("rooms/a/screen");
        let events = watcher.subscribe_value(&screen);
        assert_eq!(events.drain(), vec![None]);

        writer.write(&screen, json!({ "ownerId": "s1" })).unwrap();
        writer.delete(&screen).unwrap();
        assert_eq!(
            events.drain(),
            vec![Some(json!({ "ownerId": "s1" })), None]
        );
    }

    #[test]
    fn sever_runs_disconnect_hooks_and_blocks_operations() {
        trace_init();
        let store = Store::new();
        let conn = store.connect();
        let record = path("rooms/a/players/p1");
        let _guard = conn.on_disconnect_delete(&record).unwrap();
        conn.write(&record, json!({ "name": "A" })).unwrap();

        conn.sever();
        assert_eq!(conn.read(&record), Err(StoreError::Disconnected));

        let other = store.connect();
        assert_eq!(other.read(&record).unwrap(), None);
    }

    #[test]
    fn cancelled_hook_does_not_fire() {
        let store = Store::new();
        let conn = store.connect();
        let record = path("rooms/a/players/p1");
        let guard = conn.on_disconnect_delete(&record).unwrap();
        conn.write(&record, json!({ "name": "A" })).unwrap();
        guard.cancel();
        conn.sever();

        let other = store.connect();
        assert_eq!(other.read(&record).unwrap(), Some(json!({ "name": "A" })));
    }

    #[test]
    fn hooks_fire_once_and_not_again_after_restore() {
        let store = Store::new();
        let conn = store.connect();
        let record = path("rooms/a/players/p1");
        let _guard = conn.on_disconnect_delete(&record).unwrap();
        conn.write(&record, json!({ "name": "A" })).unwrap();
        conn.sever();
        conn.restore();

        // Rewrite after restore; the consumed hook must not delete it on a
        // second sever.
        conn.write(&record, json!({ "name": "B" })).unwrap();
        conn.sever();
        let other = store.connect();
        assert_eq!(other.read(&record).unwrap(), Some(json!({ "name": "B" })));
    }

    #[test]
    fn restore_resyncs_missed_changes() {
        trace_init();
        let store = Store::new();
        let writer = store.connect();
        let watcher = store.connect();
        let players = path("rooms/a/players");
        let events = watcher.subscribe_children(&players);

        writer
            .write(&players.join("p1"), json!({ "name": "A" }))
            .unwrap();
        let _ = events.drain();

        watcher.sever();
        writer
            .write(&players.join("p1"), json!({ "name": "B" }))
            .unwrap();
        writer
            .write(&players.join("p2"), json!({ "name": "C" }))
            .unwrap();
        assert!(events.drain().is_empty(), "no delivery while down");

        watcher.restore();
        let got = events.drain();
        assert_eq!(got.len(), 2);
        assert!(got
            .iter()
            .any(|e| matches!(e, ChildEvent::Changed { key, .. } if key == "p1")));
        assert!(got
            .iter()
            .any(|e| matches!(e, ChildEvent::Added { key, .. } if key == "p2")));
    }

    #[test]
    fn connectivity_subscription_tracks_link_state() {
        let store = Store::new();
        let conn = store.connect();
        let link = conn.subscribe_connectivity();
        assert_eq!(link.drain(), vec![true]);
        conn.sever();
        conn.sever(); // idempotent
        conn.restore();
        assert_eq!(link.drain(), vec![false, true]);
    }

    #[test]
    fn dropping_a_connection_severs_it() {
        let store = Store::new();
        let record = path("rooms/a/players/p1");
        {
            let conn = store.connect();
            let _guard = conn.on_disconnect_delete(&record).unwrap();
            conn.write(&record, json!({ "name": "A" })).unwrap();
        }
        let other = store.connect();
        assert_eq!(other.read(&record).unwrap(), None);
    }
}
