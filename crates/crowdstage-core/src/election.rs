//! Screen-ownership election.
//!
//! Each screen instance generates a throwaway identity and races for the
//! room's claim singleton with a single atomic read-modify-write. The
//! store's transaction is the whole tie-break: first committer wins, no
//! client-side timestamps or priorities.
//!
//! Losers stay passive and re-attempt only on triggering events (the
//! singleton becoming absent, or local connectivity returning), never on
//! a timer. The winner immediately arms a disconnect-triggered deletion
//! of the singleton, so a crash releases the room without anyone having
//! to detect staleness by timeout.

use rand::Rng;
use tracing::{info, warn};
use wirestore::{Connection, ConnectivityEvents, DisconnectGuard, ValueEvents};

use crate::schema::{RoomPaths, ScreenClaim};
use crate::status::StatusSink;

/// Generates a per-instance owner identity. Not persisted: a reloaded
/// screen is a new contender.
fn generate_owner_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..7)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("screen-{suffix}")
}

/// Decides whether this instance is authoritative for a room.
#[derive(Debug)]
pub struct ScreenElection {
    paths: RoomPaths,
    sink: StatusSink,
    owner_id: String,
    claim_events: ValueEvents,
    link_events: ConnectivityEvents,
    claimed: bool,
    guard: Option<DisconnectGuard>,
}

impl ScreenElection {
    /// Creates a contender and subscribes to the claim singleton and the
    /// connection's link state. No claim is attempted yet; the initial
    /// snapshot delivered by the subscription drives the first attempt
    /// from [`pump`](Self::pump).
    #[must_use]
    pub fn new(conn: &Connection, paths: RoomPaths, sink: StatusSink) -> Self {
        let claim_events = conn.subscribe_value(paths.screen());
        let link_events = conn.subscribe_connectivity();
        Self {
            paths,
            sink,
            owner_id: generate_owner_id(),
            claim_events,
            link_events,
            claimed: false,
            guard: None,
        }
    }

    /// This instance's locally generated identity.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Whether this instance currently believes it holds the claim.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Processes pending claim snapshots and connectivity transitions,
    /// re-attempting the claim on triggering events. The caller compares
    /// [`is_claimed`](Self::is_claimed) before and after to detect
    /// promotion or demotion.
    pub fn pump(&mut self, conn: &Connection) {
        for linked in self.link_events.drain() {
            if linked {
                if !self.claimed {
                    self.attempt_claim(conn);
                }
            } else {
                // Stay passive: do not assume the claim was cleared. The
                // singleton's own value tells us what happened once the
                // link returns.
                self.sink.error("connection lost, reconnecting…");
            }
        }

        for snapshot in self.claim_events.drain() {
            match snapshot.as_ref().and_then(ScreenClaim::decode) {
                None => {
                    if self.claimed {
                        // Our claim vanished underneath us (a link blip
                        // fired the hook). Disarm the stale guard and race
                        // again through the idempotent-owner branch.
                        warn!(owner = %self.owner_id, "screen claim vanished, re-claiming");
                        self.drop_claim();
                    }
                    self.attempt_claim(conn);
                }
                Some(claim) if claim.owner_id == self.owner_id => {
                    // Observation of our own committed claim; nothing to do.
                }
                Some(claim) => {
                    if self.claimed {
                        info!(winner = %claim.owner_id, "another screen took the room, demoting");
                        self.drop_claim();
                    }
                    self.sink.error("another screen is active; waiting…");
                }
            }
        }
    }

    /// One atomic claim attempt. Commits when the singleton is absent or
    /// already owned by this identity; aborts otherwise. Transaction
    /// failures are status, not fatal; the next triggering event
    /// retries.
    pub fn attempt_claim(&mut self, conn: &Connection) {
        if self.claimed {
            return;
        }
        let owner_id = self.owner_id.clone();
        let result = conn.transact(self.paths.screen(), |current| {
            let ours = current
                .and_then(ScreenClaim::decode)
                .is_some_and(|claim| claim.owner_id == owner_id);
            if current.is_none() || ours {
                Some(ScreenClaim::encode_new(&owner_id))
            } else {
                None
            }
        });
        match result {
            Ok(txn) if txn.committed => match conn.on_disconnect_delete(self.paths.screen()) {
                Ok(guard) => {
                    self.claimed = true;
                    self.guard = Some(guard);
                    info!(owner = %self.owner_id, "screen claim won");
                    self.sink.info("screen active; waiting for players…");
                }
                Err(err) => {
                    // Claimed but could not arm the release hook; holding
                    // the room in that state risks wedging it. Back out.
                    warn!(%err, "claim committed but hook registration failed, backing out");
                    let _ = conn.delete(self.paths.screen());
                    self.sink.error("claim failed; retrying on next opening…");
                }
            },
            Ok(_) => {
                self.sink.error("another screen is active; waiting…");
            }
            Err(err) => {
                warn!(%err, "claim transaction failed");
                self.sink.error("claim failed; retrying on next opening…");
            }
        }
    }

    /// Voluntary release: disarm the (now moot) disconnect hook and
    /// explicitly delete the singleton so waiting contenders react to the
    /// absence event. No-op when not claimed.
    pub fn release(&mut self, conn: &Connection) {
        if !self.claimed {
            return;
        }
        self.drop_claim();
        let _ = conn.delete(self.paths.screen());
        info!(owner = %self.owner_id, "screen claim released");
    }

    /// Clears local claim state and cancels the guard without touching
    /// the remote singleton.
    fn drop_claim(&mut self) {
        self.claimed = false;
        if let Some(guard) = self.guard.take() {
            // A stale hook firing later could delete a successor's claim.
            guard.cancel();
        }
    }
}
