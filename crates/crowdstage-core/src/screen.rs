//! The screen session: election, reconciliation, and the tick loop.
//!
//! A `ScreenSession` is a contender until its election commits; from then
//! on it is the room's single authoritative simulator. Every call to
//! [`pump`](ScreenSession::pump) while authoritative drains the remote
//! player stream into the reconciler, applies each actor's latest input
//! snapshot, and advances the world by one fixed tick. Remote event
//! handling and the tick share that one cooperative call, so the actor
//! map is never mutated concurrently.

use std::collections::HashMap;

use tracing::debug;
use wirestore::{ChildEvents, Connection};

use crate::election::ScreenElection;
use crate::reconcile::{Actor, Reconciler};
use crate::schema::RoomPaths;
use crate::stage::{ArcadeStage, Stage};
use crate::status::StatusSink;

/// Horizontal run speed, px/s.
pub const MOVE_SPEED: f32 = 200.0;
/// Upward jump impulse, px/s (negative is up).
pub const JUMP_VELOCITY: f32 = -420.0;
/// Minimum simulation time between accepted jump impulses per actor.
pub const JUMP_DEBOUNCE_MS: u64 = 180;

/// One screen instance for a room.
pub struct ScreenSession<S: Stage> {
    conn: Connection,
    paths: RoomPaths,
    sink: StatusSink,
    election: ScreenElection,
    reconciler: Reconciler,
    stage: Option<S>,
    players: Option<ChildEvents>,
    stage_factory: Box<dyn Fn() -> S + Send>,
    closed: bool,
}

impl ScreenSession<ArcadeStage> {
    /// Starts a contender with the built-in arcade stage.
    #[must_use]
    pub fn start(conn: Connection, room: &str, sink: StatusSink, seed: u64) -> Self {
        Self::with_stage(conn, room, sink, seed, ArcadeStage::new)
    }
}

impl<S: Stage> ScreenSession<S> {
    /// Starts a contender with a custom stage implementation. The stage
    /// is not constructed until the election is won; events observed
    /// before it exists are buffered and flushed in arrival order.
    #[must_use]
    pub fn with_stage(
        conn: Connection,
        room: &str,
        sink: StatusSink,
        seed: u64,
        stage_factory: impl Fn() -> S + Send + 'static,
    ) -> Self {
        let paths = RoomPaths::new(room);
        let election = ScreenElection::new(&conn, paths.clone(), sink.clone());
        sink.info("waiting to claim the screen…");
        Self {
            conn,
            paths,
            sink,
            election,
            reconciler: Reconciler::new(seed),
            stage: None,
            players: None,
            stage_factory: Box::new(stage_factory),
            closed: false,
        }
    }

    /// This instance's election identity.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        self.election.owner_id()
    }

    /// The underlying store connection (link control lives there).
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Whether this instance currently runs the simulation.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.election.is_claimed()
    }

    /// The mirrored actor set (empty while not authoritative).
    #[must_use]
    pub fn actors(&self) -> &HashMap<String, Actor> {
        self.reconciler.actors()
    }

    /// The simulation world, once the election is won and the first pump
    /// has run.
    #[must_use]
    pub fn stage(&self) -> Option<&S> {
        self.stage.as_ref()
    }

    /// Advances the session: election triggers, remote player events,
    /// and (while authoritative) one fixed simulation tick.
    pub fn pump(&mut self) {
        if self.closed {
            return;
        }

        let was_authoritative = self.election.is_claimed();
        self.election.pump(&self.conn);
        let is_authoritative = self.election.is_claimed();

        if is_authoritative && !was_authoritative {
            // Subscribe first; anything delivered before the stage exists
            // lands in the reconciler's startup buffer.
            self.players = Some(self.conn.subscribe_children(self.paths.players()));
            debug!(owner = %self.election.owner_id(), "promoted, subscribed to players");
        } else if was_authoritative && !is_authoritative {
            self.teardown_world();
            self.sink.error("lost the screen claim");
        }

        if !is_authoritative {
            return;
        }

        if let Some(players) = &self.players {
            match self.stage.as_mut() {
                Some(stage) => {
                    for event in players.drain() {
                        self.reconciler.apply(event, stage);
                    }
                }
                None => {
                    for event in players.drain() {
                        self.reconciler.buffer(event);
                    }
                }
            }
        }

        // World becomes ready on the first authoritative pump; flush the
        // startup buffer in arrival order before ticking.
        if self.stage.is_none() {
            let mut stage = (self.stage_factory)();
            self.reconciler.flush(&mut stage);
            self.stage = Some(stage);
        }

        let Some(stage) = self.stage.as_mut() else {
            return;
        };
        let now_ms = stage.now_ms();
        for actor in self.reconciler.actors_mut().values_mut() {
            // One atomic snapshot per actor per tick; the three booleans
            // are never read at different times.
            let input = actor.input;
            let vx = match (input.left, input.right) {
                (true, false) => -MOVE_SPEED,
                (false, true) => MOVE_SPEED,
                _ => 0.0,
            };
            stage.set_velocity_x(actor.body, vx);

            if input.jump
                && stage.is_grounded(actor.body)
                && now_ms.saturating_sub(actor.last_jump_at_ms) >= JUMP_DEBOUNCE_MS
            {
                stage.set_velocity_y(actor.body, JUMP_VELOCITY);
                actor.last_jump_at_ms = now_ms;
            }
        }
        stage.step();
    }

    /// Voluntary teardown: destroys actors, releases the claim (explicit
    /// delete plus disarmed hook), and stops reacting. Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.teardown_world();
        self.election.release(&self.conn);
        self.closed = true;
        self.sink.info("screen stopped");
    }

    fn teardown_world(&mut self) {
        if let Some(stage) = self.stage.as_mut() {
            self.reconciler.clear(stage);
        }
        self.stage = None;
        self.players = None;
    }
}

impl<S: Stage> std::fmt::Debug for ScreenSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenSession")
            .field("owner_id", &self.election.owner_id())
            .field("authoritative", &self.election.is_claimed())
            .field("actors", &self.reconciler.actors().len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
