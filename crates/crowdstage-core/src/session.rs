//! Controller-side session lifecycle.
//!
//! A controller owns exactly one player record in the room. The join
//! sequence is ordered so that an abrupt disconnect at ANY point leaves
//! nothing behind:
//!
//! 1. wait for connectivity (never write while the link is down)
//! 2. capacity gate: count current players, reject at [`MAX_PLAYERS`]
//! 3. allocate a key and register the disconnect-triggered deletion
//!    BEFORE
//! 4. writing the record itself
//!
//! Liveness needs no heartbeats: the store's disconnect hook deletes the
//! record the moment the link drops. Everything after join is
//! fire-and-forget: a lost input update is corrected by the next one.

use tracing::{debug, info};
use wirestore::{Connection, ConnectivityEvents, DisconnectGuard};

use crate::error::SessionError;
use crate::input::InputState;
use crate::name::sanitize_name;
use crate::schema::{PlayerRecord, RoomPaths};
use crate::status::StatusSink;

/// Maximum committed player records per room.
pub const MAX_PLAYERS: usize = 16;

/// Fixed backoff between failed join attempts.
pub const JOIN_RETRY_MS: u64 = 3000;

/// How long a jump pulse stays high on the controller side. The screen
/// debounces independently by simulation time, so flooding pulses cannot
/// produce extra impulses.
pub const JUMP_PULSE_MS: u64 = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No record; joining when the link allows.
    AwaitingLink,
    /// Record written; input and name deltas flow.
    Joined,
    /// Capacity rejection; not retried automatically.
    Full,
    /// Voluntarily left; terminal.
    Closed,
}

/// One controller's registered presence and input state.
///
/// Pump-driven: the embedder calls [`pump`](Self::pump) with its
/// wall-clock milliseconds; joins, retries, and the jump-pulse timer all
/// run inside that call.
#[derive(Debug)]
pub struct ControllerSession {
    conn: Connection,
    paths: RoomPaths,
    sink: StatusSink,
    link_events: ConnectivityEvents,
    linked: bool,
    phase: Phase,
    name: String,
    input: InputState,
    session_key: Option<String>,
    guard: Option<DisconnectGuard>,
    retry_at: Option<u64>,
    jump_deadline: Option<u64>,
}

impl ControllerSession {
    /// Opens a session for `room`. The join itself happens on the first
    /// [`pump`](Self::pump) that sees the link up.
    #[must_use]
    pub fn start(conn: Connection, room: &str, initial_name: &str, sink: StatusSink) -> Self {
        let link_events = conn.subscribe_connectivity();
        sink.info("waiting for connection…");
        Self {
            conn,
            paths: RoomPaths::new(room),
            sink,
            link_events,
            linked: false,
            phase: Phase::AwaitingLink,
            name: sanitize_name(initial_name),
            input: InputState::NEUTRAL,
            session_key: None,
            guard: None,
            retry_at: None,
            jump_deadline: None,
        }
    }

    /// The sanitized display name currently in effect.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying store connection (link control lives there).
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The store key of the open session record, if joined.
    #[must_use]
    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    /// Whether a record is currently registered.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.phase == Phase::Joined
    }

    /// Whether the last join attempt was rejected for capacity.
    #[must_use]
    pub fn is_rejected_full(&self) -> bool {
        self.phase == Phase::Full
    }

    /// The local input vector.
    #[must_use]
    pub fn input(&self) -> InputState {
        self.input
    }

    /// Advances the session: processes connectivity transitions, due
    /// join retries, and the jump-pulse timer. Never blocks.
    pub fn pump(&mut self, now_ms: u64) {
        if self.phase == Phase::Closed {
            return;
        }

        for linked in self.link_events.drain() {
            self.linked = linked;
            if linked {
                if self.phase == Phase::AwaitingLink {
                    self.sink.info("connected, joining…");
                    self.retry_at = None;
                }
            } else {
                self.sink.error("connection lost, reconnecting…");
                if self.phase == Phase::Joined {
                    // The disconnect hook has already deleted the record
                    // server-side; rejoin once the link returns.
                    self.phase = Phase::AwaitingLink;
                    self.session_key = None;
                    self.guard = None;
                    self.retry_at = None;
                }
            }
        }

        if self.phase == Phase::AwaitingLink
            && self.linked
            && self.retry_at.map_or(true, |at| now_ms >= at)
        {
            match self.attempt_join() {
                Ok(()) => {
                    self.phase = Phase::Joined;
                    self.retry_at = None;
                    self.sink.info(&format!("playing as {}", self.name));
                }
                Err(SessionError::CapacityExceeded { max }) => {
                    self.phase = Phase::Full;
                    self.sink
                        .error(&format!("room is full ({max} players); try again later"));
                }
                Err(err) => {
                    self.retry_at = Some(now_ms + JOIN_RETRY_MS);
                    debug!(%err, "join attempt failed, backing off");
                    self.sink.error("join failed; retrying…");
                }
            }
        }

        if self.jump_deadline.is_some_and(|at| now_ms >= at) {
            self.jump_deadline = None;
            if self.input.jump {
                self.input.jump = false;
                self.sync_input();
            }
        }
    }

    /// One pass of the ordered join sequence. Everything but the explicit
    /// capacity rejection is retried by the caller after a fixed backoff.
    fn attempt_join(&mut self) -> Result<(), SessionError> {
        let count = self.conn.child_count(self.paths.players())?;
        if count >= MAX_PLAYERS {
            return Err(SessionError::CapacityExceeded { max: MAX_PLAYERS });
        }

        let key = self.conn.push(self.paths.players())?;
        let record_path = self.paths.player(&key);
        // Hook first: a disconnect between allocation and write must still
        // clean up.
        let guard = self.conn.on_disconnect_delete(&record_path)?;

        if let Err(err) = self
            .conn
            .write(&record_path, PlayerRecord::encode_new(&self.name, self.input))
        {
            guard.cancel();
            return Err(err.into());
        }

        info!(session = %key, name = %self.name, "joined room");
        self.session_key = Some(key);
        self.guard = Some(guard);
        Ok(())
    }

    /// Updates the left button. Fire-and-forget.
    pub fn set_left(&mut self, pressed: bool) {
        if self.input.left != pressed {
            self.input.left = pressed;
            self.sync_input();
        }
    }

    /// Updates the right button. Fire-and-forget.
    pub fn set_right(&mut self, pressed: bool) {
        if self.input.right != pressed {
            self.input.right = pressed;
            self.sync_input();
        }
    }

    /// Raises the jump flag for [`JUMP_PULSE_MS`]; calling again before
    /// expiry re-arms the window so each press still produces a fresh
    /// edge for the screen's debounce to see.
    pub fn pulse_jump(&mut self, now_ms: u64) {
        if !self.input.jump {
            self.input.jump = true;
            self.sync_input();
        }
        self.jump_deadline = Some(now_ms + JUMP_PULSE_MS);
    }

    /// Sanitizes and applies a new display name; returns the sanitized
    /// form for local echo. Idempotent under repeated identical input.
    pub fn rename(&mut self, raw: &str) -> String {
        let sanitized = sanitize_name(raw);
        if sanitized != self.name {
            self.name.clone_from(&sanitized);
            if let Some(key) = &self.session_key {
                let _ = self
                    .conn
                    .patch(&self.paths.player(key), PlayerRecord::name_patch(&sanitized));
            }
            self.sink.info(&format!("playing as {sanitized}"));
        }
        sanitized
    }

    /// Voluntary teardown: best-effort zero of the remote input vector,
    /// disarm the disconnect hook, delete the record. Safe to call when
    /// no session was ever opened, and safe to call twice.
    pub fn leave(&mut self) {
        if self.phase == Phase::Closed {
            return;
        }
        if let Some(key) = self.session_key.take() {
            let path = self.paths.player(&key);
            let _ = self
                .conn
                .patch(&path, PlayerRecord::input_patch(InputState::NEUTRAL));
            if let Some(guard) = self.guard.take() {
                guard.cancel();
            }
            let _ = self.conn.delete(&path);
            info!(session = %key, "left room");
        }
        self.phase = Phase::Closed;
        self.sink.info("left the room");
    }

    /// Pushes the full input vector if a session is open; a no-op
    /// otherwise. Errors are swallowed; the next update supersedes.
    fn sync_input(&mut self) {
        if self.phase != Phase::Joined {
            return;
        }
        if let Some(key) = &self.session_key {
            let _ = self
                .conn
                .patch(&self.paths.player(key), PlayerRecord::input_patch(self.input));
        }
    }
}
