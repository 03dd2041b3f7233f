//! # Crowdstage Core
//!
//! Coordination layer for a shared-screen arcade stage: one device renders
//! a simple physics stage for a room, any number of other devices drive
//! named actors on it, and everything is coordinated through a remote
//! multi-writer key-value tree ([`wirestore`]).
//!
//! The hard part is not the physics; it is staying consistent over an
//! eventually-consistent, multi-writer store:
//!
//! - **Screen election** ([`election`]): exactly one screen instance per
//!   room becomes authoritative, via an atomic claim transaction, and the
//!   claim is released by a server-side disconnect hook when that instance
//!   vanishes.
//! - **Controller sessions** ([`session`]): each controller registers a
//!   player record behind a capacity gate, keeps it alive implicitly via
//!   the disconnect hook (no heartbeats), and pushes input and name deltas.
//! - **Reconciliation** ([`reconcile`]): the elected screen folds the
//!   room's child-added/changed/removed stream into a local actor set,
//!   idempotent under replay and tolerant of changes arriving before adds.
//! - **Simulation** ([`stage`], [`screen`]): a fixed-tick world applies
//!   each actor's latest input snapshot every tick, with a simulation-clock
//!   jump debounce.
//!
//! ## Cooperative pumping
//!
//! There is no background runtime. Sessions expose `pump`, and the
//! embedder (a UI shell's frame loop, or a test) calls it; store events,
//! timers, and simulation ticks all run inside that single call. No two
//! callbacks ever interleave mid-mutation, so the actor map needs no
//! locking.
//!
//! ## Remote layout
//!
//! ```text
//! rooms/{room}/players/{sessionId} = { name, input: { left, right, jump }, joinedAt }
//! rooms/{room}/screen              = { ownerId, claimedAt } | absent
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod election;
pub mod error;
pub mod input;
pub mod name;
pub mod reconcile;
pub mod schema;
pub mod screen;
pub mod session;
pub mod stage;
pub mod status;

#[cfg(test)]
mod tests;

pub use election::ScreenElection;
pub use error::SessionError;
pub use input::InputState;
pub use name::{sanitize_name, FALLBACK_NAME, NAME_MAX_CHARS};
pub use reconcile::{Actor, Reconciler};
pub use schema::{PlayerRecord, RoomPaths, ScreenClaim, DEFAULT_ROOM};
pub use screen::{ScreenSession, JUMP_DEBOUNCE_MS, JUMP_VELOCITY, MOVE_SPEED};
pub use session::{ControllerSession, JOIN_RETRY_MS, JUMP_PULSE_MS, MAX_PLAYERS};
pub use stage::{ArcadeStage, BodyId, Stage};
pub use status::{Severity, StatusSink};
