//! Reconciles the remote player stream into a local actor set.
//!
//! The elected screen subscribes to the room's players collection and
//! feeds every [`ChildEvent`] through a [`Reconciler`], which owns the
//! authoritative-for-this-screen mapping from session id to [`Actor`].
//! The mapping is derived state: any screen instance can rebuild it from
//! scratch by re-subscribing, so nothing in here is shared across
//! instances.
//!
//! Tolerance rules (the store is at-least-once and only per-key ordered):
//!
//! - an `Added` for a known key is applied as a change (duplicate/replay)
//! - a `Changed` for an unknown key is applied as an add (subscriptions
//!   established over existing data, or transient reordering)
//! - a `Removed` for an unknown key is a no-op
//!
//! Events that arrive before the simulation world exists are buffered in
//! arrival order and flushed, in that order, once the stage is attached.

use std::collections::HashMap;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;
use wirestore::ChildEvent;

use crate::input::InputState;
use crate::schema::PlayerRecord;
use crate::stage::{BodyId, Stage};

/// Horizontal spawn band: `SPAWN_X_MIN ..= SPAWN_X_MIN + SPAWN_X_RANGE`.
const SPAWN_X_MIN: f32 = 120.0;
const SPAWN_X_RANGE: f32 = 720.0;
/// Spawn height, well above the ground slab.
const SPAWN_Y: f32 = 80.0;

/// The screen's local mirror of one player session.
#[derive(Debug)]
pub struct Actor {
    /// Sanitized display name currently rendered.
    pub name: String,
    /// Latest full input snapshot.
    pub input: InputState,
    /// Handle of the simulated body.
    pub body: BodyId,
    /// Simulation time of the last accepted jump impulse.
    pub last_jump_at_ms: u64,
}

/// Folds child events into the actor map.
#[derive(Debug)]
pub struct Reconciler {
    actors: HashMap<String, Actor>,
    pending: Vec<ChildEvent>,
    rng: ChaCha8Rng,
}

impl Reconciler {
    /// Creates an empty reconciler. `seed` drives spawn placement only.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            actors: HashMap::new(),
            pending: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The live actors, keyed by session id.
    #[must_use]
    pub fn actors(&self) -> &HashMap<String, Actor> {
        &self.actors
    }

    /// Mutable access for the per-tick control pass.
    pub fn actors_mut(&mut self) -> &mut HashMap<String, Actor> {
        &mut self.actors
    }

    /// Buffers an event that arrived before the stage existed.
    pub fn buffer(&mut self, event: ChildEvent) {
        self.pending.push(event);
    }

    /// Number of buffered pre-stage events.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Flushes buffered events, in arrival order, into `stage`.
    pub fn flush(&mut self, stage: &mut dyn Stage) {
        let pending = std::mem::take(&mut self.pending);
        for event in pending {
            self.apply(event, stage);
        }
    }

    /// Applies one event against `stage`.
    pub fn apply(&mut self, event: ChildEvent, stage: &mut dyn Stage) {
        match event {
            ChildEvent::Added { key, value } | ChildEvent::Changed { key, value } => {
                self.upsert(&key, &PlayerRecord::decode(&value), stage);
            }
            ChildEvent::Removed { key } => self.remove(&key, stage),
        }
    }

    /// Applies the latest record for `key`, creating the actor on first
    /// sight.
    fn upsert(&mut self, key: &str, record: &PlayerRecord, stage: &mut dyn Stage) {
        if let Some(actor) = self.actors.get_mut(key) {
            if actor.name != record.name {
                actor.name.clone_from(&record.name);
                // Resize only on an actual rename; input-only updates must
                // not churn the hit body.
                stage.relabel(actor.body, &actor.name);
            }
            actor.input = record.input;
            return;
        }

        let body = stage.create_actor(&record.name);
        let spawn_x = SPAWN_X_MIN + self.rng.gen::<f32>() * SPAWN_X_RANGE;
        stage.set_position(body, Vec2::new(spawn_x, SPAWN_Y));
        debug!(session = key, name = %record.name, "actor created");
        self.actors.insert(
            key.to_string(),
            Actor {
                name: record.name.clone(),
                input: record.input,
                body,
                last_jump_at_ms: 0,
            },
        );
    }

    fn remove(&mut self, key: &str, stage: &mut dyn Stage) {
        if let Some(actor) = self.actors.remove(key) {
            stage.destroy_actor(actor.body);
            debug!(session = key, "actor removed");
        }
    }

    /// Destroys every actor (screen teardown or demotion).
    pub fn clear(&mut self, stage: &mut dyn Stage) {
        for (_, actor) in self.actors.drain() {
            stage.destroy_actor(actor.body);
        }
        self.pending.clear();
    }
}
