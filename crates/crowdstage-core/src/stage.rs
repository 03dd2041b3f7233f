//! The simulation world the elected screen steps.
//!
//! The screen layer is written against the [`Stage`] trait, the surface
//! a rendering/physics engine exposes, and [`ArcadeStage`] is the
//! built-in implementation: a fixed-tick, y-down world with gravity, a
//! static ground slab, and axis-aligned bounds. There is no randomness
//! inside the stage; spawn placement is the reconciler's job.

use std::collections::BTreeMap;

use glam::Vec2;

/// Stage width in pixels.
pub const STAGE_WIDTH: f32 = 960.0;
/// Stage height in pixels.
pub const STAGE_HEIGHT: f32 = 540.0;
/// Downward gravity in px/s² (y grows downward).
pub const GRAVITY: f32 = 900.0;
/// Top surface of the static ground slab.
pub const GROUND_TOP: f32 = 500.0;
/// Fixed timestep (60 ticks per second).
pub const FIXED_DT: f32 = 1.0 / 60.0;
/// Terminal fall speed in px/s.
pub const MAX_FALL_SPEED: f32 = 900.0;

/// Monospace label metrics used to size an actor's hit body.
const CHAR_WIDTH: f32 = 13.0;
const LABEL_HEIGHT: f32 = 22.0;

/// Handle to one simulated body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(u64);

impl BodyId {
    /// Wraps a raw handle value. Alternative [`Stage`] implementations
    /// allocate their own handles through this.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// The surface the screen layer needs from a simulation world.
///
/// One method per operation the coordination layer performs: actor
/// lifecycle, velocity control, ground contact for the jump gate, and a
/// monotonic simulation clock for the jump debounce. `step` advances one
/// fixed tick; the embedder decides the cadence.
pub trait Stage {
    /// Creates a body sized for `label` and returns its handle.
    fn create_actor(&mut self, label: &str) -> BodyId;

    /// Destroys a body. Unknown handles are a no-op.
    fn destroy_actor(&mut self, body: BodyId);

    /// Resizes a body for a new label (after a rename).
    fn relabel(&mut self, body: BodyId, label: &str);

    /// Teleports a body (spawn placement).
    fn set_position(&mut self, body: BodyId, position: Vec2);

    /// Current position of a body's center.
    fn position(&self, body: BodyId) -> Vec2;

    /// Current velocity.
    fn velocity(&self, body: BodyId) -> Vec2;

    /// Sets the horizontal velocity component.
    fn set_velocity_x(&mut self, body: BodyId, vx: f32);

    /// Sets the vertical velocity component.
    fn set_velocity_y(&mut self, body: BodyId, vy: f32);

    /// Whether the body rested on the ground after the last step.
    fn is_grounded(&self, body: BodyId) -> bool;

    /// Simulation time in milliseconds. Advances only with [`step`](Self::step),
    /// so debounce logic stays correct under frame-rate variance.
    fn now_ms(&self) -> u64;

    /// Advances the world by one fixed tick.
    fn step(&mut self);
}

#[derive(Debug, Clone)]
struct Body {
    position: Vec2,
    velocity: Vec2,
    half: Vec2,
    grounded: bool,
}

/// Built-in fixed-tick world: gravity, ground slab, stage bounds.
#[derive(Debug, Default)]
pub struct ArcadeStage {
    bodies: BTreeMap<BodyId, Body>,
    next_body: u64,
    ticks: u64,
}

impl ArcadeStage {
    /// Creates an empty stage at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ticks stepped so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of live bodies.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    fn half_for_label(label: &str) -> Vec2 {
        #[allow(clippy::cast_precision_loss)]
        let width = (label.chars().count().max(1) as f32) * CHAR_WIDTH;
        Vec2::new(width / 2.0, LABEL_HEIGHT / 2.0)
    }
}

impl Stage for ArcadeStage {
    fn create_actor(&mut self, label: &str) -> BodyId {
        self.next_body += 1;
        let id = BodyId(self.next_body);
        self.bodies.insert(
            id,
            Body {
                position: Vec2::ZERO,
                velocity: Vec2::ZERO,
                half: Self::half_for_label(label),
                grounded: false,
            },
        );
        id
    }

    fn destroy_actor(&mut self, body: BodyId) {
        self.bodies.remove(&body);
    }

    fn relabel(&mut self, body: BodyId, label: &str) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.half = Self::half_for_label(label);
        }
    }

    fn set_position(&mut self, body: BodyId, position: Vec2) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.position = position;
        }
    }

    fn position(&self, body: BodyId) -> Vec2 {
        self.bodies.get(&body).map_or(Vec2::ZERO, |b| b.position)
    }

    fn velocity(&self, body: BodyId) -> Vec2 {
        self.bodies.get(&body).map_or(Vec2::ZERO, |b| b.velocity)
    }

    fn set_velocity_x(&mut self, body: BodyId, vx: f32) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.velocity.x = vx;
        }
    }

    fn set_velocity_y(&mut self, body: BodyId, vy: f32) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.velocity.y = vy;
        }
    }

    fn is_grounded(&self, body: BodyId) -> bool {
        self.bodies.get(&body).is_some_and(|b| b.grounded)
    }

    fn now_ms(&self) -> u64 {
        self.ticks * 1000 / 60
    }

    fn step(&mut self) {
        for body in self.bodies.values_mut() {
            body.velocity.y = (body.velocity.y + GRAVITY * FIXED_DT).min(MAX_FALL_SPEED);
            body.position += body.velocity * FIXED_DT;

            // Stage bounds stop horizontal motion rather than bouncing.
            let min_x = body.half.x;
            let max_x = STAGE_WIDTH - body.half.x;
            if body.position.x < min_x {
                body.position.x = min_x;
                body.velocity.x = 0.0;
            } else if body.position.x > max_x {
                body.position.x = max_x;
                body.velocity.x = 0.0;
            }
            if body.position.y < body.half.y {
                body.position.y = body.half.y;
                body.velocity.y = body.velocity.y.max(0.0);
            }

            let floor = GROUND_TOP.min(STAGE_HEIGHT) - body.half.y;
            if body.position.y >= floor && body.velocity.y >= 0.0 {
                body.position.y = floor;
                body.velocity.y = 0.0;
                body.grounded = true;
            } else {
                body.grounded = false;
            }
        }
        self.ticks += 1;
    }
}
