//! Raw per-frame input to planar move vector plus edge-triggered action flags.

use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::Real;

use crate::math::{project_on_plane, try_normalize};

/// Device-level state for one frame. Buttons are "held" levels.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawInput {
    pub move_x: Real,
    pub move_y: Real,
    pub jump: bool,
    pub dash: bool,
    pub crouch: bool,
}

/// What the movement controller consumes once per tick.
///
/// Action flags are true only on the tick the button went down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputSample {
    pub move_vector: Vector<Real>,
    pub jump_pressed: bool,
    pub dash_pressed: bool,
    pub crouch_toggle_pressed: bool,
}

impl Default for InputSample {
    fn default() -> Self {
        Self {
            move_vector: Vector::zeros(),
            jump_pressed: false,
            dash_pressed: false,
            crouch_toggle_pressed: false,
        }
    }
}

pub trait InputAdapter {
    /// `camera` selects camera-relative movement; `None` moves relative to world axes.
    fn sample(
        &mut self,
        raw: RawInput,
        camera: Option<Rotation<Real>>,
        character_up: Vector<Real>,
    ) -> InputSample;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PlanarInputAdapter {
    jump_held: bool,
    dash_held: bool,
    crouch_held: bool,
}

impl PlanarInputAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl InputAdapter for PlanarInputAdapter {
    fn sample(
        &mut self,
        raw: RawInput,
        camera: Option<Rotation<Real>>,
        character_up: Vector<Real>,
    ) -> InputSample {
        let up = try_normalize(character_up).unwrap_or_else(Vector::y);
        let reference = camera.unwrap_or_else(Rotation::identity);
        let move_vector = planar_move_vector([raw.move_x, raw.move_y], reference, up);

        let sample = InputSample {
            move_vector,
            jump_pressed: raw.jump && !self.jump_held,
            dash_pressed: raw.dash && !self.dash_held,
            crouch_toggle_pressed: raw.crouch && !self.crouch_held,
        };
        self.jump_held = raw.jump;
        self.dash_held = raw.dash;
        self.crouch_held = raw.crouch;
        sample
    }
}

/// Rotates a 2D axis (`x` right, `y` forward) into the plane of `up` using the
/// reference orientation, then clamps it to unit length.
pub fn planar_move_vector(
    axis: [Real; 2],
    reference: Rotation<Real>,
    up: Vector<Real>,
) -> Vector<Real> {
    let forward = try_normalize(project_on_plane(reference * Vector::z(), up))
        .or_else(|| try_normalize(project_on_plane(reference * Vector::y(), up)));
    let Some(forward) = forward else {
        return Vector::zeros();
    };
    let right = forward.cross(&up);
    let axis = [finite_or_zero(axis[0]), finite_or_zero(axis[1])];
    let intent = right * axis[0] + forward * axis[1];
    let len = intent.norm();
    if len > 1.0 {
        intent / len
    } else {
        intent
    }
}

fn finite_or_zero(value: Real) -> Real {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
