use std::fmt;

use rapier3d::math::Vector;
use rapier3d::prelude::Real;

use crate::motor::ColliderId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CharacterState {
    /// Grounded locomotion.
    #[default]
    Default,
    Airborne,
    Dash,
    Ladder,
    WallClimb,
}

impl CharacterState {
    pub fn as_str(self) -> &'static str {
        match self {
            CharacterState::Default => "default",
            CharacterState::Airborne => "airborne",
            CharacterState::Dash => "dash",
            CharacterState::Ladder => "ladder",
            CharacterState::WallClimb => "wall_climb",
        }
    }
}

impl fmt::Display for CharacterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-character mutable movement state. Only the controller writes it.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeState {
    pub(crate) state: CharacterState,
    pub consumed_jumps: u32,
    pub time_since_grounded: Real,
    pub jump_requested: bool,
    pub time_since_jump_requested: Real,
    /// Elapsed time of the curve-driven jump phase, if one is running.
    pub jump_elapsed: Option<Real>,
    pub dash_requested: bool,
    pub dash_cooldown_armed: bool,
    pub dash_cooldown_elapsed: Real,
    pub dash_remaining: Real,
    pub dash_direction: Vector<Real>,
    pub dash_speed: Real,
    pub wall_grab_elapsed: Real,
    pub last_wall_normal: Vector<Real>,
    pub ladder: Option<ColliderId>,
    pub crouching: bool,
    pub stand_requested: bool,
    pub desired_forward: Vector<Real>,
    pub move_vector: Vector<Real>,
    pub jumped_this_frame: bool,
    pub pending_velocity: Vector<Real>,
}

impl RuntimeState {
    pub fn new(forward: Vector<Real>) -> Self {
        Self {
            state: CharacterState::Default,
            consumed_jumps: 0,
            time_since_grounded: 0.0,
            jump_requested: false,
            time_since_jump_requested: 0.0,
            jump_elapsed: None,
            dash_requested: false,
            dash_cooldown_armed: false,
            dash_cooldown_elapsed: 0.0,
            dash_remaining: 0.0,
            dash_direction: forward,
            dash_speed: 0.0,
            wall_grab_elapsed: 0.0,
            last_wall_normal: Vector::zeros(),
            ladder: None,
            crouching: false,
            stand_requested: false,
            desired_forward: forward,
            move_vector: Vector::zeros(),
            jumped_this_frame: false,
            pending_velocity: Vector::zeros(),
        }
    }

    pub fn state(&self) -> CharacterState {
        self.state
    }

    pub fn on_dash_cooldown(&self) -> bool {
        self.dash_cooldown_armed
    }
}

/// Edges observed during one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickEvents {
    pub jumped: bool,
    pub landed: bool,
    pub left_ground: bool,
}
