//! Short-range geometric checks that gate wall-climb and ladder modes.

use rapier3d::math::Vector;
use rapier3d::prelude::Real;

use crate::config::{LadderConfig, WallClimbConfig};
use crate::math::try_normalize;
use crate::motor::{CharacterMotor, ColliderId};

/// A contact normal is a climbable wall when its angle from `up` exceeds half of
/// `max_climbable_angle` without facing downward by the same margin.
pub fn is_climbable_wall_normal(
    config: &WallClimbConfig,
    normal: Vector<Real>,
    up: Vector<Real>,
) -> bool {
    let (Some(normal), Some(up)) = (try_normalize(normal), try_normalize(up)) else {
        return false;
    };
    let angle = normal.dot(&up).clamp(-1.0, 1.0).acos();
    let threshold = config.max_climbable_angle * 0.5;
    angle > threshold && angle < std::f32::consts::PI - threshold
}

pub fn is_still_facing_climbable_wall(
    config: &WallClimbConfig,
    motor: &dyn CharacterMotor,
    wall_normal: Vector<Real>,
) -> bool {
    let Some(normal) = try_normalize(wall_normal) else {
        return false;
    };
    let origin = motor.position() + motor.character_up() * config.probe_height;
    motor
        .raycast(origin, -normal, config.stick_distance, config.surface)
        .is_some()
}

pub fn detect_ladder(config: &LadderConfig, motor: &dyn CharacterMotor) -> Option<ColliderId> {
    let center = motor.position()
        + motor.character_up() * config.probe_height
        + motor.character_forward() * config.detection_distance;
    motor.overlap_sphere(center, config.detection_radius, config.surface)
}
