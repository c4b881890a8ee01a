//! Tunable constants for every movement mode.
//!
//! Angles are radians, distances meters, times seconds. The record is loaded
//! once, validated, and then shared read-only (`Arc<ControllerConfig>`)
//! between any number of characters.

use std::path::Path;

use rapier3d::math::Vector;
use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Collision-group bits that match every layer.
pub const ALL_LAYERS: u32 = u32::MAX;
/// Default collider tag marking ladder volumes.
pub const LADDER_TAG: u64 = 0x1AD0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub locomotion: LocomotionConfig,
    pub crouch: CrouchConfig,
    pub jump: JumpConfig,
    pub dash: DashConfig,
    pub wall_climb: WallClimbConfig,
    pub ladder: LadderConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    pub max_stable_speed: Real,
    /// Exponential smoothing rate toward the target ground velocity.
    pub stable_movement_sharpness: Real,
    pub orientation_sharpness: Real,
    /// Rate at which the character up axis re-aligns with world up (0 = use `orientation_sharpness`).
    pub bonus_orientation_sharpness: Real,
    pub max_air_speed: Real,
    pub air_acceleration: Real,
    pub air_drag: Real,
    /// Linear deceleration (m/s^2) applied on the ground when there is no input.
    pub ground_friction: Real,
    pub gravity: [Real; 3],
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            max_stable_speed: 10.0,
            stable_movement_sharpness: 15.0,
            orientation_sharpness: 10.0,
            bonus_orientation_sharpness: 10.0,
            max_air_speed: 15.0,
            air_acceleration: 15.0,
            air_drag: 0.1,
            ground_friction: 0.5,
            gravity: [0.0, -30.0, 0.0],
        }
    }
}

impl LocomotionConfig {
    pub fn gravity(&self) -> Vector<Real> {
        Vector::new(self.gravity[0], self.gravity[1], self.gravity[2])
    }

    /// World up derived from gravity, `+Y` when gravity is zero.
    pub fn world_up(&self) -> Vector<Real> {
        let gravity = self.gravity();
        if gravity.norm_squared() > 1.0e-6 {
            -gravity.normalize()
        } else {
            Vector::y()
        }
    }

    pub fn up_sharpness(&self) -> Real {
        if self.bonus_orientation_sharpness > 0.0 {
            self.bonus_orientation_sharpness
        } else {
            self.orientation_sharpness
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrouchConfig {
    pub standing_height: Real,
    pub crouched_height: Real,
    pub capsule_radius: Real,
    pub speed_multiplier: Real,
}

impl Default for CrouchConfig {
    fn default() -> Self {
        Self {
            standing_height: 2.0,
            crouched_height: 1.0,
            capsule_radius: 0.5,
            speed_multiplier: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JumpConfig {
    pub max_jump_count: u32,
    /// Seconds during which the vertical speed follows `speed_curve` (0 = impulse only).
    pub jump_duration: Real,
    pub jump_speed: Real,
    /// Extra velocity along the move input added when a jump starts.
    pub jump_scalable_forward_speed: Real,
    pub speed_curve: JumpCurve,
    pub jump_buffer_time: Real,
    pub coyote_time: Real,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            max_jump_count: 2,
            jump_duration: 0.1,
            jump_speed: 10.0,
            jump_scalable_forward_speed: 0.0,
            speed_curve: JumpCurve::default(),
            jump_buffer_time: 0.1,
            coyote_time: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    pub speed_multiplier: Real,
    pub min_speed: Real,
    pub max_speed: Real,
    pub duration: Real,
    /// Exponential blend rate of planar velocity toward the dash velocity.
    pub decay: Real,
    pub cooldown: Real,
    /// Fraction of normal gravity applied while dashing.
    pub gravity_scale: Real,
    pub air_dash_consumes_jump: bool,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            speed_multiplier: 2.0,
            min_speed: 15.0,
            max_speed: 30.0,
            duration: 0.25,
            decay: 20.0,
            cooldown: 1.0,
            gravity_scale: 0.2,
            air_dash_consumes_jump: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallClimbConfig {
    /// A contact counts as a wall once its angle from up exceeds half of this.
    pub max_climbable_angle: Real,
    pub slide_speed: Real,
    pub max_grab_duration: Real,
    pub stick_distance: Real,
    /// Height above the character base the wall probe ray starts from.
    pub probe_height: Real,
    pub gravity_scale: Real,
    pub surface: SurfaceFilter,
}

impl Default for WallClimbConfig {
    fn default() -> Self {
        Self {
            max_climbable_angle: 170.0_f32.to_radians(),
            slide_speed: 1.0,
            max_grab_duration: 2.0,
            stick_distance: 1.0,
            probe_height: 1.0,
            gravity_scale: 0.1,
            surface: SurfaceFilter::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    pub climb_speed: Real,
    pub detection_distance: Real,
    pub detection_radius: Real,
    pub probe_height: Real,
    pub surface: SurfaceFilter,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            climb_speed: 4.0,
            detection_distance: 0.6,
            detection_radius: 0.3,
            probe_height: 1.0,
            surface: SurfaceFilter {
                layers: ALL_LAYERS,
                tag: Some(LADDER_TAG),
            },
        }
    }
}

/// Selects probe targets by collision layer bits and an optional collider tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceFilter {
    pub layers: u32,
    pub tag: Option<u64>,
}

impl Default for SurfaceFilter {
    fn default() -> Self {
        Self {
            layers: ALL_LAYERS,
            tag: None,
        }
    }
}

impl SurfaceFilter {
    pub fn accepts(&self, layers: u32, tag: Option<u64>) -> bool {
        if self.layers & layers == 0 {
            return false;
        }
        match self.tag {
            Some(required) => tag == Some(required),
            None => true,
        }
    }
}

/// Jump speed multiplier keyed by normalized elapsed time.
///
/// Keys are `[time, value]` pairs with strictly increasing times. Sampling is
/// a cubic ease between neighbouring keys and the result is clamped to `[0, 1]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JumpCurve {
    pub keys: Vec<[Real; 2]>,
}

impl Default for JumpCurve {
    fn default() -> Self {
        Self {
            keys: vec![[0.0, 1.0], [1.0, 1.0]],
        }
    }
}

impl JumpCurve {
    pub fn constant(value: Real) -> Self {
        Self {
            keys: vec![[0.0, value], [1.0, value]],
        }
    }

    pub fn sample(&self, t: Real) -> Real {
        let Some(first) = self.keys.first() else {
            return 1.0;
        };
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        if t <= first[0] {
            return first[1].clamp(0.0, 1.0);
        }
        for pair in self.keys.windows(2) {
            let [a, b] = [pair[0], pair[1]];
            if t <= b[0] {
                let span = b[0] - a[0];
                let u = if span > 0.0 { (t - a[0]) / span } else { 1.0 };
                let eased = u * u * (3.0 - 2.0 * u);
                return (a[1] + (b[1] - a[1]) * eased).clamp(0.0, 1.0);
            }
        }
        self.keys[self.keys.len() - 1][1].clamp(0.0, 1.0)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.keys.is_empty() {
            return Err(ConfigurationError::invalid(
                "jump.speed_curve",
                "curve needs at least one key",
            ));
        }
        let mut previous: Option<Real> = None;
        for key in &self.keys {
            if !key[0].is_finite() || !key[1].is_finite() {
                return Err(ConfigurationError::invalid(
                    "jump.speed_curve",
                    "curve keys must be finite",
                ));
            }
            if let Some(prev) = previous {
                if key[0] <= prev {
                    return Err(ConfigurationError::invalid(
                        "jump.speed_curve",
                        "curve key times must increase",
                    ));
                }
            }
            previous = Some(key[0]);
        }
        Ok(())
    }
}

impl ControllerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(contents).map_err(|err| ConfigurationError::Parse {
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = std::fs::read_to_string(path).map_err(|err| ConfigurationError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigurationError> {
        toml::to_string(self).map_err(|err| ConfigurationError::Parse {
            message: err.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let loco = &self.locomotion;
        non_negative("locomotion.max_stable_speed", loco.max_stable_speed)?;
        non_negative(
            "locomotion.stable_movement_sharpness",
            loco.stable_movement_sharpness,
        )?;
        non_negative("locomotion.orientation_sharpness", loco.orientation_sharpness)?;
        non_negative(
            "locomotion.bonus_orientation_sharpness",
            loco.bonus_orientation_sharpness,
        )?;
        non_negative("locomotion.max_air_speed", loco.max_air_speed)?;
        non_negative("locomotion.air_acceleration", loco.air_acceleration)?;
        non_negative("locomotion.air_drag", loco.air_drag)?;
        non_negative("locomotion.ground_friction", loco.ground_friction)?;
        if loco.gravity.iter().any(|value| !value.is_finite()) {
            return Err(ConfigurationError::invalid(
                "locomotion.gravity",
                "gravity must be finite",
            ));
        }

        let crouch = &self.crouch;
        if !(crouch.capsule_radius.is_finite() && crouch.capsule_radius > 0.0) {
            return Err(ConfigurationError::invalid(
                "crouch.capsule_radius",
                "radius must be positive",
            ));
        }
        non_negative("crouch.crouched_height", crouch.crouched_height)?;
        non_negative("crouch.standing_height", crouch.standing_height)?;
        non_negative("crouch.speed_multiplier", crouch.speed_multiplier)?;
        if crouch.standing_height < crouch.capsule_radius * 2.0 {
            return Err(ConfigurationError::invalid(
                "crouch.standing_height",
                "standing height is smaller than the capsule diameter",
            ));
        }
        if crouch.crouched_height > crouch.standing_height {
            return Err(ConfigurationError::invalid(
                "crouch.crouched_height",
                "crouched height exceeds standing height",
            ));
        }

        let jump = &self.jump;
        if jump.max_jump_count == 0 {
            return Err(ConfigurationError::invalid(
                "jump.max_jump_count",
                "at least one jump must be allowed",
            ));
        }
        non_negative("jump.jump_duration", jump.jump_duration)?;
        non_negative("jump.jump_speed", jump.jump_speed)?;
        non_negative(
            "jump.jump_scalable_forward_speed",
            jump.jump_scalable_forward_speed,
        )?;
        non_negative("jump.jump_buffer_time", jump.jump_buffer_time)?;
        non_negative("jump.coyote_time", jump.coyote_time)?;
        jump.speed_curve.validate()?;

        let dash = &self.dash;
        non_negative("dash.speed_multiplier", dash.speed_multiplier)?;
        non_negative("dash.min_speed", dash.min_speed)?;
        non_negative("dash.max_speed", dash.max_speed)?;
        if dash.max_speed < dash.min_speed {
            return Err(ConfigurationError::invalid(
                "dash.max_speed",
                "max speed is below min speed",
            ));
        }
        non_negative("dash.duration", dash.duration)?;
        non_negative("dash.decay", dash.decay)?;
        non_negative("dash.cooldown", dash.cooldown)?;
        non_negative("dash.gravity_scale", dash.gravity_scale)?;

        let wall = &self.wall_climb;
        non_negative("wall_climb.max_climbable_angle", wall.max_climbable_angle)?;
        non_negative("wall_climb.slide_speed", wall.slide_speed)?;
        non_negative("wall_climb.max_grab_duration", wall.max_grab_duration)?;
        non_negative("wall_climb.stick_distance", wall.stick_distance)?;
        non_negative("wall_climb.probe_height", wall.probe_height)?;
        non_negative("wall_climb.gravity_scale", wall.gravity_scale)?;

        let ladder = &self.ladder;
        non_negative("ladder.climb_speed", ladder.climb_speed)?;
        non_negative("ladder.detection_distance", ladder.detection_distance)?;
        non_negative("ladder.detection_radius", ladder.detection_radius)?;
        non_negative("ladder.probe_height", ladder.probe_height)?;
        Ok(())
    }
}

fn non_negative(field: &'static str, value: Real) -> Result<(), ConfigurationError> {
    if !value.is_finite() {
        return Err(ConfigurationError::invalid(field, "value must be finite"));
    }
    if value < 0.0 {
        return Err(ConfigurationError::invalid(
            field,
            format!("value must not be negative (got {})", value),
        ));
    }
    Ok(())
}
