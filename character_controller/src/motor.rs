//! Contract between the movement controller and the collision motor that owns
//! the authoritative pose.
//!
//! Each simulation step the motor drives the callbacks in this order:
//!
//! 1. [`MotorCallbacks::before_character_update`]
//! 2. [`MotorCallbacks::update_rotation`]
//! 3. [`MotorCallbacks::update_velocity`]
//! 4. sweep/resolve, during which the motor may call
//!    [`MotorCallbacks::is_collider_valid_for_collisions`],
//!    [`MotorCallbacks::process_hit_stability_report`],
//!    [`MotorCallbacks::on_ground_hit`], [`MotorCallbacks::on_movement_hit`] and
//!    [`MotorCallbacks::on_discrete_collision_detected`]
//! 5. [`MotorCallbacks::after_character_update`]
//! 6. [`MotorCallbacks::post_grounding_update`]

use rapier3d::math::{Point, Rotation, Vector};
use rapier3d::prelude::Real;

use crate::config::SurfaceFilter;

/// Opaque collider identity assigned by the motor host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundingStatus {
    pub found_any_ground: bool,
    pub is_stable_on_ground: bool,
    pub ground_normal: Vector<Real>,
}

impl Default for GroundingStatus {
    fn default() -> Self {
        Self {
            found_any_ground: false,
            is_stable_on_ground: false,
            ground_normal: Vector::y(),
        }
    }
}

/// A contact produced while the motor resolves the requested motion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementHit {
    pub collider: ColliderId,
    pub normal: Vector<Real>,
    pub point: Point<Real>,
}

/// Motor's verdict on a hit; callbacks may override it before it is used.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HitStabilityReport {
    pub is_stable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeHit {
    pub collider: ColliderId,
    pub normal: Vector<Real>,
}

/// Queries and mutations the controller may issue against its motor.
pub trait CharacterMotor {
    /// Base of the capsule (feet) in world space.
    fn position(&self) -> Vector<Real>;
    fn rotation(&self) -> Rotation<Real>;
    fn grounding(&self) -> GroundingStatus;
    fn last_grounding(&self) -> GroundingStatus;
    /// Skip ground detection/snapping for the next step(s) so a jump can leave the floor.
    fn force_unground(&mut self);
    fn set_capsule_dimensions(&mut self, radius: Real, height: Real);
    /// True when the capsule at the current pose overlaps solid geometry.
    fn character_overlap(&self) -> bool;
    fn raycast(
        &self,
        origin: Vector<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        filter: SurfaceFilter,
    ) -> Option<ProbeHit>;
    fn overlap_sphere(
        &self,
        center: Vector<Real>,
        radius: Real,
        filter: SurfaceFilter,
    ) -> Option<ColliderId>;

    fn character_up(&self) -> Vector<Real> {
        self.rotation() * Vector::y()
    }

    fn character_forward(&self) -> Vector<Real> {
        self.rotation() * Vector::z()
    }
}

/// Callbacks a motor invokes on the movement controller it drives.
pub trait MotorCallbacks {
    fn before_character_update(&mut self, _motor: &mut dyn CharacterMotor, _dt: Real) {}

    fn update_rotation(
        &mut self,
        motor: &mut dyn CharacterMotor,
        rotation: &mut Rotation<Real>,
        dt: Real,
    );

    fn update_velocity(
        &mut self,
        motor: &mut dyn CharacterMotor,
        velocity: &mut Vector<Real>,
        dt: Real,
    );

    fn after_character_update(&mut self, _motor: &mut dyn CharacterMotor, _dt: Real) {}

    fn post_grounding_update(&mut self, _motor: &mut dyn CharacterMotor, _dt: Real) {}

    fn is_collider_valid_for_collisions(&self, _collider: ColliderId) -> bool {
        true
    }

    fn on_ground_hit(
        &mut self,
        _motor: &mut dyn CharacterMotor,
        _hit: &MovementHit,
        _report: &mut HitStabilityReport,
    ) {
    }

    fn on_movement_hit(
        &mut self,
        _motor: &mut dyn CharacterMotor,
        _hit: &MovementHit,
        _report: &mut HitStabilityReport,
    ) {
    }

    fn process_hit_stability_report(&mut self, _hit: &MovementHit, _report: &mut HitStabilityReport) {
    }

    fn on_discrete_collision_detected(&mut self, _collider: ColliderId) {}
}
