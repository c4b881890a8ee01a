//! Rapier-backed character motor: owns the capsule pose and drives a
//! [`MotorCallbacks`] implementation through one sweep per tick.
//!
//! Policy: collision/stepping must use Rapier KCC; do not reimplement step/slide logic.
#![forbid(unsafe_code)]

use character_controller::{
    CharacterMotor, ColliderId, GroundingStatus, HitStabilityReport, MotorCallbacks, MovementHit,
    ProbeHit, SurfaceFilter,
};
use log::trace;
use physics_rapier::{PhysicsWorld, SurfaceQuery};
use rapier3d::control::{CharacterAutostep, CharacterLength, KinematicCharacterController};
use rapier3d::math::{Isometry, Point, Rotation, UnitVector, Vector};
use rapier3d::prelude::{Ball, Capsule, Collider, ColliderHandle, QueryFilter, Real};

/// How long `force_unground` keeps ground snapping and detection off.
const UNGROUND_TIME: Real = 0.1;
/// Shrink applied to the capsule when testing for overlaps at rest.
const OVERLAP_SKIN: Real = 0.02;

#[derive(Clone, Copy, Debug)]
pub struct MotorProfile {
    /// Maximum step height for auto-stepping in meters.
    pub step_height: Real,
    /// Minimum width of free space required after stepping.
    pub step_min_width: Real,
    /// Maximum walkable slope angle in radians.
    pub max_slope_angle: Real,
    /// Minimum slope angle where sliding begins (>= max_slope_angle).
    pub min_slope_slide_angle: Real,
    /// Distance to snap to ground in meters.
    pub ground_snap_distance: Real,
    /// Small separation to preserve between character and environment.
    pub offset: Real,
    /// Small nudge applied along contact normals to prevent sticking.
    pub normal_nudge_factor: Real,
}

impl Default for MotorProfile {
    fn default() -> Self {
        Self {
            step_height: 0.35,
            step_min_width: 0.2,
            max_slope_angle: 45.0_f32.to_radians(),
            min_slope_slide_angle: 50.0_f32.to_radians(),
            ground_snap_distance: 0.2,
            offset: 0.02,
            normal_nudge_factor: 1.0e-4,
        }
    }
}

impl MotorProfile {
    fn apply_to(&self, controller: &mut KinematicCharacterController) {
        controller.autostep = if self.step_height > 0.0 {
            Some(CharacterAutostep {
                max_height: CharacterLength::Absolute(self.step_height),
                min_width: CharacterLength::Absolute(self.step_min_width),
                include_dynamic_bodies: false,
            })
        } else {
            None
        };
        controller.max_slope_climb_angle = self.max_slope_angle;
        controller.min_slope_slide_angle = self.min_slope_slide_angle.max(self.max_slope_angle);
        controller.snap_to_ground = if self.ground_snap_distance > 0.0 {
            Some(CharacterLength::Absolute(self.ground_snap_distance))
        } else {
            None
        };
        controller.offset = CharacterLength::Absolute(self.offset);
        controller.normal_nudge_factor = self.normal_nudge_factor;
    }
}

pub fn collider_id(handle: ColliderHandle) -> ColliderId {
    let (index, generation) = handle.into_raw_parts();
    ColliderId(u64::from(index) | (u64::from(generation) << 32))
}

fn surface_query(filter: SurfaceFilter) -> SurfaceQuery {
    SurfaceQuery::new(filter.layers, filter.tag)
}

pub struct KinematicMotor {
    profile: MotorProfile,
    controller: KinematicCharacterController,
    position: Vector<Real>,
    rotation: Rotation<Real>,
    velocity: Vector<Real>,
    capsule_radius: Real,
    capsule_height: Real,
    grounding: GroundingStatus,
    last_grounding: GroundingStatus,
    unground_timer: Real,
}

impl KinematicMotor {
    /// `position` is the base of the capsule (feet).
    pub fn new(profile: MotorProfile, position: Vector<Real>, rotation: Rotation<Real>) -> Self {
        let mut controller = KinematicCharacterController::default();
        profile.apply_to(&mut controller);
        Self {
            profile,
            controller,
            position,
            rotation,
            velocity: Vector::zeros(),
            capsule_radius: 0.5,
            capsule_height: 2.0,
            grounding: GroundingStatus::default(),
            last_grounding: GroundingStatus::default(),
            unground_timer: 0.0,
        }
    }

    pub fn profile(&self) -> MotorProfile {
        self.profile
    }

    pub fn set_profile(&mut self, profile: MotorProfile) {
        self.profile = profile;
        profile.apply_to(&mut self.controller);
    }

    pub fn position(&self) -> Vector<Real> {
        self.position
    }

    pub fn set_position(&mut self, position: Vector<Real>) {
        self.position = position;
    }

    pub fn rotation(&self) -> Rotation<Real> {
        self.rotation
    }

    pub fn velocity(&self) -> Vector<Real> {
        self.velocity
    }

    pub fn grounding(&self) -> GroundingStatus {
        self.grounding
    }

    /// `(radius, total height)` of the current capsule.
    pub fn capsule_dimensions(&self) -> (Real, Real) {
        (self.capsule_radius, self.capsule_height)
    }

    /// Binds the motor to `world` for the duration of a query or callback.
    pub fn frame<'a>(&'a mut self, world: &'a PhysicsWorld) -> MotorFrame<'a> {
        MotorFrame { motor: self, world }
    }

    fn capsule(&self) -> Capsule {
        let half_segment = (self.capsule_height * 0.5 - self.capsule_radius).max(0.0);
        Capsule::new_y(half_segment, self.capsule_radius)
    }

    fn capsule_pose(&self, up: Vector<Real>) -> Isometry<Real> {
        let center = self.position + up * (self.capsule_height * 0.5);
        Isometry::translation(center.x, center.y, center.z)
    }

    /// Runs one simulation step, invoking `callbacks` in motor order.
    pub fn tick(&mut self, world: &PhysicsWorld, callbacks: &mut dyn MotorCallbacks, dt: Real) {
        callbacks.before_character_update(&mut self.frame(world), dt);

        let mut rotation = self.rotation;
        callbacks.update_rotation(&mut self.frame(world), &mut rotation, dt);
        self.rotation = rotation;

        let mut velocity = self.velocity;
        callbacks.update_velocity(&mut self.frame(world), &mut velocity, dt);
        self.velocity = velocity;

        let up = world.world_up();
        let hits = self.sweep(world, &*callbacks, up, dt);
        let stable_dot = self.controller.max_slope_climb_angle.cos();
        for hit in &hits {
            let mut report = HitStabilityReport {
                is_stable: hit.normal.dot(&up) >= stable_dot,
            };
            callbacks.process_hit_stability_report(hit, &mut report);
            if report.is_stable {
                callbacks.on_ground_hit(&mut self.frame(world), hit, &mut report);
            }
            callbacks.on_movement_hit(&mut self.frame(world), hit, &mut report);
            let into = self.velocity.dot(&hit.normal);
            if into < 0.0 {
                self.velocity -= hit.normal * into;
            }
        }

        let pose = self.capsule_pose(up);
        let capsule = self.capsule();
        for handle in world.intersections_with_shape(&pose, &capsule, SurfaceQuery::SOLID) {
            let id = collider_id(handle);
            if callbacks.is_collider_valid_for_collisions(id) {
                callbacks.on_discrete_collision_detected(id);
            }
        }

        callbacks.after_character_update(&mut self.frame(world), dt);

        self.last_grounding = self.grounding;
        self.grounding = if self.unground_timer > 0.0 {
            GroundingStatus::default()
        } else {
            self.probe_ground(world, up)
        };
        self.unground_timer = (self.unground_timer - dt.max(0.0)).max(0.0);
        if self.grounding.is_stable_on_ground {
            let into = self.velocity.dot(&self.grounding.ground_normal);
            if into < 0.0 {
                self.velocity -= self.grounding.ground_normal * into;
            }
        }

        callbacks.post_grounding_update(&mut self.frame(world), dt);
    }

    fn sweep(
        &mut self,
        world: &PhysicsWorld,
        callbacks: &dyn MotorCallbacks,
        up: Vector<Real>,
        dt: Real,
    ) -> Vec<MovementHit> {
        let desired = self.velocity * dt.max(0.0);
        if !desired.iter().all(|c| c.is_finite()) {
            return Vec::new();
        }
        self.controller.up = UnitVector::new_normalize(up);
        let original_autostep = self.controller.autostep;
        let original_snap = self.controller.snap_to_ground;
        if self.unground_timer > 0.0 {
            self.controller.autostep = None;
            self.controller.snap_to_ground = None;
        }

        let mut hits = Vec::new();
        let predicate = |handle: ColliderHandle, _: &Collider| {
            callbacks.is_collider_valid_for_collisions(collider_id(handle))
        };
        let filter = QueryFilter::default().exclude_sensors().predicate(&predicate);
        let capsule = self.capsule();
        let output = self.controller.move_shape(
            dt,
            world.bodies(),
            world.colliders(),
            world.query_pipeline(),
            &capsule,
            &self.capsule_pose(up),
            desired,
            filter,
            |collision| {
                hits.push(MovementHit {
                    collider: collider_id(collision.handle),
                    normal: collision.hit.normal1.into_inner(),
                    point: collision.hit.witness1,
                });
            },
        );
        self.controller.autostep = original_autostep;
        self.controller.snap_to_ground = original_snap;
        self.position += output.translation;
        trace!(
            "sweep moved ({:.3},{:.3},{:.3}) with {} hits, grounded={}",
            output.translation.x,
            output.translation.y,
            output.translation.z,
            hits.len(),
            output.grounded
        );
        hits
    }

    fn probe_ground(&self, world: &PhysicsWorld, up: Vector<Real>) -> GroundingStatus {
        let snap_distance = self.profile.ground_snap_distance.max(0.0);
        // Use a smaller foot probe to stabilize grounding without wall bias.
        let foot_radius = self.capsule_radius * 0.75;
        let origin = Point::from(self.position + up * foot_radius);
        let max_toi = foot_radius + snap_distance + self.profile.offset + 1.0e-3;
        let Some(hit) = world.cast_ray(origin, -up, max_toi, SurfaceQuery::SOLID) else {
            return GroundingStatus::default();
        };
        let up_dot = hit.normal.dot(&up);
        if up_dot <= 0.0 {
            return GroundingStatus::default();
        }
        GroundingStatus {
            found_any_ground: true,
            is_stable_on_ground: up_dot >= self.controller.max_slope_climb_angle.cos(),
            ground_normal: hit.normal,
        }
    }
}

/// A motor paired with the scene it queries; this is what callbacks receive.
pub struct MotorFrame<'a> {
    motor: &'a mut KinematicMotor,
    world: &'a PhysicsWorld,
}

impl CharacterMotor for MotorFrame<'_> {
    fn position(&self) -> Vector<Real> {
        self.motor.position
    }

    fn rotation(&self) -> Rotation<Real> {
        self.motor.rotation
    }

    fn grounding(&self) -> GroundingStatus {
        self.motor.grounding
    }

    fn last_grounding(&self) -> GroundingStatus {
        self.motor.last_grounding
    }

    fn force_unground(&mut self) {
        self.motor.unground_timer = UNGROUND_TIME;
    }

    fn set_capsule_dimensions(&mut self, radius: Real, height: Real) {
        self.motor.capsule_radius = radius;
        self.motor.capsule_height = height.max(radius * 2.0);
    }

    fn character_overlap(&self) -> bool {
        let radius = (self.motor.capsule_radius - OVERLAP_SKIN).max(OVERLAP_SKIN);
        let half_segment = (self.motor.capsule_height * 0.5 - self.motor.capsule_radius).max(0.0);
        let shape = Capsule::new_y(half_segment, radius);
        let pose = self.motor.capsule_pose(self.world.world_up());
        self.world
            .intersection_with_shape(&pose, &shape, SurfaceQuery::SOLID)
            .is_some()
    }

    fn raycast(
        &self,
        origin: Vector<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        filter: SurfaceFilter,
    ) -> Option<ProbeHit> {
        if direction.norm_squared() <= 1.0e-8 {
            return None;
        }
        let hit = self.world.cast_ray(
            Point::from(origin),
            direction.normalize(),
            max_distance,
            surface_query(filter),
        )?;
        Some(ProbeHit {
            collider: collider_id(hit.collider),
            normal: hit.normal,
        })
    }

    fn overlap_sphere(
        &self,
        center: Vector<Real>,
        radius: Real,
        filter: SurfaceFilter,
    ) -> Option<ColliderId> {
        if !(radius > 0.0) {
            return None;
        }
        let pose = Isometry::translation(center.x, center.y, center.z);
        self.world
            .intersection_with_shape(&pose, &Ball::new(radius), surface_query(filter).with_sensors())
            .map(collider_id)
    }
}
