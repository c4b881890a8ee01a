//! Scripted motor for driving the controller without a collision world.

use std::cell::Cell;

use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::Real;

use crate::config::{SurfaceFilter, LADDER_TAG};
use crate::motor::{
    CharacterMotor, ColliderId, GroundingStatus, HitStabilityReport, MotorCallbacks, MovementHit,
    ProbeHit,
};

#[derive(Clone, Copy, Debug)]
pub struct RaycastRecord {
    pub origin: Vector<Real>,
    pub direction: Vector<Real>,
    pub max_distance: Real,
}

pub struct ScriptedMotor {
    pub position: Vector<Real>,
    pub rotation: Rotation<Real>,
    pub velocity: Vector<Real>,
    pub grounding: GroundingStatus,
    pub last_grounding: GroundingStatus,
    /// Grounding at the end of the previous tick.
    settled: GroundingStatus,
    pub unground_requested: bool,
    pub capsule: (Real, Real),
    /// Heights at which the capsule overlaps geometry above it.
    pub ceiling_height: Option<Real>,
    pub wall: Option<ProbeHit>,
    /// `(layers, tag)` carried by the scripted wall collider.
    pub wall_surface: (u32, Option<u64>),
    pub ladder: Option<ColliderId>,
    pub ladder_surface: (u32, Option<u64>),
    pub pending_hits: Vec<MovementHit>,
    pub last_raycast: Cell<Option<RaycastRecord>>,
}

impl ScriptedMotor {
    pub fn grounded() -> Self {
        Self {
            position: Vector::zeros(),
            rotation: Rotation::identity(),
            velocity: Vector::zeros(),
            grounding: stable_ground(),
            last_grounding: stable_ground(),
            settled: stable_ground(),
            unground_requested: false,
            capsule: (0.5, 2.0),
            ceiling_height: None,
            wall: None,
            wall_surface: (1, None),
            ladder: None,
            ladder_surface: (1, Some(LADDER_TAG)),
            pending_hits: Vec::new(),
            last_raycast: Cell::new(None),
        }
    }

    pub fn airborne() -> Self {
        Self {
            grounding: GroundingStatus::default(),
            last_grounding: GroundingStatus::default(),
            settled: GroundingStatus::default(),
            ..Self::grounded()
        }
    }

    pub fn set_grounded(&mut self, grounded: bool) {
        self.grounding = if grounded {
            stable_ground()
        } else {
            GroundingStatus::default()
        };
    }

    pub fn planar_speed(&self) -> Real {
        Vector::new(self.velocity.x, 0.0, self.velocity.z).norm()
    }

    /// Runs one step in motor callback order; the "sweep" only applies scripted hits.
    /// `grounding` set between ticks stands in for the motor's ground probe.
    pub fn tick(&mut self, callbacks: &mut dyn MotorCallbacks, dt: Real) {
        callbacks.before_character_update(self, dt);
        let mut rotation = self.rotation;
        callbacks.update_rotation(self, &mut rotation, dt);
        self.rotation = rotation;
        let mut velocity = self.velocity;
        callbacks.update_velocity(self, &mut velocity, dt);
        self.velocity = velocity;

        self.position += self.velocity * dt;
        let hits = std::mem::take(&mut self.pending_hits);
        for hit in &hits {
            if callbacks.is_collider_valid_for_collisions(hit.collider) {
                let mut report = HitStabilityReport::default();
                callbacks.process_hit_stability_report(hit, &mut report);
                callbacks.on_movement_hit(self, hit, &mut report);
            }
        }
        callbacks.after_character_update(self, dt);

        self.last_grounding = self.settled;
        if self.unground_requested {
            self.grounding = GroundingStatus::default();
            self.unground_requested = false;
        }
        callbacks.post_grounding_update(self, dt);
        self.settled = self.grounding;
    }
}

pub fn stable_ground() -> GroundingStatus {
    GroundingStatus {
        found_any_ground: true,
        is_stable_on_ground: true,
        ground_normal: Vector::y(),
    }
}

impl CharacterMotor for ScriptedMotor {
    fn position(&self) -> Vector<Real> {
        self.position
    }

    fn rotation(&self) -> Rotation<Real> {
        self.rotation
    }

    fn grounding(&self) -> GroundingStatus {
        self.grounding
    }

    fn last_grounding(&self) -> GroundingStatus {
        self.last_grounding
    }

    fn force_unground(&mut self) {
        self.unground_requested = true;
    }

    fn set_capsule_dimensions(&mut self, radius: Real, height: Real) {
        self.capsule = (radius, height);
    }

    fn character_overlap(&self) -> bool {
        self.ceiling_height
            .map(|ceiling| self.capsule.1 > ceiling)
            .unwrap_or(false)
    }

    fn raycast(
        &self,
        origin: Vector<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        filter: SurfaceFilter,
    ) -> Option<ProbeHit> {
        self.last_raycast.set(Some(RaycastRecord {
            origin,
            direction,
            max_distance,
        }));
        let (layers, tag) = self.wall_surface;
        self.wall.filter(|_| filter.accepts(layers, tag))
    }

    fn overlap_sphere(
        &self,
        _center: Vector<Real>,
        _radius: Real,
        filter: SurfaceFilter,
    ) -> Option<ColliderId> {
        let (layers, tag) = self.ladder_surface;
        self.ladder.filter(|_| filter.accepts(layers, tag))
    }
}
