//! Movement state machine driven by the motor callbacks.
//!
//! All shared timers (coyote, jump buffer, dash cooldown) live in
//! [`RuntimeState`] and are advanced in one place, `update_velocity`, before a
//! single mode branch integrates the velocity for the tick.

use std::sync::Arc;

use log::{debug, info, trace};
use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::Real;

use crate::config::ControllerConfig;
use crate::error::ConfigurationError;
use crate::input::InputSample;
use crate::math::{
    clamp_magnitude, direction_tangent_to_surface, look_rotation, partial_rotation_between,
    project_on_plane, sharpness_factor, try_normalize, DIRECTION_EPS_SQ,
};
use crate::motor::{
    CharacterMotor, ColliderId, GroundingStatus, HitStabilityReport, MotorCallbacks, MovementHit,
};
use crate::probe;
use crate::state::{CharacterState, RuntimeState, TickEvents};

/// Timers within this distance of zero count as expired.
const TIMER_EPS: Real = 1.0e-5;
/// Ground speed below which the character is snapped to rest.
const REST_SPEED: Real = 1.0e-3;
/// After a jump, ladders and walls cannot be grabbed again for this long.
const REGRAB_DELAY: Real = 0.3;

pub struct CharacterController {
    config: Arc<ControllerConfig>,
    runtime: RuntimeState,
    events: TickEvents,
    time_since_jump: Real,
    ignored_colliders: Vec<ColliderId>,
}

impl CharacterController {
    /// Binds a controller to `motor`, shaping its capsule to the standing dimensions.
    pub fn new(
        config: Arc<ControllerConfig>,
        motor: &mut dyn CharacterMotor,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let up = motor.character_up();
        let forward = try_normalize(project_on_plane(motor.character_forward(), up))
            .unwrap_or_else(Vector::z);
        motor.set_capsule_dimensions(config.crouch.capsule_radius, config.crouch.standing_height);
        info!(
            "character controller bound (radius {:.2}, height {:.2}, jumps {})",
            config.crouch.capsule_radius, config.crouch.standing_height, config.jump.max_jump_count
        );
        Ok(Self {
            config,
            runtime: RuntimeState::new(forward),
            events: TickEvents::default(),
            time_since_jump: REGRAB_DELAY,
            ignored_colliders: Vec::new(),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &RuntimeState {
        &self.runtime
    }

    pub fn current_state(&self) -> CharacterState {
        self.runtime.state
    }

    pub fn events(&self) -> TickEvents {
        self.events
    }

    pub fn jumped_this_frame(&self) -> bool {
        self.runtime.jumped_this_frame
    }

    /// Feeds this tick's input. Crouching shrinks the capsule immediately; standing
    /// up is deferred until the motor confirms there is room.
    pub fn set_inputs(&mut self, motor: &mut dyn CharacterMotor, input: &InputSample) {
        let move_vector = if input.move_vector.iter().all(|c| c.is_finite()) {
            clamp_magnitude(input.move_vector, 1.0)
        } else {
            Vector::zeros()
        };
        self.runtime.move_vector = move_vector;
        if let Some(forward) = try_normalize(move_vector) {
            self.runtime.desired_forward = forward;
        }

        if input.jump_pressed {
            self.runtime.jump_requested = true;
            self.runtime.time_since_jump_requested = 0.0;
        }

        if input.dash_pressed {
            if self.runtime.dash_cooldown_armed || self.runtime.state == CharacterState::Dash {
                debug!("dash request ignored (cooldown)");
            } else {
                self.runtime.dash_requested = true;
            }
        }

        if input.crouch_toggle_pressed {
            let crouch = &self.config.crouch;
            if !self.runtime.crouching {
                self.runtime.crouching = true;
                self.runtime.stand_requested = false;
                motor.set_capsule_dimensions(crouch.capsule_radius, crouch.crouched_height);
                debug!("crouch");
            } else {
                self.runtime.stand_requested = !self.runtime.stand_requested;
            }
        }
    }

    /// Queues an impulse applied at the end of the next velocity update.
    pub fn add_velocity(&mut self, velocity: Vector<Real>) {
        if velocity.iter().all(|c| c.is_finite()) {
            self.runtime.pending_velocity += velocity;
        }
    }

    pub fn ignore_collider(&mut self, collider: ColliderId) {
        if !self.ignored_colliders.contains(&collider) {
            self.ignored_colliders.push(collider);
        }
    }

    pub fn clear_ignored_colliders(&mut self) {
        self.ignored_colliders.clear();
    }

    fn transition_to(&mut self, next: CharacterState) {
        let previous = self.runtime.state;
        if previous != next {
            self.on_state_exit(previous);
            debug!("character state {} -> {}", previous, next);
        }
        self.runtime.state = next;
        self.on_state_enter(next);
    }

    fn on_state_enter(&mut self, state: CharacterState) {
        match state {
            CharacterState::Dash => {
                self.runtime.dash_remaining = self.config.dash.duration;
                self.runtime.dash_cooldown_armed = true;
                self.runtime.dash_cooldown_elapsed = 0.0;
            }
            CharacterState::WallClimb => {
                self.runtime.wall_grab_elapsed = 0.0;
            }
            CharacterState::Default
            | CharacterState::Airborne
            | CharacterState::Ladder => {}
        }
    }

    fn on_state_exit(&mut self, state: CharacterState) {
        match state {
            CharacterState::Dash => {
                self.runtime.dash_remaining = 0.0;
            }
            CharacterState::Ladder => {
                self.runtime.ladder = None;
            }
            CharacterState::Airborne => {
                self.runtime.jump_elapsed = None;
            }
            CharacterState::Default | CharacterState::WallClimb => {}
        }
    }

    fn settle_state(&mut self, grounded: bool) {
        if grounded {
            self.transition_to(CharacterState::Default);
        } else {
            self.transition_to(CharacterState::Airborne);
        }
    }

    fn advance_dash_cooldown(&mut self, dt: Real) {
        if !self.runtime.dash_cooldown_armed {
            return;
        }
        self.runtime.dash_cooldown_elapsed += dt;
        if self.runtime.dash_cooldown_elapsed + TIMER_EPS >= self.config.dash.cooldown {
            self.runtime.dash_cooldown_armed = false;
            self.runtime.dash_cooldown_elapsed = 0.0;
            trace!("dash cooldown over");
        }
    }

    fn handle_jump(
        &mut self,
        motor: &mut dyn CharacterMotor,
        velocity: &mut Vector<Real>,
        grounded: &mut bool,
        up: Vector<Real>,
        dt: Real,
    ) {
        if !self.runtime.jump_requested {
            return;
        }
        let jump = &self.config.jump;
        if self.runtime.time_since_jump_requested > jump.jump_buffer_time + TIMER_EPS {
            self.runtime.jump_requested = false;
            self.runtime.time_since_jump_requested = 0.0;
            debug!("jump request expired");
            return;
        }

        let state = self.runtime.state;
        let supported = *grounded
            || matches!(state, CharacterState::Ladder | CharacterState::WallClimb);
        let coyote =
            self.runtime.consumed_jumps == 0 && self.runtime.time_since_grounded <= jump.coyote_time;
        let ground_jump = supported || coyote;
        let air_jump = self.runtime.consumed_jumps < jump.max_jump_count;
        if !ground_jump && !air_jump {
            self.runtime.time_since_jump_requested += dt;
            return;
        }

        motor.force_unground();
        let speed = jump.jump_speed * jump.speed_curve.sample(0.0);
        let vertical = up * velocity.dot(&up);
        *velocity += up * speed - vertical;
        *velocity += self.runtime.move_vector * jump.jump_scalable_forward_speed;

        self.runtime.consumed_jumps = if ground_jump {
            1
        } else {
            (self.runtime.consumed_jumps + 1).min(jump.max_jump_count)
        };
        let curve_phase = if jump.jump_duration > 0.0 {
            Some(0.0)
        } else {
            None
        };
        self.runtime.jumped_this_frame = true;
        self.runtime.jump_requested = false;
        self.runtime.time_since_jump_requested = 0.0;
        self.events.jumped = true;
        self.time_since_jump = 0.0;
        *grounded = false;
        debug!(
            "jump granted ({}, {} of {} used)",
            if ground_jump { "ground" } else { "air" },
            self.runtime.consumed_jumps,
            jump.max_jump_count
        );

        self.transition_to(CharacterState::Airborne);
        self.runtime.jump_elapsed = curve_phase;
    }

    fn handle_dash_request(
        &mut self,
        motor: &dyn CharacterMotor,
        velocity: Vector<Real>,
        grounded: bool,
        up: Vector<Real>,
    ) {
        if !self.runtime.dash_requested {
            return;
        }
        self.runtime.dash_requested = false;
        if self.runtime.dash_cooldown_armed || self.runtime.state == CharacterState::Dash {
            debug!("dash request ignored (cooldown)");
            return;
        }
        let dash = &self.config.dash;
        let max_jumps = self.config.jump.max_jump_count;
        if !grounded && dash.air_dash_consumes_jump {
            if self.runtime.consumed_jumps >= max_jumps {
                debug!("air dash denied, no jump charge left");
                return;
            }
            self.runtime.consumed_jumps += 1;
        }

        let direction = try_normalize(project_on_plane(self.runtime.move_vector, up))
            .or_else(|| try_normalize(project_on_plane(motor.character_forward(), up)))
            .unwrap_or(self.runtime.desired_forward);
        let planar_speed = project_on_plane(velocity, up).norm();
        self.runtime.dash_direction = direction;
        self.runtime.dash_speed =
            (planar_speed * dash.speed_multiplier).clamp(dash.min_speed, dash.max_speed);
        debug!("dash start at {:.2} m/s", self.runtime.dash_speed);
        self.transition_to(CharacterState::Dash);
    }

    fn grounded_movement(
        &mut self,
        velocity: &mut Vector<Real>,
        grounding: &GroundingStatus,
        up: Vector<Real>,
        dt: Real,
    ) {
        let loco = &self.config.locomotion;
        let normal = try_normalize(grounding.ground_normal).unwrap_or(up);

        let speed = velocity.norm();
        if speed > 0.0 {
            *velocity = match direction_tangent_to_surface(*velocity, normal, up) {
                Some(tangent) => tangent * speed,
                None => project_on_plane(*velocity, normal),
            };
        }

        let move_vector = self.runtime.move_vector;
        let input_len = move_vector.norm();
        let target = if input_len * input_len > DIRECTION_EPS_SQ {
            let input_right = move_vector.cross(&up);
            let multiplier = if self.runtime.crouching {
                self.config.crouch.speed_multiplier
            } else {
                1.0
            };
            try_normalize(normal.cross(&input_right))
                .map(|dir| dir * input_len * loco.max_stable_speed * multiplier)
                .unwrap_or_else(Vector::zeros)
        } else {
            Vector::zeros()
        };

        let blend = sharpness_factor(loco.stable_movement_sharpness, dt);
        *velocity = velocity.lerp(&target, blend);

        if target.norm_squared() <= DIRECTION_EPS_SQ {
            let speed = velocity.norm();
            let slowed = (speed - loco.ground_friction * dt).max(0.0);
            if slowed <= REST_SPEED {
                *velocity = Vector::zeros();
            } else {
                *velocity *= slowed / speed;
            }
        }
    }

    fn airborne_movement(
        &mut self,
        velocity: &mut Vector<Real>,
        grounding: &GroundingStatus,
        up: Vector<Real>,
        dt: Real,
    ) {
        let loco = &self.config.locomotion;
        let move_vector = self.runtime.move_vector;
        if move_vector.norm_squared() > 0.0 {
            let mut added = move_vector * loco.air_acceleration * dt;
            let planar = project_on_plane(*velocity, up);
            if planar.norm() < loco.max_air_speed {
                let total = clamp_magnitude(planar + added, loco.max_air_speed);
                added = total - planar;
            } else if planar.dot(&added) > 0.0 {
                added = project_on_plane(added, planar);
            }

            // Do not let air control climb a slope that is too steep to stand on.
            if grounding.found_any_ground
                && !grounding.is_stable_on_ground
                && (*velocity + added).dot(&added) > 0.0
            {
                let obstruction = up.cross(&grounding.ground_normal).cross(&up);
                if let Some(obstruction) = try_normalize(obstruction) {
                    added = project_on_plane(added, obstruction);
                }
            }
            *velocity += added;
        }

        *velocity += loco.gravity() * dt;
        *velocity *= 1.0 / (1.0 + loco.air_drag * dt);

        if let Some(elapsed) = self.runtime.jump_elapsed {
            let jump = &self.config.jump;
            if jump.jump_duration > 0.0 && elapsed < jump.jump_duration {
                let speed = jump.jump_speed * jump.speed_curve.sample(elapsed / jump.jump_duration);
                *velocity += up * (speed - velocity.dot(&up));
                self.runtime.jump_elapsed = Some(elapsed + dt);
            } else {
                self.runtime.jump_elapsed = None;
            }
        }
    }

    fn dash_movement(
        &mut self,
        velocity: &mut Vector<Real>,
        grounded: bool,
        up: Vector<Real>,
        dt: Real,
    ) {
        if self.runtime.dash_remaining > TIMER_EPS {
            let dash = &self.config.dash;
            let planar = project_on_plane(*velocity, up);
            let vertical = *velocity - planar;
            let target = self.runtime.dash_direction * self.runtime.dash_speed;
            let planar = planar.lerp(&target, sharpness_factor(dash.decay, dt));
            let gravity = self.config.locomotion.gravity() * dash.gravity_scale;
            *velocity = planar + vertical + gravity * dt;
            self.runtime.dash_remaining = (self.runtime.dash_remaining - dt).max(0.0);
        }
        if self.runtime.dash_remaining <= TIMER_EPS {
            debug!("dash finished");
            self.settle_state(grounded);
        }
    }

    fn ladder_movement(
        &mut self,
        motor: &mut dyn CharacterMotor,
        velocity: &mut Vector<Real>,
        grounded: bool,
        up: Vector<Real>,
    ) {
        let Some(ladder) = probe::detect_ladder(&self.config.ladder, &*motor) else {
            debug!("ladder lost");
            self.settle_state(grounded);
            return;
        };
        let climb =
            self.runtime.move_vector.dot(&motor.character_forward()) * self.config.ladder.climb_speed;
        if grounded && climb < 0.0 {
            self.transition_to(CharacterState::Default);
            *velocity = Vector::zeros();
            return;
        }
        if grounded && climb > 0.0 {
            motor.force_unground();
        }
        self.runtime.ladder = Some(ladder);
        *velocity = up * climb;
    }

    fn wall_climb_movement(
        &mut self,
        motor: &dyn CharacterMotor,
        velocity: &mut Vector<Real>,
        up: Vector<Real>,
        dt: Real,
    ) {
        let wall = &self.config.wall_climb;
        self.runtime.wall_grab_elapsed += dt;
        let gravity = self.config.locomotion.gravity() * wall.gravity_scale;
        *velocity = -up * wall.slide_speed + gravity * dt;

        if self.runtime.wall_grab_elapsed > wall.max_grab_duration {
            debug!("wall grab expired");
            self.transition_to(CharacterState::Airborne);
        } else if !probe::is_still_facing_climbable_wall(wall, motor, self.runtime.last_wall_normal)
        {
            debug!("wall lost");
            self.transition_to(CharacterState::Airborne);
        }
    }

    fn try_enter_ladder(&mut self, motor: &dyn CharacterMotor) {
        if self.runtime.jumped_this_frame || self.time_since_jump < REGRAB_DELAY {
            return;
        }
        if self.runtime.move_vector.dot(&motor.character_forward()) <= 0.0 {
            return;
        }
        if let Some(ladder) = probe::detect_ladder(&self.config.ladder, motor) {
            self.runtime.ladder = Some(ladder);
            self.transition_to(CharacterState::Ladder);
        }
    }

    fn try_stand_up(&mut self, motor: &mut dyn CharacterMotor) {
        let crouch = &self.config.crouch;
        motor.set_capsule_dimensions(crouch.capsule_radius, crouch.standing_height);
        if motor.character_overlap() {
            motor.set_capsule_dimensions(crouch.capsule_radius, crouch.crouched_height);
            debug!("stand blocked, staying crouched");
        } else {
            self.runtime.crouching = false;
            self.runtime.stand_requested = false;
            debug!("stand");
        }
    }
}

impl MotorCallbacks for CharacterController {
    fn before_character_update(&mut self, _motor: &mut dyn CharacterMotor, dt: Real) {
        self.events = TickEvents::default();
        self.time_since_jump += dt.max(0.0);
    }

    fn update_rotation(
        &mut self,
        _motor: &mut dyn CharacterMotor,
        rotation: &mut Rotation<Real>,
        dt: Real,
    ) {
        let loco = &self.config.locomotion;
        let up = *rotation * Vector::y();
        let current_forward = *rotation * Vector::z();
        let target = match self.runtime.state {
            CharacterState::Dash => self.runtime.dash_direction,
            CharacterState::WallClimb => -self.runtime.last_wall_normal,
            _ => self.runtime.desired_forward,
        };

        let mut next = *rotation;
        if let Some(target) = try_normalize(project_on_plane(target, up)) {
            let blend = sharpness_factor(loco.orientation_sharpness, dt);
            let smoothed = partial_rotation_between(current_forward, target, blend, up)
                * current_forward;
            if let Some(look) = look_rotation(smoothed, up) {
                next = look;
            }
        }

        let world_up = loco.world_up();
        let current_up = next * Vector::y();
        let blend = sharpness_factor(loco.up_sharpness(), dt);
        let tilt = partial_rotation_between(current_up, world_up, blend, next * Vector::x());
        next = tilt * next;
        next.renormalize();
        *rotation = next;
    }

    fn update_velocity(
        &mut self,
        motor: &mut dyn CharacterMotor,
        velocity: &mut Vector<Real>,
        dt: Real,
    ) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.runtime.jumped_this_frame = false;
        let grounding = motor.grounding();
        let mut grounded = grounding.is_stable_on_ground;
        let up = motor.character_up();

        if grounded {
            self.runtime.time_since_grounded = 0.0;
            self.runtime.consumed_jumps = 0;
            match self.runtime.state {
                CharacterState::Airborne | CharacterState::WallClimb => {
                    self.transition_to(CharacterState::Default)
                }
                _ => {}
            }
        } else {
            self.runtime.time_since_grounded += dt;
            if self.runtime.state == CharacterState::Default {
                self.transition_to(CharacterState::Airborne);
            }
            // Falling past the coyote window forfeits the ground jump.
            if self.runtime.consumed_jumps == 0
                && self.runtime.time_since_grounded > self.config.jump.coyote_time
            {
                self.runtime.consumed_jumps = 1;
                trace!("coyote window closed");
            }
        }
        self.advance_dash_cooldown(dt);

        self.handle_jump(motor, velocity, &mut grounded, up, dt);
        self.handle_dash_request(motor, *velocity, grounded, up);

        match self.runtime.state {
            CharacterState::Default | CharacterState::Airborne => {
                if grounded {
                    self.grounded_movement(velocity, &grounding, up, dt);
                } else {
                    self.airborne_movement(velocity, &grounding, up, dt);
                }
                self.try_enter_ladder(motor);
            }
            CharacterState::Dash => self.dash_movement(velocity, grounded, up, dt),
            CharacterState::Ladder => self.ladder_movement(motor, velocity, grounded, up),
            CharacterState::WallClimb => self.wall_climb_movement(motor, velocity, up, dt),
        }

        let pending = std::mem::replace(&mut self.runtime.pending_velocity, Vector::zeros());
        if pending.norm_squared() > 0.0 {
            if pending.dot(&up) > 0.0 {
                motor.force_unground();
            }
            *velocity += pending;
        }

        trace!(
            "tick state={} grounded={} v=({:.3},{:.3},{:.3}) coyote={:.3} buffer={:.3} dash={:.3}",
            self.runtime.state,
            grounded,
            velocity.x,
            velocity.y,
            velocity.z,
            self.runtime.time_since_grounded,
            self.runtime.time_since_jump_requested,
            self.runtime.dash_remaining
        );
    }

    fn after_character_update(&mut self, motor: &mut dyn CharacterMotor, _dt: Real) {
        if self.runtime.crouching && self.runtime.stand_requested {
            self.try_stand_up(motor);
        }
    }

    fn post_grounding_update(&mut self, motor: &mut dyn CharacterMotor, _dt: Real) {
        let now = motor.grounding().is_stable_on_ground;
        let before = motor.last_grounding().is_stable_on_ground;
        if now && !before {
            self.events.landed = true;
            self.runtime.consumed_jumps = 0;
            if self.runtime.state == CharacterState::Airborne {
                self.transition_to(CharacterState::Default);
            }
        } else if !now && before {
            self.events.left_ground = true;
            if self.runtime.state == CharacterState::Default {
                self.transition_to(CharacterState::Airborne);
            }
        }
    }

    fn is_collider_valid_for_collisions(&self, collider: ColliderId) -> bool {
        !self.ignored_colliders.contains(&collider)
    }

    fn on_movement_hit(
        &mut self,
        motor: &mut dyn CharacterMotor,
        hit: &MovementHit,
        _report: &mut HitStabilityReport,
    ) {
        let wall = &self.config.wall_climb;
        let up = motor.character_up();
        if !probe::is_climbable_wall_normal(wall, hit.normal, up) {
            return;
        }
        match self.runtime.state {
            CharacterState::Airborne if self.time_since_jump >= REGRAB_DELAY => {
                if probe::is_still_facing_climbable_wall(wall, motor, hit.normal) {
                    self.runtime.last_wall_normal = hit.normal;
                    self.transition_to(CharacterState::WallClimb);
                }
            }
            CharacterState::WallClimb => {
                self.runtime.last_wall_normal = hit.normal;
            }
            _ => {}
        }
    }

    fn on_discrete_collision_detected(&mut self, collider: ColliderId) {
        trace!("discrete overlap with collider {:?}", collider);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::ProbeHit;
    use crate::testing::ScriptedMotor;
    use rapier3d::math::Point;

    const DT: Real = 1.0 / 60.0;

    fn bind(config: ControllerConfig, motor: &mut ScriptedMotor) -> CharacterController {
        CharacterController::new(Arc::new(config), motor).expect("valid config")
    }

    fn forward() -> InputSample {
        InputSample {
            move_vector: Vector::z(),
            ..Default::default()
        }
    }

    fn jump() -> InputSample {
        InputSample {
            jump_pressed: true,
            ..Default::default()
        }
    }

    fn dash() -> InputSample {
        InputSample {
            dash_pressed: true,
            ..Default::default()
        }
    }

    fn crouch() -> InputSample {
        InputSample {
            crouch_toggle_pressed: true,
            ..Default::default()
        }
    }

    fn step(controller: &mut CharacterController, motor: &mut ScriptedMotor, input: InputSample) {
        controller.set_inputs(motor, &input);
        motor.tick(controller, DT);
    }

    fn idle(controller: &mut CharacterController, motor: &mut ScriptedMotor, ticks: usize) {
        for _ in 0..ticks {
            step(controller, motor, InputSample::default());
        }
    }

    fn wall_hit() -> MovementHit {
        MovementHit {
            collider: ColliderId(11),
            normal: -Vector::z(),
            point: Point::new(0.0, 1.0, 0.5),
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let mut motor = ScriptedMotor::grounded();
        let mut config = ControllerConfig::default();
        config.jump.max_jump_count = 0;
        let result = CharacterController::new(Arc::new(config), &mut motor);
        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    #[test]
    fn binding_sets_standing_capsule() {
        let mut motor = ScriptedMotor::grounded();
        motor.capsule = (0.1, 0.1);
        let controller = bind(ControllerConfig::default(), &mut motor);
        assert_eq!(motor.capsule, (0.5, 2.0));
        assert_eq!(controller.current_state(), CharacterState::Default);
    }

    #[test]
    fn ground_speed_converges_to_max() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        for _ in 0..120 {
            step(&mut controller, &mut motor, forward());
        }
        assert!((motor.planar_speed() - 10.0).abs() < 0.1);
        assert!(motor.velocity.z > 0.0);
        assert_eq!(controller.current_state(), CharacterState::Default);
    }

    #[test]
    fn releasing_input_comes_to_rest() {
        let mut motor = ScriptedMotor::grounded();
        motor.velocity = Vector::new(5.0, 0.0, 0.0);
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        let mut last = motor.planar_speed();
        for _ in 0..300 {
            idle(&mut controller, &mut motor, 1);
            let speed = motor.planar_speed();
            assert!(speed < last || speed == 0.0, "speed {} after {}", speed, last);
            last = speed;
        }
        assert_eq!(motor.velocity, Vector::zeros());
    }

    #[test]
    fn crouching_halves_ground_speed() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, crouch());
        assert!(controller.state().crouching);
        for _ in 0..120 {
            step(&mut controller, &mut motor, forward());
        }
        assert!((motor.planar_speed() - 5.0).abs() < 0.05);
    }

    #[test]
    fn air_control_respects_speed_cap() {
        let mut config = ControllerConfig::default();
        config.locomotion.max_air_speed = 8.0;
        config.locomotion.air_acceleration = 20.0;
        let mut motor = ScriptedMotor::airborne();
        let mut controller = bind(config, &mut motor);
        for _ in 0..300 {
            step(&mut controller, &mut motor, forward());
            assert!(motor.planar_speed() <= 8.0 + 1.0e-3);
        }
        assert!(motor.planar_speed() >= 7.9);
        assert_eq!(controller.current_state(), CharacterState::Airborne);
    }

    #[test]
    fn falling_accelerates_downward() {
        let mut motor = ScriptedMotor::airborne();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        idle(&mut controller, &mut motor, 30);
        assert!(motor.velocity.y < -10.0);
    }

    #[test]
    fn ground_jump_then_air_jump_then_denied() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);

        step(&mut controller, &mut motor, jump());
        assert!(controller.events().jumped);
        assert!(controller.jumped_this_frame());
        assert_eq!(controller.state().consumed_jumps, 1);
        assert_eq!(controller.current_state(), CharacterState::Airborne);
        assert!((motor.velocity.y - 10.0).abs() < 1.0e-4);
        assert!(!motor.grounding.is_stable_on_ground);

        idle(&mut controller, &mut motor, 20);
        step(&mut controller, &mut motor, jump());
        assert!(controller.events().jumped);
        assert_eq!(controller.state().consumed_jumps, 2);
        assert!((motor.velocity.y - 10.0).abs() < 1.0e-4);

        idle(&mut controller, &mut motor, 5);
        step(&mut controller, &mut motor, jump());
        assert!(!controller.events().jumped);
        assert_eq!(controller.state().consumed_jumps, 2);
    }

    #[test]
    fn jump_curve_holds_vertical_speed_for_duration() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, jump());
        idle(&mut controller, &mut motor, 3);
        assert!((motor.velocity.y - 10.0).abs() < 1.0e-4);
        idle(&mut controller, &mut motor, 10);
        assert!(motor.velocity.y < 10.0);
        assert_eq!(controller.state().jump_elapsed, None);
    }

    #[test]
    fn impulse_jump_without_curve() {
        let mut config = ControllerConfig::default();
        config.jump.jump_duration = 0.0;
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(config, &mut motor);
        step(&mut controller, &mut motor, jump());
        assert!(motor.velocity.y < 10.0);
        assert!(motor.velocity.y > 9.0);
    }

    #[test]
    fn coyote_jump_after_walking_off_ledge() {
        let mut config = ControllerConfig::default();
        config.jump.max_jump_count = 1;
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(config, &mut motor);
        idle(&mut controller, &mut motor, 1);

        motor.set_grounded(false);
        idle(&mut controller, &mut motor, 1);
        assert!(controller.events().left_ground);
        idle(&mut controller, &mut motor, 2);
        assert_eq!(controller.current_state(), CharacterState::Airborne);

        step(&mut controller, &mut motor, jump());
        assert!(controller.events().jumped);
        assert_eq!(controller.state().consumed_jumps, 1);
    }

    #[test]
    fn no_ground_jump_after_coyote_window() {
        let mut config = ControllerConfig::default();
        config.jump.max_jump_count = 1;
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(config, &mut motor);
        idle(&mut controller, &mut motor, 1);

        motor.set_grounded(false);
        idle(&mut controller, &mut motor, 10);
        step(&mut controller, &mut motor, jump());
        assert!(!controller.events().jumped);
    }

    #[test]
    fn buffered_jump_fires_on_landing() {
        let mut config = ControllerConfig::default();
        config.jump.max_jump_count = 1;
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(config, &mut motor);
        step(&mut controller, &mut motor, jump());
        idle(&mut controller, &mut motor, 20);

        step(&mut controller, &mut motor, jump());
        assert!(!controller.events().jumped);
        idle(&mut controller, &mut motor, 2);
        assert!(controller.state().jump_requested);

        motor.set_grounded(true);
        idle(&mut controller, &mut motor, 1);
        assert!(controller.events().jumped);
        assert_eq!(controller.state().consumed_jumps, 1);
        assert!(!controller.state().jump_requested);
    }

    #[test]
    fn stale_jump_request_is_dropped() {
        let mut config = ControllerConfig::default();
        config.jump.max_jump_count = 1;
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(config, &mut motor);
        step(&mut controller, &mut motor, jump());
        idle(&mut controller, &mut motor, 20);

        step(&mut controller, &mut motor, jump());
        idle(&mut controller, &mut motor, 10);
        assert!(!controller.state().jump_requested);

        motor.set_grounded(true);
        for _ in 0..5 {
            idle(&mut controller, &mut motor, 1);
            assert!(!controller.events().jumped);
        }
        assert_eq!(controller.current_state(), CharacterState::Default);
    }

    #[test]
    fn landing_resets_jumps_and_reports_event() {
        let mut motor = ScriptedMotor::airborne();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        idle(&mut controller, &mut motor, 20);
        assert_eq!(controller.current_state(), CharacterState::Airborne);

        motor.set_grounded(true);
        idle(&mut controller, &mut motor, 1);
        assert!(controller.events().landed);
        assert_eq!(controller.state().consumed_jumps, 0);
        assert_eq!(controller.current_state(), CharacterState::Default);
    }

    #[test]
    fn dash_lasts_exactly_its_duration() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, dash());
        assert_eq!(controller.current_state(), CharacterState::Dash);
        assert!(controller.state().on_dash_cooldown());

        idle(&mut controller, &mut motor, 13);
        assert_eq!(controller.current_state(), CharacterState::Dash);
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::Default);
        assert_eq!(controller.state().dash_remaining, 0.0);
    }

    #[test]
    fn dash_without_input_follows_facing() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        idle(&mut controller, &mut motor, 1);
        step(&mut controller, &mut motor, dash());
        assert!((controller.state().dash_direction - Vector::z()).norm() < 1.0e-4);
        assert!((controller.state().dash_speed - 15.0).abs() < 1.0e-4);
        idle(&mut controller, &mut motor, 5);
        assert!(motor.velocity.z > 5.0);
        assert!(motor.velocity.x.abs() < 1.0e-3);
    }

    #[test]
    fn dash_is_ignored_during_cooldown() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, dash());
        idle(&mut controller, &mut motor, 20);
        assert_eq!(controller.current_state(), CharacterState::Default);

        step(&mut controller, &mut motor, dash());
        assert_eq!(controller.current_state(), CharacterState::Default);

        idle(&mut controller, &mut motor, 50);
        assert!(!controller.state().on_dash_cooldown());
        step(&mut controller, &mut motor, dash());
        assert_eq!(controller.current_state(), CharacterState::Dash);
    }

    #[test]
    fn air_dash_needs_a_jump_charge() {
        let mut config = ControllerConfig::default();
        config.jump.max_jump_count = 1;
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(config, &mut motor);
        step(&mut controller, &mut motor, jump());
        idle(&mut controller, &mut motor, 2);
        step(&mut controller, &mut motor, dash());
        assert_eq!(controller.current_state(), CharacterState::Airborne);
        assert!(!controller.state().on_dash_cooldown());
    }

    #[test]
    fn jump_interrupts_dash() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, dash());
        idle(&mut controller, &mut motor, 3);
        step(&mut controller, &mut motor, jump());
        assert_eq!(controller.current_state(), CharacterState::Airborne);
        assert_eq!(controller.state().dash_remaining, 0.0);
        assert!(controller.events().jumped);
    }

    #[test]
    fn ladder_climb_ignores_gravity() {
        let mut motor = ScriptedMotor::grounded();
        motor.ladder = Some(ColliderId(3));
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, forward());
        assert_eq!(controller.current_state(), CharacterState::Ladder);
        assert_eq!(controller.state().ladder, Some(ColliderId(3)));

        for _ in 0..30 {
            step(&mut controller, &mut motor, forward());
            assert!((motor.velocity - Vector::new(0.0, 4.0, 0.0)).norm() < 1.0e-4);
        }

        idle(&mut controller, &mut motor, 5);
        assert_eq!(motor.velocity, Vector::zeros());
        assert_eq!(controller.current_state(), CharacterState::Ladder);

        motor.ladder = None;
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::Airborne);
        assert_eq!(controller.state().ladder, None);
    }

    #[test]
    fn untagged_volume_is_not_a_ladder() {
        let mut motor = ScriptedMotor::grounded();
        motor.ladder = Some(ColliderId(3));
        motor.ladder_surface = (1, None);
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, forward());
        assert_eq!(controller.current_state(), CharacterState::Default);
    }

    #[test]
    fn climbing_down_onto_ground_leaves_ladder() {
        let mut motor = ScriptedMotor::grounded();
        motor.ladder = Some(ColliderId(3));
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, forward());
        assert_eq!(controller.current_state(), CharacterState::Ladder);

        let down = InputSample {
            move_vector: -Vector::z(),
            ..Default::default()
        };
        step(&mut controller, &mut motor, down);
        assert_eq!(controller.current_state(), CharacterState::Default);
    }

    #[test]
    fn jump_from_ladder_detaches() {
        let mut motor = ScriptedMotor::grounded();
        motor.ladder = Some(ColliderId(3));
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, forward());
        step(&mut controller, &mut motor, forward());
        assert_eq!(controller.current_state(), CharacterState::Ladder);

        step(&mut controller, &mut motor, jump());
        assert!(controller.events().jumped);
        assert_eq!(controller.current_state(), CharacterState::Airborne);
        assert_eq!(controller.state().ladder, None);

        // Still touching the ladder, but the regrab delay keeps us off it.
        step(&mut controller, &mut motor, forward());
        assert_eq!(controller.current_state(), CharacterState::Airborne);
    }

    #[test]
    fn wall_hit_while_airborne_starts_wall_climb() {
        let mut motor = ScriptedMotor::airborne();
        motor.wall = Some(ProbeHit {
            collider: ColliderId(11),
            normal: -Vector::z(),
        });
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        idle(&mut controller, &mut motor, 1);
        motor.pending_hits.push(wall_hit());
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::WallClimb);
        assert_eq!(controller.state().last_wall_normal, -Vector::z());

        idle(&mut controller, &mut motor, 1);
        assert!(motor.velocity.x.abs() < 1.0e-6 && motor.velocity.z.abs() < 1.0e-6);
        assert!(motor.velocity.y < -1.0 && motor.velocity.y > -1.1);

        idle(&mut controller, &mut motor, 125);
        assert_eq!(controller.current_state(), CharacterState::Airborne);
    }

    #[test]
    fn wall_climb_faces_the_wall() {
        let mut motor = ScriptedMotor::airborne();
        motor.rotation = Rotation::from_axis_angle(&Vector::y_axis(), std::f32::consts::FRAC_PI_2);
        motor.wall = Some(ProbeHit {
            collider: ColliderId(11),
            normal: -Vector::z(),
        });
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        idle(&mut controller, &mut motor, 1);
        motor.pending_hits.push(wall_hit());
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::WallClimb);

        idle(&mut controller, &mut motor, 60);
        assert_eq!(controller.current_state(), CharacterState::WallClimb);
        let facing = motor.rotation * Vector::z();
        assert!(facing.dot(&Vector::z()) > 0.9, "facing {:?}", facing);
    }

    #[test]
    fn wall_climb_ends_when_wall_is_gone() {
        let mut motor = ScriptedMotor::airborne();
        motor.wall = Some(ProbeHit {
            collider: ColliderId(11),
            normal: -Vector::z(),
        });
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        motor.pending_hits.push(wall_hit());
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::WallClimb);

        motor.wall = None;
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::Airborne);
    }

    #[test]
    fn floor_hits_do_not_start_wall_climb() {
        let mut motor = ScriptedMotor::airborne();
        motor.wall = Some(ProbeHit {
            collider: ColliderId(2),
            normal: Vector::y(),
        });
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        motor.pending_hits.push(MovementHit {
            collider: ColliderId(2),
            normal: Vector::y(),
            point: Point::origin(),
        });
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::Airborne);
    }

    #[test]
    fn ignored_colliders_produce_no_hits() {
        let mut motor = ScriptedMotor::airborne();
        motor.wall = Some(ProbeHit {
            collider: ColliderId(11),
            normal: -Vector::z(),
        });
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        controller.ignore_collider(ColliderId(11));
        assert!(!controller.is_collider_valid_for_collisions(ColliderId(11)));
        motor.pending_hits.push(wall_hit());
        idle(&mut controller, &mut motor, 1);
        assert_eq!(controller.current_state(), CharacterState::Airborne);

        controller.clear_ignored_colliders();
        assert!(controller.is_collider_valid_for_collisions(ColliderId(11)));
    }

    #[test]
    fn stand_up_waits_for_headroom() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        step(&mut controller, &mut motor, crouch());
        assert_eq!(motor.capsule, (0.5, 1.0));

        motor.ceiling_height = Some(1.5);
        step(&mut controller, &mut motor, crouch());
        assert!(controller.state().crouching);
        assert_eq!(motor.capsule, (0.5, 1.0));
        idle(&mut controller, &mut motor, 3);
        assert!(controller.state().crouching);

        motor.ceiling_height = None;
        idle(&mut controller, &mut motor, 1);
        assert!(!controller.state().crouching);
        assert_eq!(motor.capsule, (0.5, 2.0));
    }

    #[test]
    fn zero_orientation_sharpness_keeps_facing() {
        let mut config = ControllerConfig::default();
        config.locomotion.orientation_sharpness = 0.0;
        config.locomotion.bonus_orientation_sharpness = 0.0;
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(config, &mut motor);
        let sideways = InputSample {
            move_vector: Vector::x(),
            ..Default::default()
        };
        for _ in 0..30 {
            step(&mut controller, &mut motor, sideways);
        }
        let facing = motor.rotation * Vector::z();
        assert!((facing - Vector::z()).norm() < 1.0e-4);
        assert!(facing.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn turns_toward_move_input() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        let sideways = InputSample {
            move_vector: Vector::x(),
            ..Default::default()
        };
        for _ in 0..60 {
            step(&mut controller, &mut motor, sideways);
        }
        let facing = motor.rotation * Vector::z();
        assert!(facing.dot(&Vector::x()) > 0.99);
        assert!(((motor.rotation * Vector::y()) - Vector::y()).norm() < 1.0e-3);
    }

    #[test]
    fn tilted_character_realigns_with_world_up() {
        let mut motor = ScriptedMotor::grounded();
        motor.rotation = Rotation::from_axis_angle(&Vector::x_axis(), 0.8);
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        assert!((motor.rotation * Vector::y()).dot(&Vector::y()) < 0.8);
        idle(&mut controller, &mut motor, 120);
        let up = motor.rotation * Vector::y();
        assert!(up.dot(&Vector::y()) > 0.999, "up {:?}", up);
    }

    #[test]
    fn upward_impulse_ungrounds() {
        let mut motor = ScriptedMotor::grounded();
        let mut controller = bind(ControllerConfig::default(), &mut motor);
        controller.add_velocity(Vector::new(0.0, 5.0, 0.0));
        idle(&mut controller, &mut motor, 1);
        assert!((motor.velocity.y - 5.0).abs() < 1.0e-5);
        assert!(!motor.grounding.is_stable_on_ground);
        assert_eq!(controller.state().pending_velocity, Vector::zeros());
    }
}
