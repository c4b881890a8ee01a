//! Player controller composition (input + movement controller + motor).
#![forbid(unsafe_code)]

use std::sync::Arc;

use character_collision::KinematicMotor;
use character_controller::{
    CharacterController, CharacterMotor, CharacterState, ConfigurationError, ControllerConfig,
    InputAdapter, PlanarInputAdapter, RawInput, TickEvents,
};
use log::info;
use physics_rapier::PhysicsWorld;
use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::Real;

/// Snapshot of the character after a tick.
#[derive(Clone, Copy, Debug)]
pub struct PlayerFrame {
    pub position: Vector<Real>,
    pub rotation: Rotation<Real>,
    pub velocity: Vector<Real>,
    pub state: CharacterState,
    pub grounded: bool,
    pub events: TickEvents,
}

pub struct PlayerController<A: InputAdapter> {
    input: A,
    controller: CharacterController,
    motor: KinematicMotor,
}

impl<A: InputAdapter> PlayerController<A> {
    pub fn controller(&self) -> &CharacterController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut CharacterController {
        &mut self.controller
    }

    pub fn motor(&self) -> &KinematicMotor {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut KinematicMotor {
        &mut self.motor
    }

    pub fn input(&self) -> &A {
        &self.input
    }

    /// Samples `raw` relative to `camera` (world axes when `None`) and advances one step.
    pub fn tick(
        &mut self,
        world: &PhysicsWorld,
        raw: RawInput,
        camera: Option<Rotation<Real>>,
        dt: Real,
    ) -> PlayerFrame {
        let mut frame = self.motor.frame(world);
        let sample = self.input.sample(raw, camera, frame.character_up());
        self.controller.set_inputs(&mut frame, &sample);
        self.motor.tick(world, &mut self.controller, dt);
        self.frame()
    }

    pub fn frame(&self) -> PlayerFrame {
        PlayerFrame {
            position: self.motor.position(),
            rotation: self.motor.rotation(),
            velocity: self.motor.velocity(),
            state: self.controller.current_state(),
            grounded: self.motor.grounding().is_stable_on_ground,
            events: self.controller.events(),
        }
    }
}

/// Assembles a [`PlayerController`]; config and motor are mandatory.
pub struct PlayerControllerBuilder<A: InputAdapter = PlanarInputAdapter> {
    input: A,
    config: Option<Arc<ControllerConfig>>,
    motor: Option<KinematicMotor>,
}

impl PlayerControllerBuilder<PlanarInputAdapter> {
    pub fn new() -> Self {
        Self {
            input: PlanarInputAdapter::new(),
            config: None,
            motor: None,
        }
    }
}

impl Default for PlayerControllerBuilder<PlanarInputAdapter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: InputAdapter> PlayerControllerBuilder<A> {
    pub fn input<B: InputAdapter>(self, input: B) -> PlayerControllerBuilder<B> {
        PlayerControllerBuilder {
            input,
            config: self.config,
            motor: self.motor,
        }
    }

    pub fn config(mut self, config: Arc<ControllerConfig>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn motor(mut self, motor: KinematicMotor) -> Self {
        self.motor = Some(motor);
        self
    }

    pub fn build(self, world: &PhysicsWorld) -> Result<PlayerController<A>, ConfigurationError> {
        let config = self.config.ok_or(ConfigurationError::MissingConfig)?;
        let mut motor = self.motor.ok_or(ConfigurationError::MissingMotor)?;
        let controller = CharacterController::new(config, &mut motor.frame(world))?;
        let position = motor.position();
        info!(
            "player spawned at ({:.2}, {:.2}, {:.2})",
            position.x, position.y, position.z
        );
        Ok(PlayerController {
            input: self.input,
            controller,
            motor,
        })
    }
}
