//! Kinematic character movement controller: input sampling, movement modes and
//! the callback contract with the collision motor that owns the pose.
#![forbid(unsafe_code)]

pub mod config;
mod controller;
mod error;
pub mod input;
pub mod math;
pub mod motor;
pub mod probe;
mod state;

#[cfg(test)]
mod testing;

pub use config::{
    ControllerConfig, CrouchConfig, DashConfig, JumpConfig, JumpCurve, LadderConfig,
    LocomotionConfig, SurfaceFilter, WallClimbConfig, ALL_LAYERS, LADDER_TAG,
};
pub use controller::CharacterController;
pub use error::ConfigurationError;
pub use input::{InputAdapter, InputSample, PlanarInputAdapter, RawInput};
pub use motor::{
    CharacterMotor, ColliderId, GroundingStatus, HitStabilityReport, MotorCallbacks, MovementHit,
    ProbeHit,
};
pub use state::{CharacterState, RuntimeState, TickEvents};
