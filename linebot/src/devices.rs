//! Capabilities the engine borrows from the robot.
//!
//! Every physical concern (motors, light sensors, bumper, display, buttons,
//! time) is reached through one of these traits so the control loop can run
//! against real hardware, the simulator or a test double alike.

mod bumper;
mod clock;
mod light;
mod motors;
mod operator;

pub use bumper::ObstacleSensor;
pub use clock::Clock;
pub use light::LightSensors;
pub use motors::{Motors, Wheel};
pub use operator::{Display, OperatorInput};

/// Everything the control loop talks to.
///
/// Implemented automatically for any type providing all capabilities; a
/// simulator world or a test rig usually implements them on a single struct
/// because sensor readings depend on what the motors did.
pub trait Platform: Motors + LightSensors + ObstacleSensor + Display + OperatorInput + Clock {}

impl<T> Platform for T where
    T: Motors + LightSensors + ObstacleSensor + Display + OperatorInput + Clock
{
}
