// Motor control module for the two-actuator rover
//
// Provides:
// - Peripheral boundary (sysfs backend and in-memory simulator)
// - Actuator layer for the drive and steering H-bridges
// - Maneuvers and the motion controller that executes them

pub mod actuators;
pub mod controller;
pub mod maneuver;
pub mod peripheral;
pub mod sim;
pub mod sysfs;

pub use actuators::{
    ActuatorAuthority, ActuatorError, ActuatorState, Actuators, DriveDirection, SharedActuators,
    SteerDirection,
};
pub use controller::{MotionController, MotionPhase, MotionQueue, SubmitError, motion_queue};
pub use maneuver::{DutyTier, Maneuver, ManeuverKind};
pub use peripheral::{Level, Peripheral, PeripheralError};
pub use sim::{PinCall, SimPeripheral};
pub use sysfs::SysfsPeripheral;
