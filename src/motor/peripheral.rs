// Digital-output and PWM peripheral boundary
//
// The actuator layer only ever talks to this trait, so the sysfs backend and
// the in-memory simulator are interchangeable.

use std::time::Duration;

/// Logic level of a digital output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }
}

/// Error types for peripheral access
#[derive(Debug, thiserror::Error)]
pub enum PeripheralError {
    #[error("IO error on pin {pin}: {source}")]
    Io {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Pin {pin} is not available")]
    Unavailable { pin: u32 },

    #[error("Pin {pin} refused configuration: {reason}")]
    Refused { pin: u32, reason: String },
}

/// Pin-level operations provided by the board driver
pub trait Peripheral: Send {
    /// Configure a digital pin as an output
    fn configure_output(&mut self, pin: u32) -> Result<(), PeripheralError>;

    /// Drive a digital output pin
    fn write_pin(&mut self, pin: u32, level: Level) -> Result<(), PeripheralError>;

    /// Enable or disable a PWM channel
    fn pwm_enable(&mut self, pin: u32, enabled: bool) -> Result<(), PeripheralError>;

    /// Set period and duty cycle (0.0..=1.0) of a PWM channel
    fn pwm_set(&mut self, pin: u32, period: Duration, duty: f32) -> Result<(), PeripheralError>;
}
