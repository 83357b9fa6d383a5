// Serial settings, timing constants, duty tiers and pin wiring
use std::time::Duration;

use serde::Serialize;

// Serial command channel (9600-8N1, no flow control)
pub const SERIAL_PORT: &str = "/dev/ttyMFD1";
pub const BAUD_RATE: u32 = 9600;

// Sent once on startup so the remote side knows we are listening
pub const READY_MESSAGE: &str = "I'm waiting for data!";

// Dispatcher waits this long for a command byte before polling telemetry
pub const DISPATCH_POLL: Duration = Duration::from_millis(100);

// AT-command sub-protocol
pub const AT_ESCAPE: &str = "+++";
pub const AT_QUERY_RSSI: &str = "ATDB\r";
pub const AT_EXIT: &str = "ATCN\r";
pub const AT_OK: &str = "OK";
pub const FRAME_TERMINATOR: u8 = 13;
pub const FRAME_MAX_LEN: usize = 32;
pub const FRAME_IDLE_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DRAIN_POLL: Duration = Duration::from_millis(100);

// Link is reported degraded after this many polls in a row without a reading
pub const DEGRADED_AFTER: u32 = 3;

// Maneuver timing
pub const MOVE_DURATION: Duration = Duration::from_millis(800);
pub const CREEP_DURATION: Duration = Duration::from_millis(3600);
pub const BRAKE_INTERVAL: Duration = Duration::from_millis(500);

// PWM period used for both H-bridges
pub const PWM_PERIOD: Duration = Duration::from_millis(1);

// Duty tiers
pub const FAST_DUTY: f32 = 0.4;
pub const CREEP_DUTY: f32 = 0.2;
pub const STEER_DUTY: f32 = 1.0;

// At most this many maneuvers wait behind the one being executed
pub const MOTION_QUEUE_CAPACITY: usize = 2;

/// How the drive motor is brought to rest at the end of a stop maneuver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum BrakeMode {
    /// Assert forward and backward together (short brake)
    Active,
    /// Release both direction pins and let the vehicle roll out
    Coast,
}

/// Pin assignment for the two H-bridges and the shared standby line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Wiring {
    pub drive_pwm: u32,
    pub steer_pwm: u32,
    pub standby: u32,
    pub backward: u32,
    pub forward: u32,
    pub right: u32,
    pub left: u32,
    pub brake: BrakeMode,
}

impl Default for Wiring {
    fn default() -> Self {
        Self {
            drive_pwm: 0,
            steer_pwm: 14,
            standby: 15,
            backward: 45,
            forward: 46,
            right: 47,
            left: 48,
            brake: BrakeMode::Active,
        }
    }
}

impl Wiring {
    pub fn with_brake(self, brake: BrakeMode) -> Self {
        Self { brake, ..self }
    }

    /// Direction pins in the order they are configured at startup
    pub fn direction_pins(&self) -> [u32; 4] {
        [self.forward, self.backward, self.left, self.right]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_wiring_has_distinct_pins() {
        let w = Wiring::default();
        let mut pins = vec![w.standby];
        pins.extend(w.direction_pins());
        pins.sort_unstable();
        pins.dedup();
        assert_eq!(pins.len(), 5);
    }

    #[test]
    fn test_wiring_serializes_brake_mode() {
        let json = serde_json::to_string(&Wiring::default().with_brake(BrakeMode::Coast)).unwrap();
        assert!(json.contains("\"brake\":\"coast\""));
    }

    #[test]
    fn test_duty_tiers_ordered() {
        assert!(CREEP_DUTY < FAST_DUTY);
        assert!(FAST_DUTY <= STEER_DUTY);
    }
}
