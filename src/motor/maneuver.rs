// Named, bounded-duration actuator sequences

use std::time::Duration;

use super::actuators::SteerDirection;
use crate::config::{BRAKE_INTERVAL, CREEP_DURATION, CREEP_DUTY, FAST_DUTY, MOVE_DURATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManeuverKind {
    Straight,
    /// Drive while holding the steering actuator to one side
    Turn(SteerDirection),
    Stop,
}

/// Drive duty tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutyTier {
    Fast,
    Creep,
}

impl DutyTier {
    pub fn duty(self) -> f32 {
        match self {
            DutyTier::Fast => FAST_DUTY,
            DutyTier::Creep => CREEP_DUTY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Maneuver {
    pub kind: ManeuverKind,
    pub forward: bool,
    pub duration: Duration,
    pub tier: DutyTier,
    pub turn_radius_hint: Option<f32>,
}

impl Maneuver {
    /// Full-speed run in one direction
    pub fn straight(forward: bool) -> Self {
        Self {
            kind: ManeuverKind::Straight,
            forward,
            duration: MOVE_DURATION,
            tier: DutyTier::Fast,
            turn_radius_hint: None,
        }
    }

    /// Slow run for roughly one metre
    pub fn creep(forward: bool) -> Self {
        Self {
            duration: CREEP_DURATION,
            tier: DutyTier::Creep,
            ..Self::straight(forward)
        }
    }

    /// Forward run with full steering lock to one side
    pub fn turn(steer: SteerDirection) -> Self {
        Self {
            kind: ManeuverKind::Turn(steer),
            ..Self::straight(true)
        }
    }

    /// Brake the drive motor; `duration` is the braking interval
    pub fn stop() -> Self {
        Self {
            kind: ManeuverKind::Stop,
            forward: false,
            duration: BRAKE_INTERVAL,
            tier: DutyTier::Fast,
            turn_radius_hint: None,
        }
    }

    pub fn with_duration(self, duration: Duration) -> Self {
        Self { duration, ..self }
    }

    /// Requested turn radius in metres; steering is open loop at full lock,
    /// so this is advisory only
    pub fn with_turn_radius_hint(self, radius: f32) -> Self {
        Self {
            turn_radius_hint: Some(radius),
            ..self
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ManeuverKind::Straight if self.forward => "forward",
            ManeuverKind::Straight => "backward",
            ManeuverKind::Turn(SteerDirection::Left) => "left",
            ManeuverKind::Turn(SteerDirection::Right) => "right",
            ManeuverKind::Turn(SteerDirection::Neutral) => "turn",
            ManeuverKind::Stop => "stop",
        }
    }
}
