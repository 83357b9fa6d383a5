// Command codes received over the serial link

use std::fmt;

use crate::motor::Maneuver;

/// One command byte, decoded.
///
/// The link carries ASCII digits; anything outside `'0'..='5'` is `Invalid`
/// and keeps the raw byte for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    NoOp,
    Forward,
    Backward,
    Left,
    Right,
    Stop,
    Invalid(u8),
}

impl CommandCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' => Self::NoOp,
            b'1' => Self::Forward,
            b'2' => Self::Backward,
            b'3' => Self::Left,
            b'4' => Self::Right,
            b'5' => Self::Stop,
            other => Self::Invalid(other),
        }
    }

    /// Wire representation, used by the teleop demo
    pub fn as_byte(self) -> u8 {
        match self {
            Self::NoOp => b'0',
            Self::Forward => b'1',
            Self::Backward => b'2',
            Self::Left => b'3',
            Self::Right => b'4',
            Self::Stop => b'5',
            Self::Invalid(b) => b,
        }
    }

    /// The maneuver this command schedules, if any
    pub fn maneuver(self) -> Option<Maneuver> {
        use crate::motor::SteerDirection;
        match self {
            Self::Forward => Some(Maneuver::straight(true)),
            Self::Backward => Some(Maneuver::straight(false)),
            Self::Left => Some(Maneuver::turn(SteerDirection::Left)),
            Self::Right => Some(Maneuver::turn(SteerDirection::Right)),
            Self::Stop => Some(Maneuver::stop()),
            Self::NoOp | Self::Invalid(_) => None,
        }
    }
}

impl From<u8> for CommandCode {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => f.write_str("no-op"),
            Self::Forward => f.write_str("forward"),
            Self::Backward => f.write_str("backward"),
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Stop => f.write_str("stop"),
            Self::Invalid(b) => write!(f, "invalid (0x{:02X})", b),
        }
    }
}
