// Shutdown handler: halt motion and leave both axes neutral
//
// Safe to call before the actuators were initialized, more than once, and
// while a maneuver is still running: its neutral writes land last.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::motor::{Peripheral, SharedActuators};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    InvalidCommand(u8),
    LinkFailure,
}

impl ShutdownReason {
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownReason::Interrupt | ShutdownReason::InvalidCommand(_) => 0,
            ShutdownReason::LinkFailure => 1,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => f.write_str("interrupt"),
            ShutdownReason::InvalidCommand(b) => write!(f, "invalid command 0x{:02X}", b),
            ShutdownReason::LinkFailure => f.write_str("link failure"),
        }
    }
}

pub struct ShutdownHandler<P: Peripheral> {
    actuators: SharedActuators<P>,
    cancel: Arc<AtomicBool>,
}

impl<P: Peripheral> Clone for ShutdownHandler<P> {
    fn clone(&self) -> Self {
        Self {
            actuators: Arc::clone(&self.actuators),
            cancel: Arc::clone(&self.cancel),
        }
    }
}

impl<P: Peripheral> ShutdownHandler<P> {
    pub fn new(actuators: SharedActuators<P>, cancel: Arc<AtomicBool>) -> Self {
        Self { actuators, cancel }
    }

    /// Flag checked by the motion task at every step boundary
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_triggered(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Stop motion and write the neutral state; errors are logged only
    pub fn trigger(&self, reason: ShutdownReason) {
        info!("Shutting down: {}", reason);
        self.cancel.store(true, Ordering::SeqCst);

        let mut act = self.actuators.lock();
        if !act.is_initialized() {
            info!("Actuators were never initialized, nothing to reset");
            return;
        }
        if let Err(e) = act.reset_drive() {
            warn!("Failed to reset drive: {}", e);
        }
        if let Err(e) = act.reset_steer() {
            warn!("Failed to reset steering: {}", e);
        }
        if let Err(e) = act.set_enabled(false) {
            warn!("Failed to lower standby: {}", e);
        }
        info!("Done - actuators neutral");
    }
}
