// Motion controller: executes one maneuver at a time from a bounded queue
//
// Commands are handed over through a small mpsc channel and consumed by a
// single motion task, so at most one maneuver owns the actuators at a time.
// A cancel flag is checked at every step boundary; actuator release happens
// when the ActuatorAuthority is dropped, on every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::actuators::{ActuatorAuthority, ActuatorError, DriveDirection, SharedActuators};
use super::maneuver::{Maneuver, ManeuverKind};
use super::peripheral::Peripheral;
use crate::config::{BrakeMode, STEER_DUTY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionPhase {
    Idle,
    Executing,
    Settling,
}

/// Why a maneuver was not queued
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Motion queue full, maneuver rejected")]
    Busy,

    #[error("Motion task has stopped")]
    Closed,
}

/// Sending side of the motion queue
#[derive(Debug, Clone)]
pub struct MotionQueue {
    tx: mpsc::Sender<Maneuver>,
}

impl MotionQueue {
    /// Queue a maneuver without blocking; rejects it when the queue is full
    pub fn submit(&self, maneuver: Maneuver) -> Result<(), SubmitError> {
        self.tx.try_send(maneuver).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Busy,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }
}

/// Create the motion queue with the given capacity
pub fn motion_queue(capacity: usize) -> (MotionQueue, mpsc::Receiver<Maneuver>) {
    let (tx, rx) = mpsc::channel(capacity);
    (MotionQueue { tx }, rx)
}

pub struct MotionController<P: Peripheral> {
    actuators: SharedActuators<P>,
    cancel: Arc<AtomicBool>,
    phase: watch::Sender<MotionPhase>,
}

impl<P: Peripheral> MotionController<P> {
    pub fn new(actuators: SharedActuators<P>, cancel: Arc<AtomicBool>) -> Self {
        let (phase, _) = watch::channel(MotionPhase::Idle);
        Self {
            actuators,
            cancel,
            phase,
        }
    }

    /// Observe phase transitions
    pub fn phase(&self) -> watch::Receiver<MotionPhase> {
        self.phase.subscribe()
    }

    /// Consume the queue until it closes or the cancel flag is raised
    pub async fn run(mut self, mut rx: mpsc::Receiver<Maneuver>) {
        info!("Motion task started");
        while let Some(maneuver) = rx.recv().await {
            if self.cancelled() {
                break;
            }
            if let Err(e) = self.execute(&maneuver).await {
                warn!("Maneuver {} aborted: {}", maneuver.name(), e);
            }
        }
        info!("Motion task stopped");
    }

    /// Run one maneuver to completion; both axes are neutral afterwards
    pub async fn execute(&mut self, maneuver: &Maneuver) -> Result<(), ActuatorError> {
        info!("Executing {} for {:?}", maneuver.name(), maneuver.duration);
        if let Some(radius) = maneuver.turn_radius_hint {
            debug!("Turn radius hint {:.2} m, steering stays at full lock", radius);
        }
        let authority = ActuatorAuthority::acquire(&self.actuators);
        let result = self.run_steps(&authority, maneuver).await;
        drop(authority);
        self.set_phase(MotionPhase::Idle);
        debug!("Finished {}", maneuver.name());
        result
    }

    async fn run_steps(
        &mut self,
        authority: &ActuatorAuthority<P>,
        maneuver: &Maneuver,
    ) -> Result<(), ActuatorError> {
        let drive = if maneuver.forward {
            DriveDirection::Forward
        } else {
            DriveDirection::Backward
        };
        let duty = maneuver.tier.duty();

        match maneuver.kind {
            ManeuverKind::Straight => {
                if self.cancelled() {
                    return Ok(());
                }
                self.set_phase(MotionPhase::Executing);
                authority.with(|a| a.set_drive(drive, duty))?;
                self.hold(maneuver.duration).await;
            }
            ManeuverKind::Turn(steer) => {
                if self.cancelled() {
                    return Ok(());
                }
                self.set_phase(MotionPhase::Executing);
                authority.with(|a| {
                    a.set_drive(drive, duty)?;
                    a.set_steer(steer, STEER_DUTY)
                })?;
                self.hold(maneuver.duration).await;
                if self.cancelled() {
                    return Ok(());
                }
                authority.with(|a| a.reset_steer())?;
            }
            ManeuverKind::Stop => {
                if self.cancelled() {
                    return Ok(());
                }
                self.set_phase(MotionPhase::Settling);
                authority.with(|a| match a.wiring().brake {
                    BrakeMode::Active => a.brake(),
                    BrakeMode::Coast => a.reset_drive(),
                })?;
                self.hold(maneuver.duration).await;
            }
        }
        Ok(())
    }

    async fn hold(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: MotionPhase) {
        debug!("Motion phase -> {:?}", phase);
        self.phase.send_replace(phase);
    }
}
