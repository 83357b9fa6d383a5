// Command dispatch loop
//
// One iteration: wait briefly for a command byte, hand any maneuver to the
// motion queue, then run exactly one telemetry cycle. Telemetry for an
// iteration therefore always happens after that iteration's command read.

use std::io;

use tracing::{error, info, warn};

use crate::config::{DISPATCH_POLL, READY_MESSAGE};
use crate::link::Link;
use crate::messages::CommandCode;
use crate::motor::{MotionQueue, SubmitError};
use crate::telemetry::TelemetryPoller;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Command link failed: {0}")]
    Io(#[from] io::Error),

    #[error("Motion task is no longer accepting maneuvers")]
    MotionStopped,
}

/// What one loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue(Option<CommandCode>),
    /// An invalid command byte was received; the vehicle must be halted
    Shutdown(u8),
}

pub struct Dispatcher<L: Link> {
    link: L,
    motion: MotionQueue,
    telemetry: TelemetryPoller,
}

impl<L: Link> Dispatcher<L> {
    pub fn new(link: L, motion: MotionQueue) -> Self {
        Self {
            link,
            motion,
            telemetry: TelemetryPoller::new(),
        }
    }

    /// Announce readiness to the remote side
    pub fn start(&mut self) -> Result<(), DispatchError> {
        self.link.write_all(READY_MESSAGE.as_bytes())?;
        self.link.flush()?;
        info!("Waiting for data");
        Ok(())
    }

    pub fn step(&mut self) -> Result<Step, DispatchError> {
        let code = if self.link.wait_for_data(DISPATCH_POLL)? {
            Some(CommandCode::from_byte(self.link.read_byte()?))
        } else {
            None
        };

        match code {
            None | Some(CommandCode::NoOp) => {}
            Some(CommandCode::Invalid(byte)) => {
                error!("Got an invalid command: 0x{:02X}", byte);
                return Ok(Step::Shutdown(byte));
            }
            Some(cmd) => {
                info!("Got data: {}", cmd);
                if let Some(maneuver) = cmd.maneuver() {
                    match self.motion.submit(maneuver) {
                        Ok(()) => {}
                        Err(SubmitError::Busy) => {
                            warn!("Still executing, dropping {} command", cmd)
                        }
                        Err(SubmitError::Closed) => return Err(DispatchError::MotionStopped),
                    }
                }
            }
        }

        // Failures are logged by the poller; the next iteration retries
        let _ = self.telemetry.poll(&mut self.link);

        Ok(Step::Continue(code))
    }

    /// Loop until an invalid command arrives; returns the offending byte
    pub fn run(&mut self) -> Result<u8, DispatchError> {
        self.start()?;
        loop {
            if let Step::Shutdown(byte) = self.step()? {
                return Ok(byte);
            }
        }
    }

    pub fn into_link(self) -> L {
        self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::scripted::ScriptedLink;
    use crate::motor::{ManeuverKind, SteerDirection, motion_queue};
    use tokio::sync::mpsc;

    fn drain_queue(rx: &mut mpsc::Receiver<crate::motor::Maneuver>) -> Vec<crate::motor::Maneuver> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[test]
    fn test_each_motion_code_queues_one_maneuver() {
        let cases = [
            (b'1', ManeuverKind::Straight, true),
            (b'2', ManeuverKind::Straight, false),
            (b'3', ManeuverKind::Turn(SteerDirection::Left), true),
            (b'4', ManeuverKind::Turn(SteerDirection::Right), true),
            (b'5', ManeuverKind::Stop, false),
        ];
        for (byte, kind, forward) in cases {
            let (queue, mut rx) = motion_queue(4);
            let mut d = Dispatcher::new(ScriptedLink::new().with_inbound(&[byte]), queue);

            let step = d.step().unwrap();
            assert_eq!(step, Step::Continue(Some(CommandCode::from_byte(byte))));

            let queued = drain_queue(&mut rx);
            assert_eq!(queued.len(), 1, "byte {:?}", byte as char);
            assert_eq!(queued[0].kind, kind);
            assert_eq!(queued[0].forward, forward);
        }
    }

    #[test]
    fn test_noop_queues_nothing() {
        let (queue, mut rx) = motion_queue(4);
        let mut d = Dispatcher::new(ScriptedLink::new().with_inbound(b"0"), queue);
        assert_eq!(d.step().unwrap(), Step::Continue(Some(CommandCode::NoOp)));
        assert!(drain_queue(&mut rx).is_empty());
    }

    #[test]
    fn test_invalid_byte_requests_shutdown() {
        let (queue, mut rx) = motion_queue(4);
        let mut d = Dispatcher::new(ScriptedLink::new().with_inbound(b"7"), queue);
        assert_eq!(d.step().unwrap(), Step::Shutdown(b'7'));
        assert!(drain_queue(&mut rx).is_empty());
        // shutdown skips the telemetry cycle
        assert!(d.into_link().written.is_empty());
    }

    #[test]
    fn test_telemetry_follows_command_read() {
        let (queue, _rx) = motion_queue(4);
        let link = ScriptedLink::new().with_inbound(b"1");
        let mut d = Dispatcher::new(link, queue);
        d.step().unwrap();
        let link = d.into_link();
        assert_eq!(link.written_str(), vec!["+++"]);
    }

    #[test]
    fn test_telemetry_runs_without_command() {
        let (queue, _rx) = motion_queue(4);
        let mut d = Dispatcher::new(ScriptedLink::new(), queue);
        assert_eq!(d.step().unwrap(), Step::Continue(None));
        assert_eq!(d.into_link().written_str(), vec!["+++"]);
    }

    #[test]
    fn test_full_queue_rejects_overflow() {
        let (queue, mut rx) = motion_queue(8);
        let mut d = Dispatcher::new(ScriptedLink::new(), queue);
        // one byte per iteration; anything still buffered would be drained by telemetry
        for &byte in b"1234512345" {
            d.link.inbound.push_back(byte);
            assert!(matches!(d.step().unwrap(), Step::Continue(Some(_))));
        }

        // first eight accepted in arrival order, the last two rejected
        let queued: Vec<_> = drain_queue(&mut rx).iter().map(|m| m.name()).collect();
        assert_eq!(
            queued,
            ["forward", "backward", "left", "right", "stop", "forward", "backward", "left"]
        );
    }

    #[test]
    fn test_command_read_failure_ends_run() {
        let (queue, _rx) = motion_queue(4);
        let mut link = ScriptedLink::new();
        link.fail_reads = true;
        let mut d = Dispatcher::new(link, queue);

        assert!(matches!(d.run(), Err(DispatchError::Io(_))));
        assert_eq!(d.into_link().written_str(), vec![READY_MESSAGE]);
    }

    #[test]
    fn test_closed_queue_is_fatal() {
        let (queue, rx) = motion_queue(1);
        drop(rx);
        let mut d = Dispatcher::new(ScriptedLink::new().with_inbound(b"5"), queue);
        assert!(matches!(d.step(), Err(DispatchError::MotionStopped)));
    }

    #[test]
    fn test_run_announces_then_stops_on_invalid() {
        let (queue, _rx) = motion_queue(4);
        let mut d = Dispatcher::new(ScriptedLink::new().with_inbound(b"x"), queue);
        assert_eq!(d.run().unwrap(), b'x');
        assert_eq!(d.into_link().written_str()[0], READY_MESSAGE);
    }
}
