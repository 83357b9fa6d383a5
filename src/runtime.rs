// Startup sequence and the main loop
//
// The blocking serial loop runs on tokio's blocking pool, maneuvers run on a
// single async motion task, and Ctrl+C races the loop. Whichever way the loop
// ends, the shutdown handler leaves the actuators neutral.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::{error, info};

use crate::config::{MOTION_QUEUE_CAPACITY, SERIAL_PORT, Wiring};
use crate::dispatcher::Dispatcher;
use crate::link::{Link, LinkError, SerialLink};
use crate::motor::{
    ActuatorError, Actuators, MotionController, Peripheral, SimPeripheral, SysfsPeripheral,
    motion_queue,
};
use crate::shutdown::{ShutdownHandler, ShutdownReason};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Actuator initialization failed: {0}")]
    Actuators(#[from] ActuatorError),

    #[error("Could not open command link: {0}")]
    Link(#[from] LinkError),

    #[error("Could not install interrupt handler: {0}")]
    Signal(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub port: String,
    pub wiring: Wiring,
    /// Use the in-memory peripheral instead of sysfs
    pub simulate: bool,
    pub pwm_chip: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            port: SERIAL_PORT.to_string(),
            wiring: Wiring::default(),
            simulate: false,
            pwm_chip: 0,
        }
    }
}

/// Bring everything up and run until shutdown
pub async fn run(options: RuntimeOptions) -> Result<ShutdownReason, RuntimeError> {
    let port = options.port.clone();
    if options.simulate {
        info!("Running with simulated actuators");
        run_with(SimPeripheral::new(), options.wiring, move || SerialLink::open(&port)).await
    } else {
        let hw = SysfsPeripheral::new(options.pwm_chip);
        run_with(hw, options.wiring, move || SerialLink::open(&port)).await
    }
}

/// Run against any peripheral and link; the link is opened after the
/// actuators are safely initialized
pub async fn run_with<P, L, F>(
    hw: P,
    wiring: Wiring,
    open_link: F,
) -> Result<ShutdownReason, RuntimeError>
where
    P: Peripheral + 'static,
    L: Link + 'static,
    F: FnOnce() -> Result<L, LinkError>,
{
    // Registered before standby is raised so an early Ctrl+C still resets
    let interrupt = interrupt_listener().map_err(RuntimeError::Signal)?;
    run_until(hw, wiring, open_link, interrupt).await
}

async fn run_until<P, L, F>(
    hw: P,
    wiring: Wiring,
    open_link: F,
    interrupt: impl Future<Output = ()>,
) -> Result<ShutdownReason, RuntimeError>
where
    P: Peripheral + 'static,
    L: Link + 'static,
    F: FnOnce() -> Result<L, LinkError>,
{
    let mut actuators = Actuators::new(hw, wiring);
    actuators.initialize()?;
    let actuators = actuators.into_shared();

    let cancel = Arc::new(AtomicBool::new(false));
    let shutdown = ShutdownHandler::new(Arc::clone(&actuators), cancel.clone());

    let link = match open_link() {
        Ok(link) => link,
        Err(e) => {
            shutdown.trigger(ShutdownReason::LinkFailure);
            return Err(e.into());
        }
    };

    let (queue, rx) = motion_queue(MOTION_QUEUE_CAPACITY);
    let controller = MotionController::new(Arc::clone(&actuators), cancel);
    let motion = tokio::spawn(controller.run(rx));

    let mut dispatcher = Dispatcher::new(link, queue);
    let mut dispatch = tokio::task::spawn_blocking(move || dispatcher.run());

    let reason = tokio::select! {
        biased;
        _ = interrupt => ShutdownReason::Interrupt,
        res = &mut dispatch => match res {
            Ok(Ok(byte)) => ShutdownReason::InvalidCommand(byte),
            Ok(Err(e)) => {
                error!("Dispatcher stopped: {}", e);
                ShutdownReason::LinkFailure
            }
            Err(e) => {
                error!("Dispatcher task failed: {}", e);
                ShutdownReason::LinkFailure
            }
        },
    };

    shutdown.trigger(reason);
    motion.abort();
    Ok(reason)
}

/// Install the SIGINT / Ctrl+C handler now; the returned future resolves on
/// the first interrupt
#[cfg(unix)]
fn interrupt_listener() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sig = signal(SignalKind::interrupt())?;
    Ok(async move {
        sig.recv().await;
    })
}

#[cfg(windows)]
fn interrupt_listener() -> io::Result<impl Future<Output = ()>> {
    let mut sig = tokio::signal::windows::ctrl_c()?;
    Ok(async move {
        sig.recv().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::scripted::ScriptedLink;
    use crate::motor::{Level, PinCall};

    #[tokio::test]
    async fn test_invalid_command_shuts_down_neutral() {
        let sim = SimPeripheral::new();
        let w = Wiring::default();
        let reason = run_with(sim.clone(), w, || Ok(ScriptedLink::new().with_inbound(b"9")))
            .await
            .unwrap();

        assert_eq!(reason, ShutdownReason::InvalidCommand(b'9'));
        assert_eq!(sim.level(w.standby), Level::Low);
        assert_eq!(sim.duty(w.drive_pwm), 0.0);
        assert_eq!(sim.duty(w.steer_pwm), 0.0);
    }

    #[tokio::test]
    async fn test_interrupt_during_startup_is_not_lost() {
        let sim = SimPeripheral::new();
        let w = Wiring::default();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let interrupt = async move {
            let _ = rx.await;
        };

        // the interrupt lands after standby is raised but before the loop starts
        let reason = run_until(
            sim.clone(),
            w,
            move || {
                let _ = tx.send(());
                let mut link = ScriptedLink::new();
                link.fail_reads = true;
                Ok(link)
            },
            interrupt,
        )
        .await
        .unwrap();

        assert_eq!(reason, ShutdownReason::Interrupt);
        assert_eq!(sim.level(w.standby), Level::Low);
        assert_eq!(sim.calls().last(), Some(&PinCall::Write(w.standby, Level::Low)));
    }

    #[tokio::test]
    async fn test_link_failure_after_init_resets() {
        let sim = SimPeripheral::new();
        let w = Wiring::default();
        let result = run_with::<_, ScriptedLink, _>(sim.clone(), w, || {
            Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such port",
            )))
        })
        .await;

        assert!(matches!(result, Err(RuntimeError::Link(_))));
        assert_eq!(sim.calls().last(), Some(&PinCall::Write(w.standby, Level::Low)));
    }

    #[tokio::test]
    async fn test_init_failure_never_opens_link() {
        let w = Wiring::default();
        let sim = SimPeripheral::with_broken_pin(w.forward);
        let result = run_with::<_, ScriptedLink, _>(sim, w, || {
            panic!("link opened before actuators were ready")
        })
        .await;
        assert!(matches!(result, Err(RuntimeError::Actuators(_))));
    }
}
