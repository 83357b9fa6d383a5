// Actuator layer: drive and steering H-bridges behind a safe-state API
//
// Every H-bridge has two direction pins and a PWM duty channel; a shared
// standby pin gates both bridges. Direction pins are always written before
// the duty so the bridge never sees a non-zero duty with a stale direction.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::peripheral::{Level, Peripheral, PeripheralError};
use crate::config::{PWM_PERIOD, Wiring};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveDirection {
    Forward,
    Backward,
    Neutral,
    /// Both direction pins asserted (active brake)
    Brake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteerDirection {
    Left,
    Right,
    Neutral,
}

/// Last commanded actuator state (open loop, never read back from hardware)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorState {
    pub drive_direction: DriveDirection,
    pub drive_duty: f32,
    pub steer_direction: SteerDirection,
    pub steer_duty: f32,
    pub enabled: bool,
}

impl ActuatorState {
    pub fn neutral() -> Self {
        Self {
            drive_direction: DriveDirection::Neutral,
            drive_duty: 0.0,
            steer_direction: SteerDirection::Neutral,
            steer_duty: 0.0,
            enabled: false,
        }
    }

    /// Both axes released, regardless of the standby line
    pub fn is_neutral(&self) -> bool {
        self.drive_direction == DriveDirection::Neutral
            && self.drive_duty == 0.0
            && self.steer_direction == SteerDirection::Neutral
            && self.steer_duty == 0.0
    }
}

impl Default for ActuatorState {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Error types for the actuator layer
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Failed to initialize pin {pin}: {source}")]
    Init {
        pin: u32,
        #[source]
        source: PeripheralError,
    },

    #[error("Actuators used before initialization")]
    NotInitialized,

    #[error("Actuators are in standby, refusing to drive")]
    Disabled,

    #[error(transparent)]
    Peripheral(#[from] PeripheralError),
}

/// The single owner of the actuator pins
pub struct Actuators<P: Peripheral> {
    hw: P,
    wiring: Wiring,
    state: ActuatorState,
    standby_ready: bool,
    initialized: bool,
}

/// Actuator handle shared by the motion task and the shutdown handler
pub type SharedActuators<P> = Arc<Mutex<Actuators<P>>>;

impl<P: Peripheral> Actuators<P> {
    pub fn new(hw: P, wiring: Wiring) -> Self {
        Self {
            hw,
            wiring,
            state: ActuatorState::neutral(),
            standby_ready: false,
            initialized: false,
        }
    }

    pub fn into_shared(self) -> SharedActuators<P> {
        Arc::new(Mutex::new(self))
    }

    /// Bring the bridges up in a safe order
    ///
    /// Standby is configured and pulled low before any direction or duty pin
    /// is touched, and only raised once every pin is configured and neutral.
    /// Any failure leaves the bridges in standby.
    pub fn initialize(&mut self) -> Result<(), ActuatorError> {
        if self.initialized {
            return Ok(());
        }
        let w = self.wiring;
        info!("Initializing actuators with wiring {:?}", w);

        self.hw
            .configure_output(w.standby)
            .map_err(|source| ActuatorError::Init { pin: w.standby, source })?;
        self.standby_ready = true;
        self.set_enabled(false).map_err(|e| init_error(w.standby, e))?;

        for pwm in [w.drive_pwm, w.steer_pwm] {
            self.hw
                .pwm_enable(pwm, true)
                .map_err(|source| ActuatorError::Init { pin: pwm, source })?;
        }
        for pin in w.direction_pins() {
            self.hw
                .configure_output(pin)
                .map_err(|source| ActuatorError::Init { pin, source })?;
        }

        self.initialized = true;
        if let Err(e) = self.release_and_enable() {
            self.initialized = false;
            return Err(e);
        }

        info!("Actuators initialized");
        Ok(())
    }

    fn release_and_enable(&mut self) -> Result<(), ActuatorError> {
        let w = self.wiring;
        self.reset_drive().map_err(|e| init_error(w.drive_pwm, e))?;
        self.reset_steer().map_err(|e| init_error(w.steer_pwm, e))?;
        self.set_enabled(true).map_err(|e| init_error(w.standby, e))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    /// Drive the standby line
    ///
    /// Disabling first releases both axes. Before the standby pin has been
    /// configured this is a no-op.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), ActuatorError> {
        if enabled {
            if !self.initialized {
                return Err(ActuatorError::NotInitialized);
            }
        } else {
            if !self.standby_ready {
                return Ok(());
            }
            self.reset_drive()?;
            self.reset_steer()?;
        }
        self.hw.write_pin(self.wiring.standby, Level::from(enabled))?;
        self.state.enabled = enabled;
        debug!("Standby line {}", if enabled { "raised" } else { "lowered" });
        Ok(())
    }

    /// Set the drive direction, then its duty
    ///
    /// While in standby only the neutral setting is accepted.
    pub fn set_drive(&mut self, direction: DriveDirection, duty: f32) -> Result<(), ActuatorError> {
        self.ensure_initialized()?;
        let duty = duty.clamp(0.0, 1.0);
        if direction != DriveDirection::Neutral || duty > 0.0 {
            self.ensure_enabled()?;
        }
        let (fwd, back) = match direction {
            DriveDirection::Forward => (true, false),
            DriveDirection::Backward => (false, true),
            DriveDirection::Neutral => (false, false),
            DriveDirection::Brake => (true, true),
        };
        self.hw.write_pin(self.wiring.forward, Level::from(fwd))?;
        self.hw.write_pin(self.wiring.backward, Level::from(back))?;
        self.state.drive_direction = direction;
        self.hw.pwm_set(self.wiring.drive_pwm, PWM_PERIOD, duty)?;
        self.state.drive_duty = duty;
        Ok(())
    }

    pub fn set_steer(&mut self, direction: SteerDirection, duty: f32) -> Result<(), ActuatorError> {
        self.ensure_initialized()?;
        let duty = duty.clamp(0.0, 1.0);
        if direction != SteerDirection::Neutral || duty > 0.0 {
            self.ensure_enabled()?;
        }
        let (left, right) = match direction {
            SteerDirection::Left => (true, false),
            SteerDirection::Right => (false, true),
            SteerDirection::Neutral => (false, false),
        };
        self.hw.write_pin(self.wiring.left, Level::from(left))?;
        self.hw.write_pin(self.wiring.right, Level::from(right))?;
        self.state.steer_direction = direction;
        self.hw.pwm_set(self.wiring.steer_pwm, PWM_PERIOD, duty)?;
        self.state.steer_duty = duty;
        Ok(())
    }

    /// Short-brake the drive motor: both direction pins high, duty untouched
    pub fn brake(&mut self) -> Result<(), ActuatorError> {
        self.ensure_initialized()?;
        self.ensure_enabled()?;
        self.hw.write_pin(self.wiring.forward, Level::High)?;
        self.hw.write_pin(self.wiring.backward, Level::High)?;
        self.state.drive_direction = DriveDirection::Brake;
        Ok(())
    }

    /// Release the drive axis; no-op before initialization
    pub fn reset_drive(&mut self) -> Result<(), ActuatorError> {
        if !self.initialized {
            return Ok(());
        }
        self.set_drive(DriveDirection::Neutral, 0.0)
    }

    /// Release the steering axis; no-op before initialization
    pub fn reset_steer(&mut self) -> Result<(), ActuatorError> {
        if !self.initialized {
            return Ok(());
        }
        self.set_steer(SteerDirection::Neutral, 0.0)
    }

    fn ensure_initialized(&self) -> Result<(), ActuatorError> {
        if self.initialized {
            Ok(())
        } else {
            Err(ActuatorError::NotInitialized)
        }
    }

    fn ensure_enabled(&self) -> Result<(), ActuatorError> {
        if self.state.enabled {
            Ok(())
        } else {
            Err(ActuatorError::Disabled)
        }
    }
}

fn init_error(pin: u32, e: ActuatorError) -> ActuatorError {
    match e {
        ActuatorError::Peripheral(source) => ActuatorError::Init { pin, source },
        other => other,
    }
}

/// Actuator authority held for the duration of one maneuver
///
/// Dropping it releases both axes, whichever way the maneuver ended.
pub struct ActuatorAuthority<P: Peripheral> {
    actuators: SharedActuators<P>,
}

impl<P: Peripheral> ActuatorAuthority<P> {
    pub fn acquire(actuators: &SharedActuators<P>) -> Self {
        Self {
            actuators: Arc::clone(actuators),
        }
    }

    /// Run one step against the actuators; the lock is held only for `f`
    pub fn with<R>(&self, f: impl FnOnce(&mut Actuators<P>) -> R) -> R {
        f(&mut self.actuators.lock())
    }
}

impl<P: Peripheral> Drop for ActuatorAuthority<P> {
    fn drop(&mut self) {
        let mut act = self.actuators.lock();
        if let Err(e) = act.reset_drive() {
            warn!("Failed to reset drive on release: {}", e);
        }
        if let Err(e) = act.reset_steer() {
            warn!("Failed to reset steering on release: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::sim::{PinCall, SimPeripheral};

    fn ready() -> (SimPeripheral, Actuators<SimPeripheral>) {
        let sim = SimPeripheral::new();
        let mut act = Actuators::new(sim.clone(), Wiring::default());
        act.initialize().unwrap();
        sim.clear_calls();
        (sim, act)
    }

    #[test]
    fn test_initialize_order() {
        let sim = SimPeripheral::new();
        let w = Wiring::default();
        let mut act = Actuators::new(sim.clone(), w);
        act.initialize().unwrap();

        let calls = sim.calls();
        // standby configured and pulled low before anything else
        assert_eq!(calls[0], PinCall::ConfigureOutput(w.standby));
        assert_eq!(calls[1], PinCall::Write(w.standby, Level::Low));
        // standby raised last
        assert_eq!(calls.last(), Some(&PinCall::Write(w.standby, Level::High)));

        let last_config = calls
            .iter()
            .rposition(|c| matches!(c, PinCall::ConfigureOutput(_)))
            .unwrap();
        let raise = calls.len() - 1;
        assert!(last_config < raise);
        assert!(sim.is_output(w.standby));
        assert!(w.direction_pins().iter().all(|&pin| sim.is_output(pin)));
        assert!(act.is_initialized());
        assert!(act.state().enabled);
        assert!(act.state().is_neutral());
    }

    #[test]
    fn test_initialize_failure_never_enables() {
        let w = Wiring::default();
        let sim = SimPeripheral::with_broken_pin(w.left);
        let mut act = Actuators::new(sim.clone(), w);

        let err = act.initialize().unwrap_err();
        assert!(matches!(err, ActuatorError::Init { pin, .. } if pin == w.left));
        assert!(!act.is_initialized());
        assert!(!sim.calls().contains(&PinCall::Write(w.standby, Level::High)));
        assert_eq!(sim.level(w.standby), Level::Low);
    }

    #[test]
    fn test_missing_standby_is_fatal() {
        let w = Wiring::default();
        let sim = SimPeripheral::with_broken_pin(w.standby);
        let mut act = Actuators::new(sim.clone(), w);
        assert!(act.initialize().is_err());
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn test_direction_written_before_duty() {
        let (sim, mut act) = ready();
        let w = act.wiring();
        act.set_drive(DriveDirection::Forward, 0.4).unwrap();

        let calls = sim.calls();
        assert_eq!(calls[0], PinCall::Write(w.forward, Level::High));
        assert_eq!(calls[1], PinCall::Write(w.backward, Level::Low));
        assert!(matches!(calls[2], PinCall::PwmSet { pin, duty, .. } if pin == w.drive_pwm && duty == 0.4));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (sim, mut act) = ready();
        let w = act.wiring();
        act.set_steer(SteerDirection::Left, 1.0).unwrap();
        act.reset_steer().unwrap();
        let once = act.state();
        act.reset_steer().unwrap();
        assert_eq!(act.state(), once);
        assert_eq!(sim.level(w.left), Level::Low);
        assert_eq!(sim.duty(w.steer_pwm), 0.0);
    }

    #[test]
    fn test_duty_clamped() {
        let (_sim, mut act) = ready();
        act.set_drive(DriveDirection::Backward, 3.0).unwrap();
        assert_eq!(act.state().drive_duty, 1.0);
        act.set_drive(DriveDirection::Backward, -1.0).unwrap();
        assert_eq!(act.state().drive_duty, 0.0);
    }

    #[test]
    fn test_disable_releases_axes_first() {
        let (sim, mut act) = ready();
        let w = act.wiring();
        act.set_drive(DriveDirection::Forward, 0.4).unwrap();
        sim.clear_calls();

        act.set_enabled(false).unwrap();
        let calls = sim.calls();
        assert_eq!(calls.last(), Some(&PinCall::Write(w.standby, Level::Low)));
        assert!(act.state().is_neutral());
        assert!(!act.state().enabled);
    }

    #[test]
    fn test_uninitialized_resets_are_noops() {
        let sim = SimPeripheral::new();
        let mut act = Actuators::new(sim.clone(), Wiring::default());
        act.reset_drive().unwrap();
        act.reset_steer().unwrap();
        act.set_enabled(false).unwrap();
        assert!(sim.calls().is_empty());
        assert!(matches!(
            act.set_drive(DriveDirection::Forward, 0.4),
            Err(ActuatorError::NotInitialized)
        ));
    }

    /// Simulator whose PWM duty writes always fail
    struct DutyFault(SimPeripheral);

    impl Peripheral for DutyFault {
        fn configure_output(&mut self, pin: u32) -> Result<(), PeripheralError> {
            self.0.configure_output(pin)
        }

        fn write_pin(&mut self, pin: u32, level: Level) -> Result<(), PeripheralError> {
            self.0.write_pin(pin, level)
        }

        fn pwm_enable(&mut self, pin: u32, enabled: bool) -> Result<(), PeripheralError> {
            self.0.pwm_enable(pin, enabled)
        }

        fn pwm_set(
            &mut self,
            pin: u32,
            _period: std::time::Duration,
            _duty: f32,
        ) -> Result<(), PeripheralError> {
            Err(PeripheralError::Unavailable { pin })
        }
    }

    #[test]
    fn test_failed_reset_during_init_is_not_initialized() {
        let sim = SimPeripheral::new();
        let w = Wiring::default();
        let mut act = Actuators::new(DutyFault(sim.clone()), w);

        let err = act.initialize().unwrap_err();
        assert!(matches!(err, ActuatorError::Init { pin, .. } if pin == w.drive_pwm));
        assert!(!act.is_initialized());

        // a retry must fail again rather than report a half-started layer
        assert!(act.initialize().is_err());
        assert!(!act.is_initialized());
        assert!(!act.state().enabled);
        assert_eq!(sim.level(w.standby), Level::Low);
    }

    #[test]
    fn test_standby_rejects_motion() {
        let (sim, mut act) = ready();
        let w = act.wiring();
        act.set_enabled(false).unwrap();
        sim.clear_calls();

        assert!(matches!(
            act.set_drive(DriveDirection::Forward, 0.4),
            Err(ActuatorError::Disabled)
        ));
        assert!(matches!(
            act.set_steer(SteerDirection::Left, 1.0),
            Err(ActuatorError::Disabled)
        ));
        assert!(matches!(act.brake(), Err(ActuatorError::Disabled)));
        assert!(sim.calls().is_empty());
        assert!(act.state().is_neutral());

        // releasing is still allowed
        act.reset_drive().unwrap();
        act.reset_steer().unwrap();
        assert_eq!(sim.duty(w.drive_pwm), 0.0);
        assert_eq!(sim.level(w.forward), Level::Low);
    }

    #[test]
    fn test_authority_releases_on_drop() {
        let (sim, act) = ready();
        let w = act.wiring();
        let shared = act.into_shared();
        {
            let auth = ActuatorAuthority::acquire(&shared);
            auth.with(|a| a.set_drive(DriveDirection::Forward, 0.4)).unwrap();
            auth.with(|a| a.set_steer(SteerDirection::Right, 1.0)).unwrap();
        }
        assert!(shared.lock().state().is_neutral());
        assert_eq!(sim.level(w.forward), Level::Low);
        assert_eq!(sim.level(w.right), Level::Low);
        assert_eq!(sim.duty(w.drive_pwm), 0.0);
    }
}
