// In-memory peripheral used for --simulate runs and tests
//
// Every call is appended to a shared log and the resulting pin levels and
// duty cycles are tracked, so a test can inspect both the order of writes and
// the final state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::peripheral::{Level, Peripheral, PeripheralError};

/// One recorded peripheral call
#[derive(Debug, Clone, PartialEq)]
pub enum PinCall {
    ConfigureOutput(u32),
    Write(u32, Level),
    PwmEnable(u32, bool),
    PwmSet { pin: u32, period: Duration, duty: f32 },
}

impl PinCall {
    pub fn pin(&self) -> u32 {
        match *self {
            PinCall::ConfigureOutput(pin)
            | PinCall::Write(pin, _)
            | PinCall::PwmEnable(pin, _)
            | PinCall::PwmSet { pin, .. } => pin,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<PinCall>,
    levels: HashMap<u32, Level>,
    duties: HashMap<u32, f32>,
    outputs: HashSet<u32>,
    broken: HashSet<u32>,
}

/// Cloneable handle; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct SimPeripheral {
    state: Arc<Mutex<SimState>>,
}

impl SimPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulator in which every call touching `pin` fails
    pub fn with_broken_pin(pin: u32) -> Self {
        let sim = Self::default();
        sim.state.lock().broken.insert(pin);
        sim
    }

    pub fn calls(&self) -> Vec<PinCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Last level written to a digital pin (Low if never written)
    pub fn level(&self, pin: u32) -> Level {
        self.state.lock().levels.get(&pin).copied().unwrap_or(Level::Low)
    }

    /// Last duty written to a PWM channel (0.0 if never written)
    pub fn duty(&self, pin: u32) -> f32 {
        self.state.lock().duties.get(&pin).copied().unwrap_or(0.0)
    }

    pub fn is_output(&self, pin: u32) -> bool {
        self.state.lock().outputs.contains(&pin)
    }

    fn record(&self, call: PinCall) -> Result<(), PeripheralError> {
        let mut state = self.state.lock();
        let pin = call.pin();
        if state.broken.contains(&pin) {
            return Err(PeripheralError::Refused {
                pin,
                reason: "simulated fault".to_string(),
            });
        }
        debug!("sim {:?}", call);
        match call {
            PinCall::ConfigureOutput(pin) => {
                state.outputs.insert(pin);
            }
            PinCall::Write(pin, level) => {
                state.levels.insert(pin, level);
            }
            PinCall::PwmEnable(..) => {}
            PinCall::PwmSet { pin, duty, .. } => {
                state.duties.insert(pin, duty);
            }
        }
        state.calls.push(call);
        Ok(())
    }
}

impl Peripheral for SimPeripheral {
    fn configure_output(&mut self, pin: u32) -> Result<(), PeripheralError> {
        self.record(PinCall::ConfigureOutput(pin))
    }

    fn write_pin(&mut self, pin: u32, level: Level) -> Result<(), PeripheralError> {
        self.record(PinCall::Write(pin, level))
    }

    fn pwm_enable(&mut self, pin: u32, enabled: bool) -> Result<(), PeripheralError> {
        self.record(PinCall::PwmEnable(pin, enabled))
    }

    fn pwm_set(&mut self, pin: u32, period: Duration, duty: f32) -> Result<(), PeripheralError> {
        self.record(PinCall::PwmSet { pin, period, duty })
    }
}
