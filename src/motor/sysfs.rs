// Linux sysfs GPIO / PWM backend
//
// GPIO pins are driven through /sys/class/gpio/gpioN, PWM channels through
// /sys/class/pwm/pwmchipC/pwmN. Pins are exported lazily on first use.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::peripheral::{Level, Peripheral, PeripheralError};

const GPIO_ROOT: &str = "/sys/class/gpio";
const PWM_ROOT: &str = "/sys/class/pwm";

pub struct SysfsPeripheral {
    gpio_root: PathBuf,
    pwm_chip: PathBuf,
}

impl SysfsPeripheral {
    /// Backend using the system sysfs tree and the given PWM chip index
    pub fn new(pwm_chip: u32) -> Self {
        Self::with_roots(GPIO_ROOT, Path::new(PWM_ROOT).join(format!("pwmchip{}", pwm_chip)))
    }

    /// Backend rooted somewhere else (useful against a fake sysfs tree)
    pub fn with_roots(gpio_root: impl Into<PathBuf>, pwm_chip: impl Into<PathBuf>) -> Self {
        Self {
            gpio_root: gpio_root.into(),
            pwm_chip: pwm_chip.into(),
        }
    }

    fn write_attr(pin: u32, path: &Path, value: &str) -> Result<(), PeripheralError> {
        debug!("sysfs write {} <- {}", path.display(), value);
        fs::write(path, value).map_err(|source| PeripheralError::Io { pin, source })
    }

    fn gpio_dir(&self, pin: u32) -> Result<PathBuf, PeripheralError> {
        let dir = self.gpio_root.join(format!("gpio{}", pin));
        if !dir.exists() {
            Self::write_attr(pin, &self.gpio_root.join("export"), &pin.to_string())?;
        }
        if dir.exists() {
            Ok(dir)
        } else {
            Err(PeripheralError::Unavailable { pin })
        }
    }

    fn pwm_dir(&self, pin: u32) -> Result<PathBuf, PeripheralError> {
        if !self.pwm_chip.exists() {
            return Err(PeripheralError::Unavailable { pin });
        }
        let dir = self.pwm_chip.join(format!("pwm{}", pin));
        if !dir.exists() {
            Self::write_attr(pin, &self.pwm_chip.join("export"), &pin.to_string())?;
        }
        if dir.exists() {
            Ok(dir)
        } else {
            Err(PeripheralError::Unavailable { pin })
        }
    }
}

impl Peripheral for SysfsPeripheral {
    fn configure_output(&mut self, pin: u32) -> Result<(), PeripheralError> {
        let dir = self.gpio_dir(pin)?;
        Self::write_attr(pin, &dir.join("direction"), "out").map_err(|e| match e {
            PeripheralError::Io { source, .. } => PeripheralError::Refused {
                pin,
                reason: source.to_string(),
            },
            other => other,
        })
    }

    fn write_pin(&mut self, pin: u32, level: Level) -> Result<(), PeripheralError> {
        let dir = self.gpio_dir(pin)?;
        Self::write_attr(pin, &dir.join("value"), level.as_str())
    }

    fn pwm_enable(&mut self, pin: u32, enabled: bool) -> Result<(), PeripheralError> {
        let dir = self.pwm_dir(pin)?;
        Self::write_attr(pin, &dir.join("enable"), if enabled { "1" } else { "0" })
    }

    fn pwm_set(&mut self, pin: u32, period: Duration, duty: f32) -> Result<(), PeripheralError> {
        let dir = self.pwm_dir(pin)?;
        let period_ns = period.as_nanos() as u64;
        let duty_ns = (period_ns as f64 * duty.clamp(0.0, 1.0) as f64).round() as u64;

        // Kernel rejects duty_cycle > period, so lower duty before touching period
        Self::write_attr(pin, &dir.join("duty_cycle"), "0")?;
        Self::write_attr(pin, &dir.join("period"), &period_ns.to_string())?;
        Self::write_attr(pin, &dir.join("duty_cycle"), &duty_ns.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_tree(name: &str) -> (PathBuf, PathBuf, PathBuf) {
        let root = std::env::temp_dir().join(format!("rover-sysfs-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        let gpio = root.join("gpio");
        let chip = root.join("pwmchip0");
        fs::create_dir_all(gpio.join("gpio46")).unwrap();
        fs::create_dir_all(chip.join("pwm0")).unwrap();
        (root, gpio, chip)
    }

    #[test]
    fn test_gpio_writes_direction_and_value() {
        let (root, gpio, chip) = fake_tree("gpio");
        let mut hw = SysfsPeripheral::with_roots(&gpio, &chip);

        hw.configure_output(46).unwrap();
        hw.write_pin(46, Level::High).unwrap();

        assert_eq!(fs::read_to_string(gpio.join("gpio46/direction")).unwrap(), "out");
        assert_eq!(fs::read_to_string(gpio.join("gpio46/value")).unwrap(), "1");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_pwm_duty_in_nanoseconds() {
        let (root, gpio, chip) = fake_tree("pwm");
        let mut hw = SysfsPeripheral::with_roots(&gpio, &chip);

        hw.pwm_enable(0, true).unwrap();
        hw.pwm_set(0, Duration::from_millis(1), 0.4).unwrap();

        assert_eq!(fs::read_to_string(chip.join("pwm0/enable")).unwrap(), "1");
        assert_eq!(fs::read_to_string(chip.join("pwm0/period")).unwrap(), "1000000");
        assert_eq!(fs::read_to_string(chip.join("pwm0/duty_cycle")).unwrap(), "400000");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn test_missing_pwm_chip_is_unavailable() {
        let mut hw = SysfsPeripheral::with_roots("/nonexistent/gpio", "/nonexistent/pwmchip9");
        assert!(matches!(
            hw.pwm_enable(3, true),
            Err(PeripheralError::Unavailable { pin: 3 })
        ));
    }
}
