//! Coin acceptor input and indicator LED on Linux sysfs GPIO.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{SignalConfig, SignalKind};
use crate::error::SignalError;

/// Hardware the booth reads the coin line from and blinks the indicator on.
pub trait SignalSource: Send + Sync {
    /// `true` while a coin pulse is present.
    fn read(&self) -> Result<bool, SignalError>;
    fn write_indicator(&self, on: bool) -> Result<(), SignalError>;
}

/// Acquire the configured signal source. Failing here aborts startup.
pub fn open(cfg: &SignalConfig) -> Result<Arc<dyn SignalSource>, SignalError> {
    match cfg.kind {
        SignalKind::Gpio => Ok(Arc::new(SysfsGpio::open(cfg)?)),
        SignalKind::Disabled => {
            info!("coin input disabled; sessions start only via force-insert");
            Ok(Arc::new(DisabledSignal))
        }
    }
}

/// Never reports a coin. Used on development machines without GPIO.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSignal;

impl SignalSource for DisabledSignal {
    fn read(&self) -> Result<bool, SignalError> {
        Ok(false)
    }

    fn write_indicator(&self, _on: bool) -> Result<(), SignalError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    coin_pin: u32,
    led_pin: Option<u32>,
    active_low: bool,
    /// Pins this process exported and must unexport on drop.
    exported: Vec<u32>,
}

const EXPORT_SETTLE_ATTEMPTS: u32 = 10;
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(50);

impl SysfsGpio {
    pub fn open(cfg: &SignalConfig) -> Result<Self, SignalError> {
        let mut gpio = Self {
            root: cfg.sysfs_root.clone(),
            coin_pin: cfg.coin_pin,
            led_pin: cfg.led_pin,
            active_low: cfg.active_low,
            exported: Vec::new(),
        };
        gpio.export(cfg.coin_pin)?;
        gpio.set_direction(cfg.coin_pin, "in")?;
        if let Some(led) = cfg.led_pin {
            gpio.export(led)?;
            gpio.set_direction(led, "out")?;
            gpio.write_value(led, false)?;
        }
        info!(
            coin_pin = cfg.coin_pin,
            led_pin = ?cfg.led_pin,
            root = %gpio.root.display(),
            "GPIO lines acquired"
        );
        Ok(gpio)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn export(&mut self, pin: u32) -> Result<(), SignalError> {
        if self.pin_dir(pin).exists() {
            debug!(pin, "GPIO already exported");
            return Ok(());
        }
        let path = self.root.join("export");
        fs::write(&path, pin.to_string()).map_err(|source| SignalError::Io {
            action: "export GPIO via",
            path,
            source,
        })?;
        self.exported.push(pin);
        Ok(())
    }

    fn set_direction(&self, pin: u32, direction: &str) -> Result<(), SignalError> {
        let path = self.pin_dir(pin).join("direction");
        // udev fixes permissions on freshly exported lines asynchronously.
        let mut attempt = 0;
        loop {
            match fs::write(&path, direction) {
                Ok(()) => return Ok(()),
                Err(err)
                    if attempt < EXPORT_SETTLE_ATTEMPTS
                        && matches!(
                            err.kind(),
                            io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
                        ) =>
                {
                    attempt += 1;
                    thread::sleep(EXPORT_SETTLE_DELAY);
                }
                Err(source) => {
                    return Err(SignalError::Io {
                        action: "set direction on",
                        path,
                        source,
                    });
                }
            }
        }
    }

    fn read_value(&self, pin: u32) -> Result<bool, SignalError> {
        let path = self.pin_dir(pin).join("value");
        let raw = fs::read_to_string(&path).map_err(|source| SignalError::Io {
            action: "read",
            path: path.clone(),
            source,
        })?;
        match raw.trim() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(SignalError::BadValue {
                path,
                value: other.to_string(),
            }),
        }
    }

    fn write_value(&self, pin: u32, high: bool) -> Result<(), SignalError> {
        let path = self.pin_dir(pin).join("value");
        fs::write(&path, if high { "1" } else { "0" }).map_err(|source| SignalError::Io {
            action: "write",
            path,
            source,
        })
    }

    fn unexport(&self, pin: u32) {
        let path = self.root.join("unexport");
        if let Err(err) = fs::write(&path, pin.to_string()) {
            warn!(pin, path = %path.display(), error = %err, "failed to unexport GPIO");
        }
    }
}

impl SignalSource for SysfsGpio {
    fn read(&self) -> Result<bool, SignalError> {
        Ok(self.read_value(self.coin_pin)? != self.active_low)
    }

    fn write_indicator(&self, on: bool) -> Result<(), SignalError> {
        match self.led_pin {
            Some(led) => self.write_value(led, on),
            None => Ok(()),
        }
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        if let Some(led) = self.led_pin
            && let Err(err) = self.write_value(led, false)
        {
            warn!(error = %err, "failed to switch indicator off during cleanup");
        }
        let exported = std::mem::take(&mut self.exported);
        for pin in exported {
            self.unexport(pin);
        }
        debug!("GPIO lines released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn fake_sysfs(coin: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for pin in [17, 27] {
            let pin_dir = dir.path().join(format!("gpio{pin}"));
            fs::create_dir_all(&pin_dir).unwrap();
            fs::write(pin_dir.join("direction"), "in").unwrap();
            fs::write(pin_dir.join("value"), "0").unwrap();
        }
        fs::write(dir.path().join("gpio17/value"), coin).unwrap();
        dir
    }

    fn config(root: &Path) -> SignalConfig {
        SignalConfig {
            sysfs_root: root.to_path_buf(),
            ..SignalConfig::default()
        }
    }

    #[test]
    fn reads_coin_line_and_configures_directions() {
        let dir = fake_sysfs("1\n");
        let gpio = SysfsGpio::open(&config(dir.path())).unwrap();
        assert!(gpio.read().unwrap());
        assert_eq!(fs::read_to_string(dir.path().join("gpio17/direction")).unwrap(), "in");
        assert_eq!(fs::read_to_string(dir.path().join("gpio27/direction")).unwrap(), "out");
    }

    #[test]
    fn active_low_inverts_reading() {
        let dir = fake_sysfs("0");
        let mut cfg = config(dir.path());
        cfg.active_low = true;
        let gpio = SysfsGpio::open(&cfg).unwrap();
        assert!(gpio.read().unwrap());
    }

    #[test]
    fn indicator_is_switched_off_on_drop() {
        let dir = fake_sysfs("0");
        let gpio = SysfsGpio::open(&config(dir.path())).unwrap();
        gpio.write_indicator(true).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("gpio27/value")).unwrap(), "1");
        drop(gpio);
        assert_eq!(fs::read_to_string(dir.path().join("gpio27/value")).unwrap(), "0");
    }

    #[test]
    fn garbage_value_is_reported() {
        let dir = fake_sysfs("x");
        let gpio = SysfsGpio::open(&config(dir.path())).unwrap();
        assert!(matches!(gpio.read(), Err(SignalError::BadValue { .. })));
    }

    #[test]
    fn missing_sysfs_aborts_open() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("absent"));
        assert!(SysfsGpio::open(&cfg).is_err());
    }
}
