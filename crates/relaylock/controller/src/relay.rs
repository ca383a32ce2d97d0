//! The relay that opens the cash register

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, trace, warn};

/// Default sysfs GPIO directory
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A binary output driving the relay
pub trait RelayActuator: Send + fmt::Debug {
    /// Energise or release the relay
    fn set_active(&mut self, active: bool) -> io::Result<()>;

    /// Energise the relay for `duration`, then release it
    fn pulse(&mut self, duration: Duration) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Sized,
    {
        async move {
            debug!(?duration, "Pulsing relay");
            self.set_active(true)?;
            tokio::time::sleep(duration).await;
            if let Err(e) = self.set_active(false) {
                warn!(error = %e, "Failed to release relay, retrying");
                self.set_active(false).inspect_err(|e| {
                    error!(error = %e, "Relay is still energised");
                })?;
            }
            Ok(())
        }
    }
}

impl<T: RelayActuator + ?Sized> RelayActuator for Box<T> {
    fn set_active(&mut self, active: bool) -> io::Result<()> {
        (**self).set_active(active)
    }
}

/// Relay on a GPIO line exported through the Linux sysfs interface
pub struct SysfsGpioRelay {
    pin: u32,
    value_path: PathBuf,
    active_low: bool,
}

impl fmt::Debug for SysfsGpioRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysfsGpioRelay")
            .field("pin", &self.pin)
            .field("active_low", &self.active_low)
            .finish()
    }
}

impl SysfsGpioRelay {
    /// Export `pin` as an output, released
    pub fn open(pin: u32, active_low: bool) -> io::Result<Self> {
        Self::open_at(SYSFS_GPIO_ROOT, pin, active_low)
    }

    /// Like [`SysfsGpioRelay::open`] below a different sysfs GPIO directory
    pub fn open_at(root: impl AsRef<Path>, pin: u32, active_low: bool) -> io::Result<Self> {
        let root = root.as_ref();
        let line = root.join(format!("gpio{pin}"));
        if !line.exists() {
            fs::write(root.join("export"), pin.to_string())?;
        }

        // "high"/"low" set the direction and the initial level in one step
        let released = if active_low { "high" } else { "low" };
        fs::write(line.join("direction"), released)?;

        Ok(Self {
            pin,
            value_path: line.join("value"),
            active_low,
        })
    }
}

impl RelayActuator for SysfsGpioRelay {
    fn set_active(&mut self, active: bool) -> io::Result<()> {
        let level = active != self.active_low;
        trace!(pin = self.pin, active, level, "Driving relay");
        fs::write(&self.value_path, if level { "1" } else { "0" })
    }
}
