//! Peripheral setup (§1, §5): GPIO force-range, status/error LEDs, the
//! button interrupt line, and the PWM clocks driving the ADC and range
//! latch. Out of scope per §1 — this module only specifies the
//! interface the lifecycle and driver call through.

use crate::error::Result;

/// Hardware collaborator the lifecycle drives during a measurement.
/// A concrete implementation talks to sysfs GPIO/PWM; tests use a
/// recording fake.
pub trait HardwareControl {
    /// Starts the PWM clocks feeding the ADC and the range-reset latch.
    fn start_clocks(&mut self) -> Result<()>;
    fn stop_clocks(&mut self) -> Result<()>;
    /// Forces a current port to its high range regardless of the
    /// measured value, per `channel_force_range` (§3).
    fn set_force_high(&mut self, port: usize, forced: bool) -> Result<()>;
    fn set_status_led(&mut self, on: bool) -> Result<()>;
    fn set_error_led(&mut self, on: bool) -> Result<()>;
    /// Raw level of the button GPIO; used by the button daemon's edge
    /// wait (§4.7).
    fn read_button(&self) -> Result<bool>;
    /// Holds the cape power-enable line high; owned by the button
    /// daemon for its entire lifetime (§4.7).
    fn set_power_enable(&mut self, on: bool) -> Result<()>;
}

/// No-op hardware backend: used where a lifecycle step must run
/// without a board attached (development, and this crate's own
/// tests).
#[derive(Default)]
pub struct NullHardware {
    pub status_led: bool,
    pub error_led: bool,
    pub power_enable: bool,
}

impl HardwareControl for NullHardware {
    fn start_clocks(&mut self) -> Result<()> {
        Ok(())
    }
    fn stop_clocks(&mut self) -> Result<()> {
        Ok(())
    }
    fn set_force_high(&mut self, _port: usize, _forced: bool) -> Result<()> {
        Ok(())
    }
    fn set_status_led(&mut self, on: bool) -> Result<()> {
        self.status_led = on;
        Ok(())
    }
    fn set_error_led(&mut self, on: bool) -> Result<()> {
        self.error_led = on;
        Ok(())
    }
    fn read_button(&self) -> Result<bool> {
        Ok(false)
    }
    fn set_power_enable(&mut self, on: bool) -> Result<()> {
        self.power_enable = on;
        Ok(())
    }
}
