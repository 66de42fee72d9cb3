//! Ambient sensor subsystem (§4.8): a static registry of known I2C
//! sensors, probed at start and polled inline from the sample loop at a
//! fraction of the block rate. Grounded in the original instrument's
//! two-sensor set (a combined pressure/humidity/temperature part and an
//! ambient-light part); the register-level protocol of each is an
//! external collaborator (§1), not reimplemented here.

pub mod file;
pub mod i2c_dev;
pub mod sensor;

use log::warn;

use sensor::{AmbientValue, Sensor};

/// Every sensor variant this build knows how to probe for. Kept as a
/// sum type rather than function pointers, per §9's design note.
#[derive(Clone, Copy, Debug)]
pub enum SensorKind {
    Bme280,
    Tsl4531,
}

const KNOWN_SENSORS: [SensorKind; 2] = [SensorKind::Bme280, SensorKind::Tsl4531];

/// The I2C bus ambient sensors live on.
pub const AMBIENT_I2C_PATH: &str = "/dev/i2c-2";

/// Live sensors discovered on this bus, in probe order.
pub struct Registry {
    live: Vec<Box<dyn Sensor>>,
}

impl Registry {
    pub fn empty() -> Self {
        Registry { live: Vec::new() }
    }

    /// `discover()`: probes every known sensor's fixed address; a
    /// failed probe silently drops that candidate (§4.8).
    pub fn discover(bus: &dyn sensor::I2cBus) -> Self {
        let mut live = Vec::new();
        for kind in KNOWN_SENSORS.iter() {
            match sensor::open(*kind, bus) {
                Ok(s) => live.push(s),
                Err(e) => warn!("ambient sensor {:?} not present: {}", kind, e),
            }
        }
        Registry { live }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Sensor names in registry order, fixing the ambient file's column
    /// layout at the moment it is opened (§4.8 `emit`).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.live.iter().map(|s| s.name())
    }

    /// Identifiers of the sensors currently live, for the status
    /// segment's `sensor_index` list.
    pub fn kind_indices(&self) -> Vec<i32> {
        self.live
            .iter()
            .map(|s| match s.name() {
                "bme280" => 0,
                "tsl4531" => 1,
                _ => -1,
            })
            .collect()
    }

    /// `read_all()`: reads every live sensor; a transaction failure
    /// drops that sensor from the registry for the rest of the
    /// measurement and continues with the rest (§7/§4.8).
    pub fn read_all(&mut self, bus: &dyn sensor::I2cBus) -> Vec<AmbientValue> {
        let mut values = Vec::new();
        let mut still_live = Vec::new();
        for mut s in self.live.drain(..) {
            match s.read(bus).and_then(|()| s.get_value(bus)) {
                Ok(value) => {
                    values.push(value);
                    still_live.push(s);
                }
                Err(e) => warn!("ambient sensor {} dropped after read error: {}", s.name(), e),
            }
        }
        self.live = still_live;
        values
    }
}

/// `scan_tick` (§4.8): ambient sensors are polled once per file block
/// at the configured update rate, at most once per second overall.
pub fn should_scan(block_index: u64, update_rate: u32) -> bool {
    update_rate > 0 && block_index % update_rate as u64 == 0
}

pub fn poll(
    registry: &mut Registry,
    bus: &dyn sensor::I2cBus,
    block_index: u64,
    update_rate: u32,
) -> Option<Vec<AmbientValue>> {
    if !should_scan(block_index, update_rate) || registry.is_empty() {
        return None;
    }
    Some(registry.read_all(bus))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_tick_rate_limits_to_once_per_update_period() {
        assert!(should_scan(0, 10));
        assert!(!should_scan(1, 10));
        assert!(should_scan(10, 10));
    }

    #[test]
    fn scan_tick_every_block_at_one_hz_update() {
        for i in 0..5 {
            assert!(should_scan(i, 1));
        }
    }
}
