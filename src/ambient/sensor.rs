//! I2C sensor interface (§1, §4.8): the register-level protocol of each
//! chip is an external collaborator, exposed here only through
//! `init`/`read`/`get_value` per the out-of-scope boundary. The two
//! concrete sensors are grounded in the original instrument's registry
//! (a BME280-class combined pressure/humidity/temperature part at a
//! fixed left address, and a TSL4531-class ambient-light part at one
//! of two fixed addresses).

use crate::channel::Unit;
use crate::error::{Error, Result};

/// One physical value read from a sensor, tagged with its file unit and
/// decimal scale exponent so it slots directly into an ambient file
/// channel descriptor (§4.8 `emit`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientValue {
    pub unit: Unit,
    pub scale_exponent: i32,
    pub raw: i32,
}

/// Minimal I2C transaction surface a sensor needs; the PWM/GPIO bus
/// setup itself is out of scope (§1) and implemented elsewhere.
pub trait I2cBus {
    fn write_register(&self, address: u8, register: u8, value: u8) -> Result<()>;
    fn read_register(&self, address: u8, register: u8) -> Result<u8>;
    fn read_block(&self, address: u8, register: u8, buf: &mut [u8]) -> Result<()>;
}

pub trait Sensor {
    fn name(&self) -> &'static str;
    /// Triggers a conversion; separated from `get_value` because some
    /// chips (BME280) need a settling delay between the two (§4.8).
    fn read(&mut self, bus: &dyn I2cBus) -> Result<()>;
    fn get_value(&self, bus: &dyn I2cBus) -> Result<AmbientValue>;
}

const BME280_ADDRESS: u8 = 0x76;
const BME280_REG_ID: u8 = 0xD0;
const BME280_ID: u8 = 0x60;
const BME280_REG_CONTROL_MEASURE: u8 = 0xF4;
const BME280_REG_TEMPERATURE_MSB: u8 = 0xFA;

const TSL4531_ADDRESSES: [u8; 2] = [0x29, 0x28];
const TSL4531_REG_ID: u8 = 0x0A;
const TSL4531_ID: u8 = 0xA2;
const TSL4531_COMMAND: u8 = 0x80;
const TSL4531_REG_CONTROL: u8 = 0x00;
const TSL4531_SAMPLE_SINGLE: u8 = 0x02;
const TSL4531_REG_DATALOW: u8 = 0x04;

pub struct Bme280 {
    address: u8,
}

impl Sensor for Bme280 {
    fn name(&self) -> &'static str {
        "bme280"
    }

    fn read(&mut self, bus: &dyn I2cBus) -> Result<()> {
        bus.write_register(self.address, BME280_REG_CONTROL_MEASURE, 0x25)
    }

    fn get_value(&self, bus: &dyn I2cBus) -> Result<AmbientValue> {
        let mut raw = [0u8; 3];
        bus.read_block(self.address, BME280_REG_TEMPERATURE_MSB, &mut raw)?;
        let value = ((raw[0] as i32) << 12) | ((raw[1] as i32) << 4) | (raw[2] as i32 >> 4);
        Ok(AmbientValue { unit: Unit::DegreesCelsius, scale_exponent: -2, raw: value })
    }
}

pub struct Tsl4531 {
    address: u8,
}

impl Sensor for Tsl4531 {
    fn name(&self) -> &'static str {
        "tsl4531"
    }

    fn read(&mut self, bus: &dyn I2cBus) -> Result<()> {
        bus.write_register(self.address, TSL4531_COMMAND | TSL4531_REG_CONTROL, TSL4531_SAMPLE_SINGLE)
    }

    fn get_value(&self, bus: &dyn I2cBus) -> Result<AmbientValue> {
        let mut raw = [0u8; 2];
        bus.read_block(self.address, TSL4531_COMMAND | TSL4531_REG_DATALOW, &mut raw)?;
        let value = (raw[1] as i32) << 8 | raw[0] as i32;
        Ok(AmbientValue { unit: Unit::Lux, scale_exponent: 0, raw: value })
    }
}

/// No-op bus for runs with `ambient_enable = false`: never consulted,
/// since [`super::Registry::discover`] is only called when ambient
/// sensing is on, but a concrete value is still needed to build a
/// [`crate::lifecycle::Measurement`].
pub struct NullI2cBus;

impl I2cBus for NullI2cBus {
    fn write_register(&self, _address: u8, _register: u8, _value: u8) -> Result<()> {
        Err(Error::hardware("ambient sensing disabled"))
    }
    fn read_register(&self, _address: u8, _register: u8) -> Result<u8> {
        Err(Error::hardware("ambient sensing disabled"))
    }
    fn read_block(&self, _address: u8, _register: u8, _buf: &mut [u8]) -> Result<()> {
        Err(Error::hardware("ambient sensing disabled"))
    }
}

/// Probes a sensor variant's fixed address(es) and returns a live
/// handle on success (§4.8 `discover`).
pub fn open(kind: super::SensorKind, bus: &dyn I2cBus) -> Result<Box<dyn Sensor>> {
    match kind {
        super::SensorKind::Bme280 => {
            let id = bus.read_register(BME280_ADDRESS, BME280_REG_ID)?;
            if id != BME280_ID {
                return Err(Error::hardware("bme280 id mismatch"));
            }
            Ok(Box::new(Bme280 { address: BME280_ADDRESS }))
        }
        super::SensorKind::Tsl4531 => {
            for &address in TSL4531_ADDRESSES.iter() {
                if let Ok(id) = bus.read_register(address, TSL4531_COMMAND | TSL4531_REG_ID) {
                    if id == TSL4531_ID {
                        return Ok(Box::new(Tsl4531 { address }));
                    }
                }
            }
            Err(Error::hardware("tsl4531 not found at either address"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakeBus {
        registers: RefCell<HashMap<(u8, u8), u8>>,
    }

    impl I2cBus for FakeBus {
        fn write_register(&self, address: u8, register: u8, value: u8) -> Result<()> {
            self.registers.borrow_mut().insert((address, register), value);
            Ok(())
        }
        fn read_register(&self, address: u8, register: u8) -> Result<u8> {
            self.registers
                .borrow()
                .get(&(address, register))
                .copied()
                .ok_or_else(|| Error::hardware("no such register"))
        }
        fn read_block(&self, address: u8, register: u8, buf: &mut [u8]) -> Result<()> {
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = self
                    .registers
                    .borrow()
                    .get(&(address, register + i as u8))
                    .copied()
                    .unwrap_or(0);
            }
            Ok(())
        }
    }

    #[test]
    fn bme280_probe_fails_without_matching_id() {
        let bus = FakeBus { registers: RefCell::new(HashMap::new()) };
        assert!(open(super::super::SensorKind::Bme280, &bus).is_err());
    }

    #[test]
    fn bme280_probe_succeeds_with_matching_id() {
        let bus = FakeBus { registers: RefCell::new(HashMap::new()) };
        bus.write_register(BME280_ADDRESS, BME280_REG_ID, BME280_ID).unwrap();
        assert!(open(super::super::SensorKind::Bme280, &bus).is_ok());
    }

    #[test]
    fn tsl4531_probe_tries_both_addresses() {
        let bus = FakeBus { registers: RefCell::new(HashMap::new()) };
        bus.write_register(TSL4531_ADDRESSES[1], TSL4531_COMMAND | TSL4531_REG_ID, TSL4531_ID)
            .unwrap();
        assert!(open(super::super::SensorKind::Tsl4531, &bus).is_ok());
    }
}
