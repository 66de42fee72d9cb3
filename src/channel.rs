//! Channel identity: the fixed set of analog/digital channels and the
//! units/scales the file container (§4.3) and live view (§4.5) need to
//! talk about them.

use strum_macros::{Display, EnumIter};

/// Number of analog channels sampled by the ADC front end.
pub const ANALOG_CHANNEL_COUNT: usize = 8;
/// Number of digital inputs.
pub const DIGITAL_CHANNEL_COUNT: usize = 6;
/// Number of current ports that can be force-switched to high range.
pub const SWITCHED_CHANNEL_COUNT: usize = 2;
/// Sentinel meaning "no companion range-valid channel".
pub const NO_VALID_DATA: u16 = 0xFFFF;

/// One of the eight fixed analog acquisition channels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display, EnumIter)]
pub enum AnalogChannel {
    V1,
    V2,
    V3,
    V4,
    I1L,
    I1H,
    I2L,
    I2H,
}

impl AnalogChannel {
    pub const ALL: [AnalogChannel; ANALOG_CHANNEL_COUNT] = [
        AnalogChannel::V1,
        AnalogChannel::V2,
        AnalogChannel::V3,
        AnalogChannel::V4,
        AnalogChannel::I1L,
        AnalogChannel::I1H,
        AnalogChannel::I2L,
        AnalogChannel::I2H,
    ];

    /// Index into the 8-wide ADC sample row and config enable array.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn unit(self) -> Unit {
        match self {
            AnalogChannel::V1 | AnalogChannel::V2 | AnalogChannel::V3 | AnalogChannel::V4 => {
                Unit::Volt
            }
            _ => Unit::Ampere,
        }
    }

    /// Decimal exponent applied to the raw calibrated integer to reach SI
    /// units, matching the original instrument's fixed per-channel scales.
    pub fn scale_exponent(self) -> i32 {
        match self {
            AnalogChannel::I1L | AnalogChannel::I2L => -11, // ten-pico
            AnalogChannel::I1H | AnalogChannel::I2H => -9,  // nano
            _ => -8,                                        // ten-nano (voltage)
        }
    }

    /// True for the two low-range current channels that carry a
    /// range-valid companion bit.
    pub fn is_low_range(self) -> bool {
        matches!(self, AnalogChannel::I1L | AnalogChannel::I2L)
    }

    pub fn is_high_range(self) -> bool {
        matches!(self, AnalogChannel::I1H | AnalogChannel::I2H)
    }

    /// The other half of this channel's {low, high} range pair, if any.
    pub fn range_pair(self) -> Option<AnalogChannel> {
        match self {
            AnalogChannel::I1L => Some(AnalogChannel::I1H),
            AnalogChannel::I1H => Some(AnalogChannel::I1L),
            AnalogChannel::I2L => Some(AnalogChannel::I2H),
            AnalogChannel::I2H => Some(AnalogChannel::I2L),
            _ => None,
        }
    }
}

/// One of the six fixed digital inputs, DI1..DI6.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Display, EnumIter)]
pub enum DigitalChannel {
    Di1,
    Di2,
    Di3,
    Di4,
    Di5,
    Di6,
}

impl DigitalChannel {
    pub const ALL: [DigitalChannel; DIGITAL_CHANNEL_COUNT] = [
        DigitalChannel::Di1,
        DigitalChannel::Di2,
        DigitalChannel::Di3,
        DigitalChannel::Di4,
        DigitalChannel::Di5,
        DigitalChannel::Di6,
    ];

    pub fn bit(self) -> usize {
        self as usize
    }
}

/// Unit tag stored in the file channel descriptor (§6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Unit {
    Unitless = 0,
    Volt = 1,
    Ampere = 2,
    Binary = 3,
    RangeValid = 4,
    Lux = 5,
    DegreesCelsius = 6,
    Integer = 7,
    Percent = 8,
    Pascal = 9,
}

impl Unit {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_pairs_are_symmetric() {
        for ch in AnalogChannel::ALL.iter().copied() {
            if let Some(pair) = ch.range_pair() {
                assert_eq!(pair.range_pair(), Some(ch));
            }
        }
    }

    #[test]
    fn low_range_channels_carry_the_finer_scale() {
        assert!(AnalogChannel::I1L.scale_exponent() < AnalogChannel::I1H.scale_exponent());
        assert!(AnalogChannel::I2L.scale_exponent() < AnalogChannel::I2H.scale_exponent());
    }
}
