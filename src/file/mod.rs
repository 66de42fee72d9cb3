//! Measurement file container (§4.3/§6): the `.rld` binary format and
//! its CSV sibling, plus the lazy in-place header update and the
//! size-triggered rollover into `_pN` part files.

pub mod binary;
pub mod csv;

use crate::channel::{AnalogChannel, Unit, DIGITAL_CHANNEL_COUNT, NO_VALID_DATA};
use crate::config::Config;

pub const FILE_MAGIC: u32 = 0x444C_5225;
pub const FILE_VERSION: u16 = 0x0003;
pub const LEAD_IN_LENGTH: usize = 56;
/// The struct this mirrors (`rl_file_channel`) is 28 bytes: a 4-byte
/// unit tag, 4-byte scale exponent, two 2-byte fields, and a 16-byte
/// name. The distilled spec text says 24; the original header is the
/// tie-breaker for wire compatibility (see DESIGN.md).
pub const CHANNEL_DESCRIPTOR_LENGTH: usize = 28;
pub const CHANNEL_NAME_LENGTH: usize = 16;

/// The constant-size portion of the file header (§3/§6).
#[derive(Clone, Debug, PartialEq)]
pub struct LeadIn {
    pub magic: u32,
    pub version: u16,
    pub header_length: u16,
    pub data_block_size: u32,
    pub data_block_count: u32,
    pub sample_count: u64,
    pub sample_rate: u16,
    pub mac_address: [u8; 6],
    pub start_time_sec: i64,
    pub start_time_nsec: i64,
    pub comment_length: u32,
    pub channel_bin_count: u16,
    pub channel_count: u16,
}

/// One channel descriptor (§6): unit, decimal scale, datum size, and an
/// optional link to a companion range-valid bit channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelDescriptor {
    pub unit: Unit,
    pub scale: i32,
    pub data_size: u16,
    pub valid_data_channel: u16,
    pub name: String,
}

impl ChannelDescriptor {
    fn binary(name: &str, valid_data_channel: u16) -> Self {
        ChannelDescriptor {
            unit: Unit::Binary,
            scale: 0,
            data_size: 0,
            valid_data_channel,
            name: name.to_owned(),
        }
    }

    fn range_valid(name: &str) -> Self {
        ChannelDescriptor {
            unit: Unit::RangeValid,
            scale: 0,
            data_size: 0,
            valid_data_channel: NO_VALID_DATA,
            name: name.to_owned(),
        }
    }

    fn analog(channel: AnalogChannel, valid_data_channel: u16) -> Self {
        ChannelDescriptor {
            unit: channel.unit(),
            scale: channel.scale_exponent(),
            data_size: 4,
            valid_data_channel,
            name: channel.to_string(),
        }
    }
}

/// The full set of descriptors for a configuration, in on-disk order:
/// digital channels, then range-valid bits, then analog channels
/// (§4.3 `setup_channels`).
pub fn build_channel_descriptors(config: &Config) -> Vec<ChannelDescriptor> {
    let mut descriptors = Vec::new();

    if config.digital_enable {
        static DIGITAL_NAMES: [&str; DIGITAL_CHANNEL_COUNT] =
            ["DI1", "DI2", "DI3", "DI4", "DI5", "DI6"];
        for name in DIGITAL_NAMES.iter() {
            descriptors.push(ChannelDescriptor::binary(name, NO_VALID_DATA));
        }
    }

    let mut valid_bit_positions = Vec::new();
    for (port, low) in [(0usize, AnalogChannel::I1L), (1usize, AnalogChannel::I2L)] {
        if config.channel_enable[low.index()] {
            valid_bit_positions.push((port, descriptors.len() as u16));
            descriptors.push(ChannelDescriptor::range_valid(&format!("I{}L_valid", port + 1)));
        }
    }

    for channel in AnalogChannel::ALL.iter().copied().filter(|ch| config.channel_enable[ch.index()]) {
        let valid_link = if channel.is_low_range() {
            let port = if channel == AnalogChannel::I1L { 0 } else { 1 };
            valid_bit_positions
                .iter()
                .find(|(p, _)| *p == port)
                .map(|(_, idx)| *idx)
                .unwrap_or(NO_VALID_DATA)
        } else {
            NO_VALID_DATA
        };
        descriptors.push(ChannelDescriptor::analog(channel, valid_link));
    }

    descriptors
}

pub fn header_length(config: &Config, comment_len_padded: usize) -> u16 {
    let descriptors = build_channel_descriptors(config);
    (LEAD_IN_LENGTH + comment_len_padded + descriptors.len() * CHANNEL_DESCRIPTOR_LENGTH) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digital_then_valid_bits_then_analog_order() {
        let mut cfg = Config::default();
        cfg.digital_enable = true;
        cfg.channel_enable = [true; 8];

        let descriptors = build_channel_descriptors(&cfg);
        assert_eq!(descriptors[0].unit, Unit::Binary);
        assert_eq!(descriptors[6].unit, Unit::RangeValid);
        assert_eq!(descriptors[7].unit, Unit::RangeValid);
        assert_eq!(descriptors[8].unit, Unit::Volt);
    }

    #[test]
    fn low_range_channel_links_to_its_valid_bit() {
        let mut cfg = Config::default();
        cfg.digital_enable = false;
        cfg.channel_enable = [false, false, false, false, true, true, false, false];

        let descriptors = build_channel_descriptors(&cfg);
        let i1l = descriptors.iter().find(|d| d.name == "I1L").unwrap();
        assert_ne!(i1l.valid_data_channel, NO_VALID_DATA);
    }
}
