//! Measurement configuration (§3): validated, immutable for the duration
//! of a measurement, and persisted to a small versioned binary file the
//! same way the calibration and data-file records are (§10).

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::binformat::{pad_to, Reader, WriteLe};
use crate::channel::{AnalogChannel, Unit, ANALOG_CHANNEL_COUNT, DIGITAL_CHANNEL_COUNT, SWITCHED_CHANNEL_COUNT};
use crate::error::{Error, Result};

/// Config file magic ("%RLC" little-endian), distinguishing it from the
/// `.rld` data format and the calibration format at a glance.
pub const CONFIG_MAGIC: u32 = 0x434C_5225;
pub const CONFIG_VERSION: u8 = 0x03;

const RL_PATH_LENGTH_MAX: usize = 256;

/// Native ADC sample rates the front end can run at; lower rates are
/// realized by aggregating 1 kHz samples (§3).
pub const ALLOWED_SAMPLE_RATES: [u32; 10] =
    [1, 10, 100, 1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000];
/// Block emission rates the pipeline can run at.
pub const ALLOWED_UPDATE_RATES: [u32; 4] = [1, 2, 5, 10];
/// The ADC's own native rate; rates below this are software-aggregated.
pub const ADC_NATIVE_RATE_HZ: u32 = 1_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SamplingMode {
    Finite,
    Continuous,
    Meter,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AggregationMode {
    Downsample,
    Average,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum FileFormat {
    Csv,
    Rld,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub config_version: u8,
    pub sampling_mode: SamplingMode,
    /// 0 means unbounded (continuous).
    pub sample_limit: u64,
    pub sample_rate: u32,
    pub update_rate: u32,
    pub channel_enable: [bool; ANALOG_CHANNEL_COUNT],
    pub channel_force_range: [bool; SWITCHED_CHANNEL_COUNT],
    pub aggregation_mode: AggregationMode,
    pub digital_enable: bool,
    pub web_enable: bool,
    pub calibration_ignore: bool,
    pub ambient_enable: bool,
    pub file_enable: bool,
    pub file_name: PathBuf,
    pub file_format: FileFormat,
    /// 0 means unbounded.
    pub file_size: u64,
    pub comment: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_version: CONFIG_VERSION,
            sampling_mode: SamplingMode::Continuous,
            sample_limit: 0,
            sample_rate: 1_000,
            update_rate: 1,
            channel_enable: [true; ANALOG_CHANNEL_COUNT],
            channel_force_range: [false; SWITCHED_CHANNEL_COUNT],
            aggregation_mode: AggregationMode::Average,
            digital_enable: true,
            web_enable: true,
            calibration_ignore: false,
            ambient_enable: false,
            file_enable: true,
            file_name: PathBuf::from("/var/www/rocketlogger/data/data.rld"),
            file_format: FileFormat::Rld,
            file_size: 0,
            comment: "Sampled using the RocketLogger".to_owned(),
        }
    }
}

impl Config {
    /// Enforces the invariants from §3: rate membership, update ≤ sample,
    /// and force-range flags only on ports that are actually enabled.
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(Error::configuration(format!(
                "sample rate {} Hz is not one of {:?}",
                self.sample_rate, ALLOWED_SAMPLE_RATES
            )));
        }
        if !ALLOWED_UPDATE_RATES.contains(&self.update_rate) {
            return Err(Error::configuration(format!(
                "update rate {} Hz is not one of {:?}",
                self.update_rate, ALLOWED_UPDATE_RATES
            )));
        }
        if self.update_rate > self.sample_rate {
            return Err(Error::configuration(format!(
                "update rate {} Hz exceeds sample rate {} Hz",
                self.update_rate, self.sample_rate
            )));
        }
        for (port, &forced) in self.channel_force_range.iter().enumerate() {
            if forced {
                let high_channel = match port {
                    0 => AnalogChannel::I1H,
                    1 => AnalogChannel::I2H,
                    _ => unreachable!("exactly SWITCHED_CHANNEL_COUNT ports"),
                };
                if !self.channel_enable[high_channel.index()] {
                    return Err(Error::configuration(format!(
                        "force-range set on port {} but its current channel is disabled",
                        port
                    )));
                }
            }
        }
        if self.file_name.as_os_str().len() >= RL_PATH_LENGTH_MAX {
            return Err(Error::configuration("file path too long"));
        }
        Ok(())
    }

    /// Number of native 1 kHz samples aggregated into one output sample.
    pub fn aggregation_factor(&self) -> u32 {
        if self.sample_rate >= ADC_NATIVE_RATE_HZ {
            1
        } else {
            ADC_NATIVE_RATE_HZ / self.sample_rate
        }
    }

    /// Native samples making up one emitted block, at the PRU's own rate.
    pub fn native_samples_per_block(&self) -> u32 {
        self.sample_rate.max(ADC_NATIVE_RATE_HZ) / self.update_rate
    }

    pub fn enabled_analog_channels(&self) -> impl Iterator<Item = AnalogChannel> + '_ {
        AnalogChannel::ALL
            .iter()
            .copied()
            .filter(move |ch| self.channel_enable[ch.index()])
    }

    /// Channel count a live-view row actually carries: voltage channels
    /// count one each, an I1/I2 low/high pair counts one (range-merged
    /// down to a single current) rather than two, plus the digital
    /// channels if enabled.
    pub fn web_channel_count(&self) -> u32 {
        let mut count = 0u32;
        for ch in self.enabled_analog_channels() {
            if ch.unit() == Unit::Volt {
                count += 1;
            }
        }
        if self.channel_enable[AnalogChannel::I1L.index()] || self.channel_enable[AnalogChannel::I1H.index()] {
            count += 1;
        }
        if self.channel_enable[AnalogChannel::I2L.index()] || self.channel_enable[AnalogChannel::I2H.index()] {
            count += 1;
        }
        if self.digital_enable {
            count += DIGITAL_CHANNEL_COUNT as u32;
        }
        count
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.put_u32(CONFIG_MAGIC);
        buf.put_u8(self.config_version);
        buf.put_u8(match self.sampling_mode {
            SamplingMode::Finite => 0,
            SamplingMode::Continuous => 1,
            SamplingMode::Meter => 2,
        });
        buf.put_u64(self.sample_limit);
        buf.put_u32(self.sample_rate);
        buf.put_u32(self.update_rate);
        for &enabled in &self.channel_enable {
            buf.put_u8(enabled as u8);
        }
        for &forced in &self.channel_force_range {
            buf.put_u8(forced as u8);
        }
        buf.put_u8(match self.aggregation_mode {
            AggregationMode::Downsample => 0,
            AggregationMode::Average => 1,
        });
        buf.put_u8(self.digital_enable as u8);
        buf.put_u8(self.web_enable as u8);
        buf.put_u8(self.calibration_ignore as u8);
        buf.put_u8(self.ambient_enable as u8);
        buf.put_u8(self.file_enable as u8);
        let path = self.file_name.to_string_lossy();
        buf.put_u32(path.len() as u32);
        buf.extend_from_slice(path.as_bytes());
        buf.put_u8(match self.file_format {
            FileFormat::Csv => 0,
            FileFormat::Rld => 1,
        });
        buf.put_u64(self.file_size);
        buf.put_u32(self.comment.len() as u32);
        buf.extend_from_slice(self.comment.as_bytes());
        pad_to(&mut buf, 4);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Config> {
        let mut r = Reader::new(Cursor::new(bytes));
        let magic = r.u32()?;
        if magic != CONFIG_MAGIC {
            return Err(Error::configuration("bad config file magic"));
        }
        let config_version = r.u8()?;
        if config_version != CONFIG_VERSION {
            return Err(Error::configuration(format!(
                "unsupported config version {}",
                config_version
            )));
        }
        let sampling_mode = match r.u8()? {
            0 => SamplingMode::Finite,
            1 => SamplingMode::Continuous,
            2 => SamplingMode::Meter,
            other => return Err(Error::configuration(format!("bad sampling mode tag {}", other))),
        };
        let sample_limit = r.u64()?;
        let sample_rate = r.u32()?;
        let update_rate = r.u32()?;
        let mut channel_enable = [false; ANALOG_CHANNEL_COUNT];
        for slot in channel_enable.iter_mut() {
            *slot = r.u8()? != 0;
        }
        let mut channel_force_range = [false; SWITCHED_CHANNEL_COUNT];
        for slot in channel_force_range.iter_mut() {
            *slot = r.u8()? != 0;
        }
        let aggregation_mode = match r.u8()? {
            0 => AggregationMode::Downsample,
            1 => AggregationMode::Average,
            other => return Err(Error::configuration(format!("bad aggregation tag {}", other))),
        };
        let digital_enable = r.u8()? != 0;
        let web_enable = r.u8()? != 0;
        let calibration_ignore = r.u8()? != 0;
        let ambient_enable = r.u8()? != 0;
        let file_enable = r.u8()? != 0;
        let path_len = r.u32()? as usize;
        let path_bytes = r.bytes(path_len)?;
        let file_name = PathBuf::from(String::from_utf8_lossy(&path_bytes).into_owned());
        let file_format = match r.u8()? {
            0 => FileFormat::Csv,
            1 => FileFormat::Rld,
            other => return Err(Error::configuration(format!("bad file format tag {}", other))),
        };
        let file_size = r.u64()?;
        let comment_len = r.u32()? as usize;
        let comment_bytes = r.bytes(comment_len)?;
        let comment = String::from_utf8_lossy(&comment_bytes).into_owned();

        Ok(Config {
            config_version,
            sampling_mode,
            sample_limit,
            sample_rate,
            update_rate,
            channel_enable,
            channel_force_range,
            aggregation_mode,
            digital_enable,
            web_enable,
            calibration_ignore,
            ambient_enable,
            file_enable,
            file_name,
            file_format,
            file_size,
            comment,
        })
    }

    /// Writes this configuration as the user's default, atomically
    /// (temp file + rename) matching the calibration store's discipline.
    pub fn write_default(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::from)?;
        }
        let tmp = path.with_extension("dat.tmp");
        fs::write(&tmp, self.encode()).map_err(Error::from)?;
        fs::rename(&tmp, path).map_err(Error::from)?;
        Ok(())
    }

    /// Reads the user config, falling back to the system config path.
    /// Neither existing is not an error: callers get `Config::default()`.
    pub fn read_default(user_path: &Path, system_path: &Path) -> Result<Config> {
        for path in [user_path, system_path] {
            match fs::read(path) {
                Ok(bytes) => return Config::decode(&bytes),
                Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::from(e)),
            }
        }
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_through_encode_decode() {
        let mut cfg = Config::default();
        cfg.sample_rate = 100;
        cfg.update_rate = 5;
        cfg.comment = "unit test".to_owned();
        cfg.file_name = PathBuf::from("/tmp/test.rld");

        let decoded = Config::decode(&cfg.encode()).unwrap();
        assert_eq!(cfg, decoded);
    }

    #[test]
    fn rejects_update_rate_above_sample_rate() {
        let mut cfg = Config::default();
        cfg.sample_rate = 1;
        cfg.update_rate = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_force_range_on_disabled_port() {
        let mut cfg = Config::default();
        cfg.channel_enable[AnalogChannel::I1H.index()] = false;
        cfg.channel_force_range[0] = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn aggregation_factor_matches_native_rate_ratio() {
        let mut cfg = Config::default();
        cfg.sample_rate = 100;
        assert_eq!(cfg.aggregation_factor(), 10);
        cfg.sample_rate = 1_000;
        assert_eq!(cfg.aggregation_factor(), 1);
    }
}
