//! Calibration store (§4.4): per-channel offset/scale pairs loaded from
//! a small versioned file. A missing or mismatched file is not an error
//! for the caller — it degrades to the identity calibration and a log
//! warning, matching the original instrument's behavior.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use log::warn;

use crate::binformat::{Reader, WriteLe};
use crate::channel::ANALOG_CHANNEL_COUNT;
use crate::error::{Error, Result};

pub const CALIBRATION_MAGIC: u32 = 0x434C_5225;
pub const CALIBRATION_VERSION: u16 = 0x02;
pub const CALIBRATION_HEADER_LENGTH: u16 = 0x10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub offsets: [i32; ANALOG_CHANNEL_COUNT],
    pub scales: [f64; ANALOG_CHANNEL_COUNT],
    /// Unix timestamp the calibration measurement was generated at; 0 if
    /// this is the identity calibration (no file, or `calibration_ignore`).
    pub generation_time: u64,
}

impl Default for Calibration {
    /// Identity calibration: `output = raw` unchanged.
    fn default() -> Self {
        Calibration {
            offsets: [0; ANALOG_CHANNEL_COUNT],
            scales: [1.0; ANALOG_CHANNEL_COUNT],
            generation_time: 0,
        }
    }
}

impl Calibration {
    /// `output = (raw + offset) * scale`, rounded back to the file's
    /// integer representation (§4.2 step 2).
    pub fn apply(&self, channel: usize, raw: i32) -> i32 {
        let calibrated = (raw as f64 + self.offsets[channel] as f64) * self.scales[channel];
        calibrated.round() as i32
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CALIBRATION_HEADER_LENGTH as usize + 8 * ANALOG_CHANNEL_COUNT * 2);
        buf.put_u32(CALIBRATION_MAGIC);
        buf.put_u16(CALIBRATION_VERSION);
        buf.put_u16(CALIBRATION_HEADER_LENGTH);
        buf.put_u64(self.generation_time);
        for &offset in &self.offsets {
            buf.put_i32(offset);
        }
        for &scale in &self.scales {
            buf.put_f64(scale);
        }
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Calibration> {
        let mut r = Reader::new(Cursor::new(bytes));
        let magic = r.u32()?;
        if magic != CALIBRATION_MAGIC {
            return Err(Error::configuration("bad calibration file magic"));
        }
        let version = r.u16()?;
        if version != CALIBRATION_VERSION {
            return Err(Error::configuration(format!(
                "unsupported calibration version {}",
                version
            )));
        }
        let _header_length = r.u16()?;
        let generation_time = r.u64()?;
        let mut offsets = [0i32; ANALOG_CHANNEL_COUNT];
        for slot in offsets.iter_mut() {
            *slot = r.i32()?;
        }
        let mut scales = [0f64; ANALOG_CHANNEL_COUNT];
        for slot in scales.iter_mut() {
            *slot = r.f64()?;
        }
        Ok(Calibration { offsets, scales, generation_time })
    }

    /// Loads calibration from `path`. Never fails: a missing file,
    /// magic/version mismatch, or truncated read all degrade to the
    /// identity calibration with a warning, per §4.4/§7.
    pub fn load(path: &Path) -> Calibration {
        match fs::read(path) {
            Ok(bytes) => match Calibration::decode(&bytes) {
                Ok(calibration) => calibration,
                Err(e) => {
                    warn!("calibration file {} is invalid: {}; using identity calibration", path.display(), e);
                    Calibration::default()
                }
            },
            Err(e) => {
                warn!("no calibration file at {} ({}); using identity calibration", path.display(), e);
                Calibration::default()
            }
        }
    }

    /// `calibration_ignore` forces identity unconditionally, but the
    /// caller still records `generation_time == 0` in status (§4.4).
    pub fn load_or_identity(path: &Path, ignore: bool) -> Calibration {
        if ignore {
            Calibration::default()
        } else {
            Calibration::load(path)
        }
    }

    /// Atomic write: temp file then rename, matching the config store.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::from)?;
        }
        let tmp = path.with_extension("dat.tmp");
        fs::write(&tmp, self.encode()).map_err(Error::from)?;
        fs::rename(&tmp, path).map_err(Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_through_encode_decode() {
        let mut cal = Calibration::default();
        cal.offsets[0] = -42;
        cal.scales[0] = 1.0000321;
        cal.generation_time = 1_700_000_000;

        assert_eq!(cal, Calibration::decode(&cal.encode()).unwrap());
    }

    #[test]
    fn missing_file_yields_identity() {
        let cal = Calibration::load(Path::new("/nonexistent/path/to/calibration.dat"));
        assert_eq!(cal, Calibration::default());
    }

    #[test]
    fn apply_adds_offset_then_scales() {
        let mut cal = Calibration::default();
        cal.offsets[2] = 10;
        cal.scales[2] = 2.0;
        assert_eq!(cal.apply(2, 5), 30);
    }
}
