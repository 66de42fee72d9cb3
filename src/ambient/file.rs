//! Ambient file emission (§4.8 `emit`): a binary lead-in/descriptor
//! structure mirroring §4.3, but for the sensor channels discovered at
//! start rather than the fixed analog/digital set.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::binformat::WriteLe;
use crate::error::{Error, Result};
use crate::file::{CHANNEL_DESCRIPTOR_LENGTH, CHANNEL_NAME_LENGTH, FILE_MAGIC, FILE_VERSION};

use super::sensor::AmbientValue;

/// Derives the sibling ambient file path: `-ambient` spliced in before
/// the extension, matching `ambient_set_file_name`'s `data.rld` ->
/// `data-ambient.rld` convention.
pub fn ambient_path(data_path: &Path) -> PathBuf {
    let stem = data_path.file_stem().and_then(|s| s.to_str()).unwrap_or("data");
    let file_name = match data_path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}-ambient.{}", stem, ext),
        None => format!("{}-ambient", stem),
    };
    match data_path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

pub struct AmbientFile {
    file: File,
    sensor_count: u16,
}

impl AmbientFile {
    pub fn create(path: &Path, sensor_names: &[&str]) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::resource("ambient file", e))?;

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let mut header = Vec::new();
        header.put_u32(FILE_MAGIC);
        header.put_u16(FILE_VERSION);
        header.put_u64(now.as_secs());
        header.put_u16(sensor_names.len() as u16);
        file.write_all(&header).map_err(|e| Error::resource("ambient file", e))?;

        for name in sensor_names {
            let mut descriptor = Vec::with_capacity(CHANNEL_DESCRIPTOR_LENGTH);
            let mut name_bytes = name.as_bytes().to_vec();
            name_bytes.resize(CHANNEL_NAME_LENGTH, 0);
            descriptor.extend_from_slice(&name_bytes);
            file.write_all(&descriptor).map_err(|e| Error::resource("ambient file", e))?;
        }

        Ok(AmbientFile { file, sensor_count: sensor_names.len() as u16 })
    }

    /// Appends one row: a millisecond timestamp then one raw value per
    /// column fixed at `create` time, in registry order (§4.8). A sensor
    /// the registry has since dropped (§7) writes as zero rather than
    /// shrinking the row, keeping every row the header's fixed width.
    pub fn append(&mut self, timestamp_ms: i64, values: &[AmbientValue]) -> Result<()> {
        let mut row = Vec::new();
        row.put_i64(timestamp_ms);
        for i in 0..self.sensor_count as usize {
            row.put_i32(values.get(i).map(|v| v.raw).unwrap_or(0));
        }
        self.file.write_all(&row).map_err(|e| Error::resource("ambient file", e))
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::resource("ambient file", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Unit;

    #[test]
    fn create_then_append_writes_header_and_row() {
        let path =
            std::env::temp_dir().join(format!("rocketlogger-ambient-{}.dat", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut file = AmbientFile::create(&path, &["bme280", "tsl4531"]).unwrap();
        file.append(
            1000,
            &[
                AmbientValue { unit: Unit::DegreesCelsius, scale_exponent: -2, raw: 2350 },
                AmbientValue { unit: Unit::Lux, scale_exponent: 0, raw: 120 },
            ],
        )
        .unwrap();
        file.sync().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() > 16);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn ambient_path_splices_suffix_before_extension() {
        assert_eq!(
            ambient_path(Path::new("/data/data.rld")),
            PathBuf::from("/data/data-ambient.rld")
        );
    }
}
