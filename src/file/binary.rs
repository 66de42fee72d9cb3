//! Binary `.rld` writer (§4.3, §6): lead-in + channel descriptors +
//! rolling data blocks, with the lazy in-place header update and
//! size-triggered rollover.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;

use crate::binformat::{pad_to, WriteLe};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::pipeline::OutputRow;
use crate::pru::Timestamps;

use super::{
    build_channel_descriptors, ChannelDescriptor, LeadIn, CHANNEL_DESCRIPTOR_LENGTH,
    CHANNEL_NAME_LENGTH, FILE_MAGIC, FILE_VERSION, LEAD_IN_LENGTH,
};

/// A binary measurement file currently being written. Owns the open
/// file handle and enough state to rewrite the lead-in in place after
/// every block (§4.3 `update_header_bin`).
pub struct BinaryFile {
    file: File,
    path: PathBuf,
    /// Original, unsuffixed path; rollover always derives `_pN` from
    /// this rather than from `path`, which becomes the previous part's
    /// suffixed name after the first rollover.
    base_path: PathBuf,
    config: Config,
    descriptors: Vec<ChannelDescriptor>,
    lead_in: LeadIn,
    comment_padded: Vec<u8>,
    part_index: u32,
    bytes_written_since_open: u64,
}

fn mac_address() -> [u8; 6] {
    // No network stack dependency for an instrument id; a fixed
    // locally-administered placeholder stands in where the original
    // reads the board's eth0 address.
    [0x02, 0x00, 0x00, 0x52, 0x4C, 0x01]
}

impl BinaryFile {
    /// `setup_lead_in` + `setup_channels` + `store_header_bin` (§4.3):
    /// computes the header, writes it, and leaves the cursor at EOF.
    pub fn create(path: &Path, config: &Config) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::resource("data file", e))?;

        let descriptors = build_channel_descriptors(config);
        let channel_bin_count =
            descriptors.iter().filter(|d| d.data_size == 0).count() as u16;
        let channel_count = descriptors.len() as u16 - channel_bin_count;

        let mut comment_padded = config.comment.clone().into_bytes();
        comment_padded.push(0);
        pad_to(&mut comment_padded, 4);

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let header_length = (LEAD_IN_LENGTH
            + comment_padded.len()
            + descriptors.len() * CHANNEL_DESCRIPTOR_LENGTH) as u16;

        let lead_in = LeadIn {
            magic: FILE_MAGIC,
            version: FILE_VERSION,
            header_length,
            data_block_size: config.native_samples_per_block() / config.aggregation_factor().max(1),
            data_block_count: 0,
            sample_count: 0,
            sample_rate: config.sample_rate as u16,
            mac_address: mac_address(),
            start_time_sec: now.as_secs() as i64,
            start_time_nsec: now.subsec_nanos() as i64,
            comment_length: comment_padded.len() as u32,
            channel_bin_count,
            channel_count,
        };

        let mut binary_file = BinaryFile {
            file,
            path: path.to_owned(),
            base_path: path.to_owned(),
            config: config.clone(),
            descriptors,
            lead_in,
            comment_padded,
            part_index: 0,
            bytes_written_since_open: 0,
        };
        binary_file.store_header()?;
        Ok(binary_file)
    }

    fn encode_lead_in(lead_in: &LeadIn) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LEAD_IN_LENGTH);
        buf.put_u32(lead_in.magic);
        buf.put_u16(lead_in.version);
        buf.put_u16(lead_in.header_length);
        buf.put_u32(lead_in.data_block_size);
        buf.put_u32(lead_in.data_block_count);
        buf.put_u64(lead_in.sample_count);
        buf.put_u16(lead_in.sample_rate);
        buf.extend_from_slice(&lead_in.mac_address);
        buf.put_i64(lead_in.start_time_sec);
        buf.put_i64(lead_in.start_time_nsec);
        buf.put_u32(lead_in.comment_length);
        buf.put_u16(lead_in.channel_bin_count);
        buf.put_u16(lead_in.channel_count);
        buf
    }

    fn encode_descriptor(d: &ChannelDescriptor) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHANNEL_DESCRIPTOR_LENGTH);
        buf.put_u32(d.unit.as_u32());
        buf.put_i32(d.scale);
        buf.put_u16(d.data_size);
        buf.put_u16(d.valid_data_channel);
        let mut name = d.name.clone().into_bytes();
        name.resize(CHANNEL_NAME_LENGTH, 0);
        buf.extend_from_slice(&name);
        buf
    }

    /// `store_header_bin`: writes lead-in, comment, descriptors from the
    /// start of the file. Only valid right after `create`.
    fn store_header(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0)).map_err(|e| Error::resource("data file", e))?;
        self.file
            .write_all(&Self::encode_lead_in(&self.lead_in))
            .map_err(|e| Error::resource("data file", e))?;
        self.file
            .write_all(&self.comment_padded)
            .map_err(|e| Error::resource("data file", e))?;
        for d in &self.descriptors {
            self.file
                .write_all(&Self::encode_descriptor(d))
                .map_err(|e| Error::resource("data file", e))?;
        }
        self.file.flush().map_err(|e| Error::resource("data file", e))?;
        self.bytes_written_since_open = self.lead_in.header_length as u64;
        Ok(())
    }

    /// `update_header_bin` (§4.3): seek to 0, rewrite the lead-in only,
    /// seek back to EOF. Called after every block.
    fn update_header(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0)).map_err(|e| Error::resource("data file", e))?;
        self.file
            .write_all(&Self::encode_lead_in(&self.lead_in))
            .map_err(|e| Error::resource("data file", e))?;
        self.file.flush().map_err(|e| Error::resource("data file", e))?;
        self.file.seek(SeekFrom::End(0)).map_err(|e| Error::resource("data file", e))?;
        Ok(())
    }

    /// `add_data_block` (§4.2/§4.3): appends timestamps and rows, then
    /// updates the live header counters.
    pub fn add_data_block(&mut self, timestamps: &Timestamps, rows: &[OutputRow]) -> Result<()> {
        if self.should_rollover(rows.len()) {
            self.rollover()?;
        }

        let mut buf = Vec::new();
        buf.put_i64(timestamps.realtime.0);
        buf.put_i64(timestamps.realtime.1);
        buf.put_i64(timestamps.monotonic.0);
        buf.put_i64(timestamps.monotonic.1);
        for row in rows {
            if let Some(digital) = row.digital {
                buf.put_u32(digital);
            }
            for &value in &row.analog {
                buf.put_i32(value);
            }
        }
        self.file.write_all(&buf).map_err(|e| Error::resource("data file", e))?;
        self.bytes_written_since_open += buf.len() as u64;

        self.lead_in.data_block_count += 1;
        self.lead_in.sample_count += rows.len() as u64;
        self.update_header()
    }

    fn row_bytes(&self) -> u64 {
        let descriptors = &self.descriptors;
        let has_digital = descriptors.iter().any(|d| d.data_size == 0);
        let analog_count = descriptors.iter().filter(|d| d.data_size > 0).count() as u64;
        (has_digital as u64) * 4 + analog_count * 4
    }

    fn should_rollover(&self, next_block_rows: usize) -> bool {
        if self.config.file_size == 0 {
            return false;
        }
        let output_rate = (self.config.sample_rate / self.config.aggregation_factor().max(1)) as u64;
        let one_second_of_bytes = output_rate * self.row_bytes();
        let projected = self.bytes_written_since_open
            + 32
            + next_block_rows as u64 * self.row_bytes()
            + one_second_of_bytes;
        projected > self.config.file_size
    }

    /// `rollover` (§4.3): close this file, open `_pN`, rewrite a fresh
    /// header with zeroed counters. `header_length` is unchanged so
    /// readers can stitch part files by matching mac + start time.
    fn rollover(&mut self) -> Result<()> {
        let next_part_index = self.part_index + 1;
        let new_path = part_path(&self.base_path, next_part_index);
        info!("rolling over data file to {}", new_path.display());

        let mut fresh = BinaryFile::create(&new_path, &self.config)?;
        fresh.base_path = self.base_path.clone();
        fresh.part_index = next_part_index;
        *self = fresh;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.flush().map_err(|e| Error::resource("data file", e))?;
        Ok(())
    }
}

/// Derives `name_p1.ext`, `name_p2.ext`, … from the original path.
fn part_path(path: &Path, part_index: u32) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("data");
    let ext = path.extension().and_then(|s| s.to_str());
    let file_name = match ext {
        Some(ext) => format!("{}_p{}.{}", stem, part_index, ext),
        None => format!("{}_p{}", stem, part_index),
    };
    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rocketlogger-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn header_round_trips_after_create() {
        let mut cfg = Config::default();
        cfg.digital_enable = true;
        cfg.channel_enable = [true; 8];
        cfg.file_size = 0;

        let path = temp_path("header.rld");
        let _ = std::fs::remove_file(&path);
        let binary = BinaryFile::create(&path, &cfg).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), FILE_MAGIC);
        assert_eq!(u16::from_le_bytes(bytes[4..6].try_into().unwrap()), FILE_VERSION);
        assert_eq!(bytes.len() as u16, binary.lead_in.header_length);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn part_path_inserts_suffix_before_extension() {
        let p = PathBuf::from("/data/run.rld");
        assert_eq!(part_path(&p, 1), PathBuf::from("/data/run_p1.rld"));
    }

    #[test]
    fn sample_count_advances_monotonically() {
        let mut cfg = Config::default();
        cfg.channel_enable = [true, false, false, false, false, false, false, false];
        cfg.digital_enable = false;
        cfg.file_size = 0;

        let path = temp_path("monotone.rld");
        let _ = std::fs::remove_file(&path);
        let mut binary = BinaryFile::create(&path, &cfg).unwrap();

        let ts = Timestamps { realtime: (0, 0), monotonic: (0, 0) };
        let rows = vec![OutputRow { digital: None, analog: vec![1] }; 10];
        binary.add_data_block(&ts, &rows).unwrap();
        let first = binary.lead_in.sample_count;
        binary.add_data_block(&ts, &rows).unwrap();
        let second = binary.lead_in.sample_count;

        assert!(second >= first);
        assert_eq!(second, 20);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(part_path(&path, 1));
    }

    #[test]
    fn second_rollover_suffixes_the_original_stem() {
        let mut cfg = Config::default();
        cfg.channel_enable = [true, false, false, false, false, false, false, false];
        cfg.digital_enable = false;
        cfg.file_size = 1;

        let path = temp_path("rollover.rld");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(part_path(&path, 1));
        let _ = std::fs::remove_file(part_path(&path, 2));

        let mut binary = BinaryFile::create(&path, &cfg).unwrap();
        let ts = Timestamps { realtime: (0, 0), monotonic: (0, 0) };
        let rows = vec![OutputRow { digital: None, analog: vec![1] }; 10];

        binary.add_data_block(&ts, &rows).unwrap();
        binary.add_data_block(&ts, &rows).unwrap();

        assert_eq!(binary.path, part_path(&path, 2));

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(part_path(&path, 1));
        let _ = std::fs::remove_file(part_path(&path, 2));
    }
}
